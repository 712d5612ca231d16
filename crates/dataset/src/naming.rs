//! Canonical dataset file names
//!
//! Data prepared for a source/target pair is stored under a name that does not
//! depend on which domain was passed first, so either direction of an
//! adaptation reuses the same files.

use run_core::{DomainPairKey, Error, Result, Split};
use std::collections::BTreeSet;

/// Joins the two sorted domain names of a pair prefix
pub const PAIR_SEPARATOR: &str = "_and_";

/// Extension of record files
pub const DEFAULT_EXTENSION: &str = "tfrecord";

/// Domains whose prepared data is the same whichever domain they are paired with
pub const DEFAULT_PAIRING_INSENSITIVE: &[&str] = &["office_amazon", "office_dslr", "office_webcam"];

/// Maps (domain pair, dataset, split) to a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    pairing_insensitive: BTreeSet<String>,
    extension: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRING_INSENSITIVE.iter().copied(), DEFAULT_EXTENSION)
    }
}

impl NamingPolicy {
    pub fn new<I, S>(pairing_insensitive: I, extension: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pairing_insensitive: pairing_insensitive.into_iter().map(Into::into).collect(),
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True when the pair has no second domain or both domains are pairing-insensitive
    pub fn is_unpaired(&self, pair: &DomainPairKey) -> bool {
        match &pair.domain2 {
            None => true,
            Some(domain2) => {
                self.pairing_insensitive.contains(&pair.domain1)
                    && self.pairing_insensitive.contains(domain2)
            }
        }
    }

    /// `"{low}_and_{high}"` for a pair, `None` for a single domain
    pub fn canonical_prefix(pair: &DomainPairKey) -> Option<String> {
        let domain2 = pair.domain2.as_deref()?;
        let mut names = [pair.domain1.as_str(), domain2];
        names.sort_unstable();
        Some(format!("{}{}{}", names[0], PAIR_SEPARATOR, names[1]))
    }

    /// File name for `dataset_name` (one of the two domains) prepared for the
    /// pair `domain1`/`domain2`.
    ///
    /// An empty `domain2` is the same as no target domain.
    ///
    /// # Errors
    /// `InvalidArgument` if `split` is not train/valid/test or `dataset_name`
    /// is neither domain.
    pub fn file_name(
        &self,
        domain1: &str,
        domain2: Option<&str>,
        dataset_name: &str,
        split: &str,
    ) -> Result<String> {
        let split: Split = split.parse()?;
        let pair = match domain2.filter(|d| !d.is_empty()) {
            Some(domain2) => DomainPairKey::pair(domain1, domain2),
            None => DomainPairKey::single(domain1),
        };
        self.file_name_for(&pair, dataset_name, split)
    }

    /// Typed form of [`NamingPolicy::file_name`]
    pub fn file_name_for(
        &self,
        pair: &DomainPairKey,
        dataset_name: &str,
        split: Split,
    ) -> Result<String> {
        let single;
        let pair = if pair.domain2.as_deref() == Some("") {
            single = DomainPairKey::single(pair.domain1.clone());
            &single
        } else {
            pair
        };

        if !pair.contains(dataset_name) {
            return Err(Error::invalid_argument(format!(
                "dataset name '{}' must be one of the paired domains {:?}",
                dataset_name,
                [Some(pair.domain1.as_str()), pair.domain2.as_deref()]
            )));
        }

        if self.is_unpaired(pair) {
            return Ok(self.simple(dataset_name, split));
        }

        let prefix = Self::canonical_prefix(pair)
            .ok_or_else(|| Error::invalid_argument("paired name requires two domains"))?;
        Ok(format!(
            "{}_{}_{}.{}",
            prefix, dataset_name, split, self.extension
        ))
    }

    /// File name ignoring pairing entirely
    pub fn file_name_simple(&self, dataset_name: &str, split: &str) -> Result<String> {
        let split: Split = split.parse()?;
        Ok(self.simple(dataset_name, split))
    }

    /// Files a run reads for `split`: one per source, then the target if any
    pub fn run_files(
        &self,
        sources: &[String],
        target: Option<&str>,
        split: Split,
    ) -> Result<Vec<String>> {
        let target = target.filter(|t| !t.is_empty());
        let mut files = Vec::with_capacity(sources.len() + 1);

        for source in sources {
            let pair = match target {
                Some(target) => DomainPairKey::pair(source.as_str(), target),
                None => DomainPairKey::single(source.as_str()),
            };
            files.push(self.file_name_for(&pair, source, split)?);
        }

        if let Some(target) = target {
            // Paired with the first source, matching how the target was prepared
            let pair = match sources.first() {
                Some(source) => DomainPairKey::pair(source.as_str(), target),
                None => DomainPairKey::single(target),
            };
            files.push(self.file_name_for(&pair, target, split)?);
        }

        Ok(files)
    }

    fn simple(&self, dataset_name: &str, split: Split) -> String {
        format!("{}_{}.{}", dataset_name, split, self.extension)
    }
}
