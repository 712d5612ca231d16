use anyhow::Result;
use controller::{create_dirs, RunIdentity};
use dataset::{DomainPairKey, NamingPolicy, RecordReader, RecordWriter, Split, Tensor};
use run_core::{DebugMode, Error};
use std::sync::Arc;
use storage::{LocalDirectoryLister, LocalStorage};
use tempfile::TempDir;

// Prepare record files for every domain of a run, the way a data conversion
// job would, then locate them again through the naming policy
#[tokio::test]
async fn test_prepared_files_match_run_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = Arc::new(LocalStorage::new(temp_dir.path()));
    let writer = RecordWriter::new(storage.clone(), NamingPolicy::default());

    let sources = vec!["14".to_string(), "15".to_string()];
    let target = "19";

    let x: Vec<Tensor> = (0..8)
        .map(|i| Tensor::f32(vec![2, 3], vec![i as f32; 6]))
        .collect::<run_core::Result<_>>()?;
    let y: Vec<Tensor> = (0..8).map(|i| Tensor::scalar_i64(i % 6)).collect();

    for (index, source) in sources.iter().enumerate() {
        let domain: Vec<Tensor> = (0..8).map(|_| Tensor::scalar_i64(index as i64)).collect();
        writer
            .write_split(
                &DomainPairKey::pair(source.as_str(), target),
                source,
                Split::Train,
                &x,
                &y,
                &domain,
            )
            .await?;
    }
    // The target is prepared alongside the first source, in the opposite order
    let domain: Vec<Tensor> = (0..8).map(|_| Tensor::scalar_i64(2)).collect();
    writer
        .write_split(
            &DomainPairKey::pair(target, sources[0].as_str()),
            target,
            Split::Train,
            &x,
            &y,
            &domain,
        )
        .await?;

    let reader = RecordReader::new(storage);
    let files = writer.policy().run_files(&sources, Some(target), Split::Train)?;
    assert_eq!(
        files,
        vec![
            "14_and_19_14_train.tfrecord",
            "15_and_19_15_train.tfrecord",
            "14_and_19_19_train.tfrecord",
        ]
    );

    for (index, file) in files.iter().enumerate() {
        let examples = reader.read(file).await?;
        assert_eq!(examples.len(), 8);
        let (_, _, domain) = examples[0].tensors()?;
        assert_eq!(domain, Tensor::scalar_i64(index as i64));
    }

    Ok(())
}

#[tokio::test]
async fn test_auto_increment_on_real_directories() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let model_root = temp_dir.path().join("models");
    let log_root = temp_dir.path().join("logs");
    let identity = RunIdentity::new("office", "3", "cycada", DebugMode::AutoIncrement)?;

    let mut names = Vec::new();
    for _ in 0..3 {
        let dirs = identity
            .resolve(&model_root, &log_root, true, &LocalDirectoryLister)
            .await?;
        create_dirs(&dirs).await?;
        names.push(dirs.run_name.unwrap_or_default());
    }
    assert_eq!(
        names,
        vec!["office-3-cycada-1", "office-3-cycada-2", "office-3-cycada-3"]
    );

    // Unrelated and non-numeric entries do not affect numbering
    std::fs::create_dir_all(log_root.join("office-3-cycada-final"))?;
    std::fs::create_dir_all(log_root.join("office-3-dann-9"))?;
    let dirs = identity
        .resolve(&model_root, &log_root, true, &LocalDirectoryLister)
        .await?;
    assert_eq!(dirs.run_name.as_deref(), Some("office-3-cycada-4"));

    Ok(())
}

#[tokio::test]
async fn test_explicit_number_overrides_auto_increment() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let log_root = temp_dir.path().join("logs");
    std::fs::create_dir_all(log_root.join("mnist-1-none-5"))?;

    let debug = DebugMode::from_flags(true, 2)?;
    assert_eq!(debug, DebugMode::Explicit { number: 2 });

    let dirs = RunIdentity::new("mnist", "1", "none", debug)?
        .resolve(&temp_dir.path().join("models"), &log_root, false, &LocalDirectoryLister)
        .await?;
    assert_eq!(dirs.log_dir, log_root.join("mnist-1-none-2"));

    Ok(())
}

#[tokio::test]
async fn test_record_writer_rejects_mismatched_lengths() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = Arc::new(LocalStorage::new(temp_dir.path()));
    let writer = RecordWriter::new(storage, NamingPolicy::default());

    let x = vec![Tensor::scalar_i64(0); 3];
    let y = vec![Tensor::scalar_i64(0); 2];
    let d = vec![Tensor::scalar_i64(0); 3];

    let err = writer
        .write_split(&DomainPairKey::single("mnist"), "mnist", Split::Test, &x, &y, &d)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert!(!temp_dir.path().join("mnist_test.tfrecord").exists());

    Ok(())
}
