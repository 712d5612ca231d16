//! Tensors and the three-field example stored in record files

use run_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Flat tensor values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major tensor with an explicit shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<u64>,
    pub data: TensorData,
}

impl Tensor {
    /// Float tensor; the shape must cover exactly `values.len()` elements
    pub fn f32(shape: Vec<u64>, values: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorData::F32(values))
    }

    /// Integer tensor; the shape must cover exactly `values.len()` elements
    pub fn i64(shape: Vec<u64>, values: Vec<i64>) -> Result<Self> {
        Self::new(shape, TensorData::I64(values))
    }

    /// Rank-0 integer tensor, used for labels and domain tags
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            shape: Vec::new(),
            data: TensorData::I64(vec![value]),
        }
    }

    fn new(shape: Vec<u64>, data: TensorData) -> Result<Self> {
        let elements = shape
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::invalid_argument(format!("shape {:?} overflows the element count", shape))
            })?;
        if elements != data.len() as u64 {
            return Err(Error::invalid_argument(format!(
                "shape {:?} holds {} elements, got {}",
                shape,
                elements,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Serialize this tensor on its own
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// One record: input, label and domain tag, each encoded independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
    pub domain: Vec<u8>,
}

impl Example {
    pub fn new(x: &Tensor, y: &Tensor, domain: &Tensor) -> Result<Self> {
        Ok(Self {
            x: x.encode()?,
            y: y.encode()?,
            domain: domain.encode()?,
        })
    }

    /// Decode the three fields back into tensors
    pub fn tensors(&self) -> Result<(Tensor, Tensor, Tensor)> {
        Ok((
            Tensor::decode(&self.x)?,
            Tensor::decode(&self.y)?,
            Tensor::decode(&self.domain)?,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_values() {
        assert!(Tensor::f32(vec![2, 3], vec![0.0; 6]).is_ok());
        assert!(matches!(
            Tensor::f32(vec![2, 3], vec![0.0; 5]),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(Tensor::scalar_i64(4).data.len(), 1);
    }

    #[test]
    fn test_overflowing_shape_is_rejected() {
        let err = Tensor::i64(vec![u64::MAX, 2], vec![0; 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        // A zero dimension still yields an empty tensor
        assert!(Tensor::i64(vec![u64::MAX, 0], Vec::new()).is_ok());
    }

    #[test]
    fn test_fields_decode_independently() {
        let x = Tensor::f32(vec![2], vec![0.5, -1.0]).unwrap();
        let example = Example::new(&x, &Tensor::scalar_i64(3), &Tensor::scalar_i64(1)).unwrap();

        // The label can be read without touching the input field
        assert_eq!(Tensor::decode(&example.y).unwrap(), Tensor::scalar_i64(3));

        let (x2, _, domain) = example.tensors().unwrap();
        assert_eq!(x2, x);
        assert_eq!(domain, Tensor::scalar_i64(1));
    }
}
