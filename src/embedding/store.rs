/// Quantized embedding store
///
/// Every item is stored as `dimension` unsigned bytes produced by the
/// affine map [-1, 1] -> [0, 255]. Scoring dequantizes on the fly.
use crate::assets::AssetError;
use std::sync::Arc;

/// Map one stored byte back into the encoder's normalization space
///
/// This is the corpus quantization contract and must not change:
/// `b / 127.5 - 1.0`.
#[inline]
pub fn dequantize(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

#[inline]
fn dequantize_wide(value: u8) -> f64 {
    value as f64 / 127.5 - 1.0
}

/// Quantize one component the way the asset builder does (truncating)
#[inline]
pub fn quantize(value: f32) -> u8 {
    ((value + 1.0) * 127.5).clamp(0.0, 255.0) as u8
}

/// Quantize a whole vector, component by component
pub fn quantize_vector(values: &[f32]) -> Vec<u8> {
    values.iter().map(|&v| quantize(v)).collect()
}

/// Flat byte buffer of `item_count * dimension` quantized components
#[derive(Debug, Clone)]
pub struct QuantizedStore {
    name: String,
    dimension: usize,
    bytes: Arc<[u8]>,
}

impl QuantizedStore {
    /// Wrap raw bytes fetched for the named store
    ///
    /// Fails with [`AssetError::MalformedStore`] when the length is not an
    /// exact multiple of `dimension`.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        dimension: usize,
    ) -> Result<Self, AssetError> {
        let name = name.into();
        if dimension == 0 || bytes.len() % dimension != 0 {
            return Err(AssetError::MalformedStore {
                name,
                len: bytes.len(),
                dimension,
            });
        }

        Ok(Self {
            name,
            dimension,
            bytes: bytes.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn item_count(&self) -> usize {
        self.bytes.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size of the backing buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Whole backing buffer, `item_count * dimension` bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw quantized row for an item
    pub fn item(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.dimension)?;
        self.bytes.get(start..start + self.dimension)
    }

    /// Iterate over all rows in index order
    pub fn rows(&self) -> std::slice::ChunksExact<'_, u8> {
        self.bytes.chunks_exact(self.dimension)
    }

    /// Dequantized copy of an item's vector
    pub fn dequantized(&self, index: usize) -> Option<Vec<f32>> {
        self.item(index)
            .map(|row| row.iter().map(|&b| dequantize(b)).collect())
    }

    /// Dot product between a query and one stored row
    ///
    /// Accumulates in `f64` in component order, so the result for a given
    /// row never depends on how the scan is scheduled.
    #[inline]
    pub fn dot(row: &[u8], query: &[f32]) -> f32 {
        let mut acc = 0.0f64;
        for (&b, &q) in row.iter().zip(query) {
            acc += q as f64 * dequantize_wide(b);
        }
        acc as f32
    }

    /// Score a single item against a query
    pub fn score(&self, index: usize, query: &[f32]) -> Option<f32> {
        self.item(index).map(|row| Self::dot(row, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequantize_range() {
        for b in 0..=255u8 {
            let v = dequantize(b);
            assert!((-1.0..=1.0).contains(&v), "byte {} -> {}", b, v);
        }
        assert_eq!(dequantize(0), -1.0);
        assert_eq!(dequantize(255), 1.0);
        // 127 sits half a step below zero
        assert!(dequantize(127).abs() <= 1.0 / 127.5);
    }

    #[test]
    fn test_dequantize_is_monotonic() {
        for b in 0..255u8 {
            assert!(dequantize(b) < dequantize(b + 1));
        }
    }

    #[test]
    fn test_quantize_matches_builder() {
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.0), 127);
        assert_eq!(quantize(2.0), 255);
        assert_eq!(quantize(-3.0), 0);
        // Quantize then dequantize stays within one step
        for i in -100..=100 {
            let x = i as f32 / 100.0;
            assert!((dequantize(quantize(x)) - x).abs() <= 1.0 / 127.5 + 1e-6);
        }
    }

    #[test]
    fn test_store_shape() {
        let store = QuantizedStore::from_bytes("toy", vec![0u8; 12], 4).unwrap();
        assert_eq!(store.item_count(), 3);
        assert_eq!(store.dimension(), 4);
        assert_eq!(store.item(2).unwrap().len(), 4);
        assert!(store.item(3).is_none());
        assert_eq!(store.rows().count(), 3);
    }

    #[test]
    fn test_malformed_store() {
        let err = QuantizedStore::from_bytes("bad", vec![0u8; 10], 4).unwrap_err();
        match err {
            AssetError::MalformedStore {
                name,
                len,
                dimension,
            } => {
                assert_eq!(name, "bad");
                assert_eq!(len, 10);
                assert_eq!(dimension, 4);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(QuantizedStore::from_bytes("zero", vec![], 0).is_err());
    }

    #[test]
    fn test_empty_store_is_valid() {
        let store = QuantizedStore::from_bytes("empty", vec![], 4).unwrap();
        assert_eq!(store.item_count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_score_by_hand() {
        // Row bytes 255, 127, 0, 127 dequantize to 1.0, -1/255, -1.0, -1/255
        let store = QuantizedStore::from_bytes("toy", vec![255, 127, 0, 127], 4).unwrap();
        let score = store.score(0, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(score, 1.0);

        let score = store.score(0, &[0.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(score, -1.0);
    }
}
