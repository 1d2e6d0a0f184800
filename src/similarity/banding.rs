//! LSH banding.
//!
//! A signature of `n` values is cut into `bands` contiguous slices of
//! `n / bands` rows. Each slice is hashed into a short band key; items whose
//! slices agree land in the same bucket for that band.

use crate::models::Signature;
use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Length in bytes of the digest prefix kept for a band key.
const BAND_KEY_BYTES: usize = 8;

/// Banding scheme for signatures of a fixed length.
///
/// # Example
///
/// ```rust
/// use simidx::{Banding, Signature};
///
/// let banding = Banding::new(4, 2)?;
/// let a = Signature::new(vec![1, 2, 3, 4]);
/// let b = Signature::new(vec![1, 2, 9, 9]);
///
/// let (ka, kb) = (banding.band_keys(&a), banding.band_keys(&b));
/// assert_eq!(ka[0], kb[0]);
/// assert_ne!(ka[1], kb[1]);
/// assert_eq!(Banding::bit_count(&a, &b), 2);
/// # Ok::<(), simidx::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Banding {
    bands: usize,
    rows: usize,
}

impl Banding {
    /// Creates a banding scheme for signatures of `signature_len` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `bands` is zero or does not divide
    /// `signature_len`.
    pub fn new(signature_len: usize, bands: usize) -> Result<Self> {
        if bands == 0 {
            return Err(Error::Configuration(
                "band count must be positive".to_string(),
            ));
        }
        if signature_len == 0 || signature_len % bands != 0 {
            return Err(Error::Configuration(format!(
                "signature length {signature_len} is not divisible into {bands} bands"
            )));
        }
        Ok(Self {
            bands,
            rows: signature_len / bands,
        })
    }

    /// Returns the number of bands.
    #[must_use]
    pub const fn bands(&self) -> usize {
        self.bands
    }

    /// Returns the number of signature values per band.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Returns one key per band, in band order.
    ///
    /// Bands beyond the end of a short signature are keyed as empty slices.
    #[must_use]
    pub fn band_keys(&self, signature: &Signature) -> Vec<String> {
        let values = signature.values();
        (0..self.bands)
            .map(|band| {
                let start = (band * self.rows).min(values.len());
                let end = (start + self.rows).min(values.len());
                band_key(&values[start..end])
            })
            .collect()
    }

    /// Counts the positions at which two signatures agree.
    #[must_use]
    pub fn bit_count(a: &Signature, b: &Signature) -> usize {
        a.values()
            .iter()
            .zip(b.values())
            .filter(|(x, y)| x == y)
            .count()
    }
}

/// Hashes one band slice into a hex bucket identifier.
fn band_key(slice: &[u32]) -> String {
    let mut hasher = Sha256::new();
    for value in slice {
        hasher.update(value.to_le_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..BAND_KEY_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(32, 16, 2 ; "sixteen bands of two")]
    #[test_case(32, 1, 32 ; "single band")]
    #[test_case(32, 32, 1 ; "one row per band")]
    fn test_rows_per_band(len: usize, bands: usize, rows: usize) {
        let banding = Banding::new(len, bands).unwrap();
        assert_eq!(banding.rows(), rows);
        assert_eq!(banding.bands(), bands);
    }

    #[test_case(32, 0 ; "zero bands")]
    #[test_case(32, 5 ; "not a divisor")]
    #[test_case(0, 4 ; "empty signature")]
    fn test_rejects_invalid_banding(len: usize, bands: usize) {
        assert!(matches!(
            Banding::new(len, bands),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_band_keys_are_short_hex() {
        let banding = Banding::new(4, 2).unwrap();
        let keys = banding.band_keys(&Signature::new(vec![1, 2, 3, 4]));
        assert_eq!(keys.len(), 2);
        for key in keys {
            assert_eq!(key.len(), BAND_KEY_BYTES * 2);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_identical_slices_share_keys_across_positions() {
        // Same slice content in different bands hashes the same; the band
        // index keeps them apart in the key space.
        let banding = Banding::new(4, 2).unwrap();
        let keys = banding.band_keys(&Signature::new(vec![7, 7, 7, 7]));
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn test_band_key_depends_on_order() {
        let banding = Banding::new(2, 1).unwrap();
        let a = banding.band_keys(&Signature::new(vec![1, 2]));
        let b = banding.band_keys(&Signature::new(vec![2, 1]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_bit_count() {
        let a = Signature::new(vec![1, 2, 3, 4]);
        let b = Signature::new(vec![1, 0, 3, 0]);
        assert_eq!(Banding::bit_count(&a, &b), 2);
        assert_eq!(Banding::bit_count(&a, &a), 4);
    }
}
