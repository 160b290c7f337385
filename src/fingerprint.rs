//! Content Fingerprinter (C2, §4.2).
//!
//! 64-bit Simhash over tokenized text, with Hamming distance/similarity and
//! the signed/unsigned storage transform required because `ContentHash`
//! rows store the fingerprint in a signed 64-bit column. Tokenizer and
//! accumulation algorithm are ported verbatim from
//! `original_source/crawler/utils/simhash.py`.

use md5::{Digest, Md5};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Default fingerprint width in bits.
pub const DEFAULT_BITS: u32 = 64;

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").unwrap())
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = non_word_re().replace_all(&lowered, " ");
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn hash_token(token: &str, bits: u32) -> u64 {
    let digest = Md5::digest(token.as_bytes());
    // MD5 is 128 bits; the Python original takes the full hex digest as an
    // integer and masks to `bits`, which for bits <= 64 is equivalent to
    // taking the low `bits` bits of the low 64 bits of the digest.
    let mut low: u64 = 0;
    for b in &digest[8..16] {
        low = (low << 8) | *b as u64;
    }
    if bits >= 64 {
        low
    } else {
        low & ((1u64 << bits) - 1)
    }
}

/// A 64-bit Simhash fingerprint (or narrower, per `bits`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Simhash {
    pub fingerprint: u64,
    pub bits: u32,
}

impl Simhash {
    /// Generate a fingerprint from `text` per §4.2 steps 1-4.
    pub fn generate(text: &str, bits: u32) -> Result<Self> {
        if bits == 0 || bits > 64 {
            return Err(Error::Validation(format!(
                "bits must be in 1..=64, got {bits}"
            )));
        }
        if text.trim().is_empty() {
            return Err(Error::Validation("text must be non-empty".into()));
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(Error::Validation("no tokens extracted from text".into()));
        }

        let mut vector = vec![0i64; bits as usize];
        for token in &tokens {
            let h = hash_token(token, bits);
            for (i, slot) in vector.iter_mut().enumerate() {
                if h & (1 << i) != 0 {
                    *slot += 1;
                } else {
                    *slot -= 1;
                }
            }
        }

        let mut fingerprint: u64 = 0;
        for (i, v) in vector.iter().enumerate() {
            if *v > 0 {
                fingerprint |= 1 << i;
            }
        }

        Ok(Self { fingerprint, bits })
    }

    /// Hamming distance to `other`. Both fingerprints must share `bits`.
    pub fn distance(&self, other: &Simhash) -> Result<u32> {
        if self.bits != other.bits {
            return Err(Error::Validation(format!(
                "cannot compare fingerprints of different widths: {} vs {}",
                self.bits, other.bits
            )));
        }
        Ok((self.fingerprint ^ other.fingerprint).count_ones())
    }

    /// Similarity percentage in `[0, 100]`.
    pub fn similarity(&self, other: &Simhash) -> Result<f64> {
        let d = self.distance(other)?;
        Ok((1.0 - d as f64 / self.bits as f64) * 100.0)
    }
}

/// Encode an unsigned 64-bit fingerprint for storage in a signed column
/// (§4.2 "Storage transform", §9).
pub fn encode_signed(unsigned: u64) -> i64 {
    unsigned as i64
}

/// Decode a signed column value back into the unsigned fingerprint.
pub fn decode_unsigned(signed: i64) -> u64 {
    signed as u64
}

/// Hamming distance between two stored (signed) fingerprint columns,
/// without needing to reconstruct `Simhash` instances — used by the
/// near-duplicate query in `crate::repository`.
pub fn stored_distance(a: i64, b: i64) -> u32 {
    (decode_unsigned(a) ^ decode_unsigned(b)).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let s = Simhash::generate("the quick brown fox jumps over the lazy dog", 64).unwrap();
        assert_eq!(s.distance(&s).unwrap(), 0);
        assert_eq!(s.similarity(&s).unwrap(), 100.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Simhash::generate("the quick brown fox jumps over the lazy dog", 64).unwrap();
        let b = Simhash::generate("the quick brown fox jumps over a lazy dog", 64).unwrap();
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
    }

    #[test]
    fn identical_tokenized_input_yields_identical_fingerprint() {
        let a = Simhash::generate("Hello, World!", 64).unwrap();
        let b = Simhash::generate("hello world", 64).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn single_word_substitution_is_near_duplicate() {
        let a = Simhash::generate("the quick brown fox jumps over the lazy dog today", 64)
            .unwrap();
        let b = Simhash::generate("the quick brown fox jumps over the lazy cat today", 64)
            .unwrap();
        assert!(a.distance(&b).unwrap() <= 10);
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(Simhash::generate("   ", 64).is_err());
    }

    #[test]
    fn mismatched_bit_widths_are_rejected() {
        let a = Simhash::generate("some text here", 64).unwrap();
        let b = Simhash::generate("some text here", 32).unwrap();
        assert!(a.distance(&b).is_err());
    }

    #[test]
    fn signed_round_trip_preserves_high_bit_values() {
        let unsigned: u64 = u64::MAX - 5;
        let signed = encode_signed(unsigned);
        assert!(signed < 0);
        assert_eq!(decode_unsigned(signed), unsigned);
    }

    #[test]
    fn signed_round_trip_preserves_low_values() {
        let unsigned: u64 = 42;
        let signed = encode_signed(unsigned);
        assert!(signed >= 0);
        assert_eq!(decode_unsigned(signed), unsigned);
    }

    #[test]
    fn stored_distance_matches_direct_xor() {
        let a = Simhash::generate("alpha beta gamma", 64).unwrap();
        let b = Simhash::generate("alpha beta delta", 64).unwrap();
        let da = stored_distance(encode_signed(a.fingerprint), encode_signed(b.fingerprint));
        assert_eq!(da, a.distance(&b).unwrap());
    }
}
