use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("invalid nucleotide '{}' at position {position}", *base as char)]
    InvalidBase { base: u8, position: usize },
}

/// An immutable nucleotide sequence.
///
/// Stores uppercase `A`/`C`/`G`/`T` plus the wildcard `N`; lowercase input is
/// normalized on construction, anything else is rejected. Positions are
/// zero-based throughout the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NucleotideSequence(Box<[u8]>);

impl NucleotideSequence {
    /// Build a sequence from raw bytes, normalizing case.
    ///
    /// # Errors
    ///
    /// Returns `SequenceError::InvalidBase` on the first byte outside
    /// `ACGTN` (either case).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SequenceError> {
        let mut data = Vec::with_capacity(bytes.len());
        for (position, &base) in bytes.iter().enumerate() {
            let upper = base.to_ascii_uppercase();
            match upper {
                b'A' | b'C' | b'G' | b'T' | b'N' => data.push(upper),
                _ => return Err(SequenceError::InvalidBase { base, position }),
            }
        }
        Ok(Self(data.into_boxed_slice()))
    }

    /// Wrap bytes that are already known to be valid uppercase bases.
    pub(crate) fn from_validated(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N')));
        Self(bytes.into_boxed_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base at `position`, or None past the end.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<u8> {
        self.0.get(position).copied()
    }

    /// Subsequence `[start, end)`.
    ///
    /// Callers are expected to have validated the range; slicing out of
    /// bounds panics like any slice index.
    #[must_use]
    pub fn subsequence(&self, start: usize, end: usize) -> NucleotideSequence {
        Self(self.0[start..end].into())
    }
}

impl std::fmt::Display for NucleotideSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Construction guarantees ASCII.
        for &base in self.0.iter() {
            write!(f, "{}", base as char)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NucleotideSequence {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl Serialize for NucleotideSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NucleotideSequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let seq: NucleotideSequence = "ACGTN".parse().unwrap();
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.to_string(), "ACGTN");
    }

    #[test]
    fn test_lowercase_normalized() {
        let seq: NucleotideSequence = "acgt".parse().unwrap();
        assert_eq!(seq.to_string(), "ACGT");
    }

    #[test]
    fn test_invalid_base_rejected() {
        let err = "ACXGT".parse::<NucleotideSequence>().unwrap_err();
        assert_eq!(
            err,
            SequenceError::InvalidBase {
                base: b'X',
                position: 2
            }
        );
    }

    #[test]
    fn test_subsequence() {
        let seq: NucleotideSequence = "ACGTACGT".parse().unwrap();
        assert_eq!(seq.subsequence(2, 6).to_string(), "GTAC");
        assert_eq!(seq.subsequence(0, 0).len(), 0);
    }

    #[test]
    fn test_empty() {
        let seq: NucleotideSequence = "".parse().unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let seq: NucleotideSequence = "ACGT".parse().unwrap();
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"ACGT\"");
        let back: NucleotideSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        assert!(serde_json::from_str::<NucleotideSequence>("\"AC-GT\"").is_err());
    }
}
