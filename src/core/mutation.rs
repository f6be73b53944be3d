//! Point mutations against a parent allele sequence.
//!
//! Derived alleles are stored as a list of [`Mutation`]s instead of a full
//! sequence. All positions are zero-based coordinates in the *parent*
//! sequence; a mutation list is kept sorted by position so it can be applied
//! in a single left-to-right pass.
//!
//! The textual encoding is one compact token per mutation:
//!
//! | Token    | Meaning                              |
//! |----------|--------------------------------------|
//! | `SA4T`   | substitute the `A` at position 4 by `T` |
//! | `I5C`    | insert `C` before position 5         |
//! | `DG7`    | delete the `G` at position 7         |
//!
//! Recording the original base in substitutions and deletions lets
//! application verify the mutation list against the actual parent sequence.

use crate::core::sequence::NucleotideSequence;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationParseError {
    #[error("empty mutation token")]
    Empty,

    #[error("unknown mutation kind '{0}'")]
    UnknownKind(char),

    #[error("malformed mutation token '{0}'")]
    Malformed(String),

    #[error("invalid nucleotide '{0}' in mutation token")]
    InvalidBase(char),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("mutation {mutation} is out of bounds for a sequence of length {length}")]
    OutOfBounds { mutation: String, length: usize },

    #[error("mutation {mutation} expects '{}' but the parent has '{}'", *expected as char, *found as char)]
    BaseMismatch {
        mutation: String,
        expected: u8,
        found: u8,
    },

    #[error("mutation list is not sorted at token {mutation}")]
    Unsorted { mutation: String },

    #[error("position {position} is consumed by more than one mutation")]
    DuplicateTarget { position: u32 },
}

/// A single point mutation in parent coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Replace the base at `pos`.
    Substitution { pos: u32, from: u8, to: u8 },
    /// Insert `base` before `pos`; `pos` may equal the parent length
    /// (append).
    Insertion { pos: u32, base: u8 },
    /// Remove the base at `pos`.
    Deletion { pos: u32, base: u8 },
}

impl Mutation {
    #[must_use]
    pub fn position(&self) -> u32 {
        match *self {
            Self::Substitution { pos, .. } | Self::Insertion { pos, .. } | Self::Deletion { pos, .. } => pos,
        }
    }

    /// Net change in sequence length caused by this mutation.
    #[must_use]
    pub fn length_delta(&self) -> i64 {
        match self {
            Self::Substitution { .. } => 0,
            Self::Insertion { .. } => 1,
            Self::Deletion { .. } => -1,
        }
    }

    /// Whether this mutation consumes the parent base at its position
    /// (substitutions and deletions do, insertions do not).
    fn consumes(&self) -> bool {
        !matches!(self, Self::Insertion { .. })
    }

    /// Rank used to validate intra-position order: insertions land before
    /// the consuming mutation of the same position.
    fn rank(&self) -> u8 {
        u8::from(self.consumes())
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Substitution { pos, from, to } => {
                write!(f, "S{}{}{}", from as char, pos, to as char)
            }
            Self::Insertion { pos, base } => write!(f, "I{}{}", pos, base as char),
            Self::Deletion { pos, base } => write!(f, "D{}{}", base as char, pos),
        }
    }
}

impl std::str::FromStr for Mutation {
    type Err = MutationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = chars.next().ok_or(MutationParseError::Empty)?;
        let rest = chars.as_str();
        match kind {
            'S' => {
                // S<from><pos><to>
                let from = first_base(rest, s)?;
                let tail = &rest[1..];
                if tail.len() < 2 {
                    return Err(MutationParseError::Malformed(s.to_string()));
                }
                let to = last_base(tail, s)?;
                let pos = parse_pos(&tail[..tail.len() - 1], s)?;
                Ok(Self::Substitution { pos, from, to })
            }
            'I' => {
                // I<pos><base>
                if rest.len() < 2 {
                    return Err(MutationParseError::Malformed(s.to_string()));
                }
                let base = last_base(rest, s)?;
                let pos = parse_pos(&rest[..rest.len() - 1], s)?;
                Ok(Self::Insertion { pos, base })
            }
            'D' => {
                // D<base><pos>
                let base = first_base(rest, s)?;
                let pos = parse_pos(&rest[1..], s)?;
                Ok(Self::Deletion { pos, base })
            }
            other => Err(MutationParseError::UnknownKind(other)),
        }
    }
}

fn first_base(s: &str, token: &str) -> Result<u8, MutationParseError> {
    let c = s
        .chars()
        .next()
        .ok_or_else(|| MutationParseError::Malformed(token.to_string()))?;
    valid_base(c)
}

fn last_base(s: &str, token: &str) -> Result<u8, MutationParseError> {
    let c = s
        .chars()
        .last()
        .ok_or_else(|| MutationParseError::Malformed(token.to_string()))?;
    valid_base(c)
}

fn valid_base(c: char) -> Result<u8, MutationParseError> {
    match c {
        'A' | 'C' | 'G' | 'T' | 'N' => Ok(c as u8),
        _ => Err(MutationParseError::InvalidBase(c)),
    }
}

fn parse_pos(s: &str, token: &str) -> Result<u32, MutationParseError> {
    if s.is_empty() {
        return Err(MutationParseError::Malformed(token.to_string()));
    }
    s.parse()
        .map_err(|_| MutationParseError::Malformed(token.to_string()))
}

/// Verify that a mutation list is sorted and targets each parent position at
/// most once.
///
/// # Errors
///
/// `MutationError::Unsorted` when positions decrease (or a consuming mutation
/// precedes an insertion at the same position), `MutationError::DuplicateTarget`
/// when two substitutions/deletions consume the same base.
pub fn validate_order(mutations: &[Mutation]) -> Result<(), MutationError> {
    for window in mutations.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        let key_a = (a.position(), a.rank());
        let key_b = (b.position(), b.rank());
        if key_b < key_a {
            return Err(MutationError::Unsorted {
                mutation: b.to_string(),
            });
        }
        if a.position() == b.position() && a.consumes() && b.consumes() {
            return Err(MutationError::DuplicateTarget {
                position: a.position(),
            });
        }
    }
    Ok(())
}

/// Apply a sorted mutation list to `parent`, producing the derived sequence.
///
/// # Errors
///
/// Fails when the list is unsorted, a position is out of bounds, or a
/// recorded original base disagrees with the parent sequence.
pub fn apply(mutations: &[Mutation], parent: &NucleotideSequence) -> Result<NucleotideSequence, MutationError> {
    validate_order(mutations)?;

    let len = parent.len();
    let capacity = (len as i64 + net_delta(mutations)).max(0) as usize;
    let mut out = Vec::with_capacity(capacity);
    let mut mi = 0;

    // One pass over parent positions, 0..=len so an append-insertion at
    // `len` is reachable.
    for p in 0..=len as u32 {
        while mi < mutations.len() && mutations[mi].position() == p && !mutations[mi].consumes() {
            if let Mutation::Insertion { base, .. } = mutations[mi] {
                out.push(base);
            }
            mi += 1;
        }
        if (p as usize) == len {
            break;
        }
        let parent_base = parent.as_bytes()[p as usize];
        match mutations.get(mi) {
            Some(&m) if m.position() == p => {
                mi += 1;
                match m {
                    Mutation::Substitution { from, to, .. } => {
                        if from != parent_base {
                            return Err(MutationError::BaseMismatch {
                                mutation: m.to_string(),
                                expected: from,
                                found: parent_base,
                            });
                        }
                        out.push(to);
                    }
                    Mutation::Deletion { base, .. } => {
                        if base != parent_base {
                            return Err(MutationError::BaseMismatch {
                                mutation: m.to_string(),
                                expected: base,
                                found: parent_base,
                            });
                        }
                    }
                    Mutation::Insertion { .. } => unreachable!("insertions drained above"),
                }
            }
            _ => out.push(parent_base),
        }
    }

    if let Some(m) = mutations.get(mi) {
        return Err(MutationError::OutOfBounds {
            mutation: m.to_string(),
            length: len,
        });
    }

    // Output bases come from the parent or from validated tokens.
    Ok(NucleotideSequence::from_validated(out))
}

/// Net length change of a whole mutation list.
#[must_use]
pub fn net_delta(mutations: &[Mutation]) -> i64 {
    mutations.iter().map(Mutation::length_delta).sum()
}

/// Translate an anchor position from parent coordinates into the derived
/// allele's coordinates.
///
/// Every mutation strictly before `pos` shifts the anchor by its length
/// delta; a mutation exactly at `pos` leaves it in place. An anchor inside a
/// run of deleted bases therefore collapses onto the start of the run: each
/// deleted base before it contributes -1 until the anchor meets the run
/// start, where shifting stops.
#[must_use]
pub fn translate_position(mutations: &[Mutation], pos: u32) -> u32 {
    let mut shifted = i64::from(pos);
    for m in mutations {
        if m.position() >= pos {
            break;
        }
        shifted += m.length_delta();
    }
    debug_assert!(shifted >= 0, "anchor translated below zero");
    shifted.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> NucleotideSequence {
        s.parse().unwrap()
    }

    fn muts(tokens: &[&str]) -> Vec<Mutation> {
        tokens.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_display_roundtrip() {
        for token in ["SA4T", "I5C", "DG7", "I0A", "SN12N", "DT120"] {
            let m: Mutation = token.parse().unwrap();
            assert_eq!(m.to_string(), token);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Mutation>(), Err(MutationParseError::Empty));
        assert_eq!("X4T".parse::<Mutation>(), Err(MutationParseError::UnknownKind('X')));
        assert_eq!("SA4".parse::<Mutation>(), Err(MutationParseError::Malformed("SA4".into())));
        assert_eq!("SZ4T".parse::<Mutation>(), Err(MutationParseError::InvalidBase('Z')));
        assert_eq!("I".parse::<Mutation>(), Err(MutationParseError::Malformed("I".into())));
        assert_eq!("DGx".parse::<Mutation>(), Err(MutationParseError::Malformed("DGx".into())));
    }

    #[test]
    fn test_apply_substitution() {
        let derived = apply(&muts(&["SA0C"]), &seq("ACGT")).unwrap();
        assert_eq!(derived.to_string(), "CCGT");
    }

    #[test]
    fn test_apply_insertion_and_append() {
        assert_eq!(apply(&muts(&["I2T"]), &seq("ACGT")).unwrap().to_string(), "ACTGT");
        assert_eq!(apply(&muts(&["I4T"]), &seq("ACGT")).unwrap().to_string(), "ACGTT");
    }

    #[test]
    fn test_apply_deletion() {
        assert_eq!(apply(&muts(&["DC1"]), &seq("ACGT")).unwrap().to_string(), "AGT");
    }

    #[test]
    fn test_apply_combined() {
        // SA0C on "ACGT" -> CCGT; I2T -> CCTGT; DT3 removes original T.
        let derived = apply(&muts(&["SA0C", "I2T", "DT3"]), &seq("ACGT")).unwrap();
        assert_eq!(derived.to_string(), "CCTG");
    }

    #[test]
    fn test_apply_base_mismatch() {
        let err = apply(&muts(&["SG0C"]), &seq("ACGT")).unwrap_err();
        assert!(matches!(err, MutationError::BaseMismatch { expected: b'G', found: b'A', .. }));
    }

    #[test]
    fn test_apply_out_of_bounds() {
        let err = apply(&muts(&["SA9T"]), &seq("ACGT")).unwrap_err();
        assert!(matches!(err, MutationError::OutOfBounds { length: 4, .. }));
    }

    #[test]
    fn test_apply_unsorted_rejected() {
        let err = apply(&muts(&["DG2", "SA0T"]), &seq("ACGT")).unwrap_err();
        assert!(matches!(err, MutationError::Unsorted { .. }));
    }

    #[test]
    fn test_apply_duplicate_target_rejected() {
        let err = apply(&muts(&["SC1A", "DC1"]), &seq("ACGT")).unwrap_err();
        assert!(matches!(err, MutationError::DuplicateTarget { position: 1 }));
    }

    #[test]
    fn test_insertion_before_substitution_same_position() {
        let derived = apply(&muts(&["I1T", "SC1G"]), &seq("ACGT")).unwrap();
        assert_eq!(derived.to_string(), "ATGGT");
    }

    #[test]
    fn test_empty_list_is_identity() {
        assert_eq!(apply(&[], &seq("ACGT")).unwrap(), seq("ACGT"));
    }

    #[test]
    fn test_translate_insertion_shifts_after() {
        let m = muts(&["I2T"]);
        assert_eq!(translate_position(&m, 2), 2);
        assert_eq!(translate_position(&m, 3), 4);
        assert_eq!(translate_position(&m, 0), 0);
    }

    #[test]
    fn test_translate_deletion_shifts_after() {
        let m = muts(&["DC1"]);
        assert_eq!(translate_position(&m, 0), 0);
        assert_eq!(translate_position(&m, 1), 1);
        assert_eq!(translate_position(&m, 2), 1);
        assert_eq!(translate_position(&m, 3), 2);
    }

    #[test]
    fn test_translate_pins_anchor_to_deletion_start() {
        // Deleting positions 2..5; an anchor at 4 collapses to the run start.
        let m = muts(&["DG2", "DT3", "DA4"]);
        assert_eq!(translate_position(&m, 4), 2);
        assert_eq!(translate_position(&m, 5), 2);
        assert_eq!(translate_position(&m, 6), 3);
    }

    #[test]
    fn test_translate_substitution_is_neutral() {
        let m = muts(&["SA0C", "SG2T"]);
        assert_eq!(translate_position(&m, 3), 3);
    }

    #[test]
    fn test_spec_example_insertion() {
        // Reference ACGTACGT with cdr3 at 4; inserting T before 2 moves it to 5.
        let parent = seq("ACGTACGT");
        let m = muts(&["I2T"]);
        assert_eq!(apply(&m, &parent).unwrap().to_string(), "ACTGTACGT");
        assert_eq!(translate_position(&m, 4), 5);
        assert_eq!(translate_position(&m, 0), 0);
    }
}
