use crate::core::anchor::AnchorMap;
use crate::core::mutation::Mutation;
use crate::core::sequence::NucleotideSequence;
use crate::core::types::{AlleleName, Functionality};
use std::collections::BTreeSet;

/// How an allele's sequence is stored.
///
/// Every consumption site matches exhaustively on this type; a future body
/// kind (e.g. region-of-contig) is then a compile error everywhere it
/// matters instead of a silent fallthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlleleBody {
    /// Canonical allele carrying the full sequence.
    Reference(NucleotideSequence),
    /// Variant allele stored as mutations against another allele of the
    /// same gene.
    Derived {
        parent: AlleleName,
        mutations: Vec<Mutation>,
    },
}

impl AlleleBody {
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

/// One allele of a germline gene inside a compiled snapshot.
///
/// `anchors` holds absolute positions for Reference alleles and is empty for
/// Derived alleles, whose anchors are always inherited from the parent and
/// adjusted for indels during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allele {
    pub name: AlleleName,
    pub body: AlleleBody,
    pub anchors: AnchorMap,
    pub functionality: Functionality,
    /// Identifiers of the raw sources this allele was observed in.
    pub sources: BTreeSet<String>,
    /// Alternative names, e.g. legacy nomenclature.
    pub synonyms: BTreeSet<String>,
}
