//! Core data types for germline gene segment libraries.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`NucleotideSequence`](sequence::NucleotideSequence): validated nucleotide sequence
//! - [`Mutation`](mutation::Mutation): point mutation against a parent allele
//! - [`AnchorPointKind`](anchor::AnchorPointKind): reference points and their per-gene-type topology
//! - [`GeneFeature`](feature::GeneFeature): named anchor-bounded subsequences
//! - [`Allele`](gene::Allele), [`AlleleBody`](gene::AlleleBody): compiled allele data
//! - [`GeneType`](types::GeneType), [`Functionality`](types::Functionality), [`AlleleName`](types::AlleleName): identifiers and metadata
//!
//! ## Coordinates
//!
//! All positions are zero-based and refer to an allele's *resolved* sequence.
//! Anchor points are boundaries, so a feature spanning anchors `a` and `b`
//! covers the half-open interval `[a, b)`. Derived alleles express mutation
//! positions in their parent's coordinate frame; translation into the derived
//! frame happens during resolution.

pub mod anchor;
pub mod feature;
pub mod gene;
pub mod mutation;
pub mod sequence;
pub mod types;
