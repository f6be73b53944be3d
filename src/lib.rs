//! # vdjc-lib
//!
//! A library for compiling, versioning and querying immune-receptor (V, D,
//! J, C) germline gene segment reference libraries.
//!
//! Repertoire sequencing tools need to know, for every allele of every
//! germline gene, its nucleotide sequence and where its functional
//! boundaries lie — the CDR3 start, splice junctions, framework regions.
//! `vdjc-lib` stores this as a compact, versioned library: canonical
//! (reference) alleles carry full sequences and anchor points, variant
//! (derived) alleles carry only a mutation list against a parent allele,
//! and anchor positions for variants are recomputed from the parent under
//! the insertions and deletions of that list.
//!
//! ## Features
//!
//! - **Mutation-based alleles**: variants are stored as mutation lists, never
//!   expanded, keeping libraries small and diffable
//! - **Anchor translation**: indel-aware recomputation of reference points
//!   for derived alleles
//! - **Batch validation**: compilation reports every defect of a source set
//!   at once, not just the first
//! - **Source merging**: identical definitions from multiple sources merge
//!   their metadata; conflicting ones fail compilation
//! - **Checksummed artifacts**: the version id is a content checksum and is
//!   verified on every load
//!
//! ## Example
//!
//! ```rust,no_run
//! use vdjc_lib::{GeneRecord, GeneType, GeneFeature, LibraryCompiler};
//! use vdjc_lib::core::anchor::AnchorPointKind;
//!
//! let mut compiler = LibraryCompiler::new("HomoSapiens").taxon_id(9606);
//! compiler.add_source(
//!     "imgt",
//!     vec![
//!         GeneRecord::reference("TRBJ1-1*01", GeneType::Joining, "TGTGCCAGCAGTTTC")
//!             .with_anchor(AnchorPointKind::JBegin, 0)
//!             .with_anchor(AnchorPointKind::Cdr3End, 9)
//!             .with_anchor(AnchorPointKind::Fr4End, 15),
//!         GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["SG3C"]),
//!     ],
//! );
//!
//! let snapshot = compiler.compile().expect("sources are consistent");
//! let fr4 = snapshot.extract_feature("TRBJ1-1*02", GeneFeature::Fr4).unwrap();
//! println!("{}: FR4 = {}", snapshot.version(), fr4);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: sequences, mutations, anchor points, features, allele data
//! - [`library`]: compiler, snapshots, registry and the artifact codec
//! - [`utils`]: checksum helpers and artifact limits

pub mod core;
pub mod library;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::anchor::{AnchorMap, AnchorPointKind};
pub use crate::core::feature::{FeatureError, GeneFeature};
pub use crate::core::gene::{Allele, AlleleBody};
pub use crate::core::mutation::Mutation;
pub use crate::core::sequence::NucleotideSequence;
pub use crate::core::types::{AlleleName, Functionality, GeneType};
pub use crate::library::codec::CodecError;
pub use crate::library::compiler::{
    CompileFailure, Diagnostic, DiagnosticKind, GeneRecord, LibraryCompiler, RecordBody,
};
pub use crate::library::registry::{LibraryRegistry, RegistryError, VersionSelector};
pub use crate::library::snapshot::{LibrarySnapshot, QueryError, ResolveError, ResolvedAllele};
