//! Library compilation, storage and serialization.
//!
//! This module provides the snapshot lifecycle:
//!
//! - [`LibraryCompiler`](compiler::LibraryCompiler): raw source records in, one validated snapshot out
//! - [`LibrarySnapshot`](snapshot::LibrarySnapshot): immutable arena with memoized allele resolution
//! - [`LibraryRegistry`](registry::LibraryRegistry): loaded snapshots keyed by species and version
//! - [`codec`]: the persisted JSON artifact format with content checksums
//!
//! ## Lifecycle
//!
//! A snapshot is built exactly once, either by a compilation run reaching
//! `Finalized` or by the codec accepting an artifact, and is never patched
//! afterwards. Editing a library means compiling a new snapshot with a new
//! content-derived version id; readers holding the old `Arc` are unaffected.

pub mod codec;
pub mod compiler;
pub mod registry;
pub mod snapshot;
