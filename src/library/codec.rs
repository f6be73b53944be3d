//! Serialization of library snapshots to the persisted artifact format.
//!
//! The artifact is a single JSON document, optionally gzip-compressed.
//! Reference alleles are written with their full sequence and anchor map;
//! Derived alleles are written as parent name plus textual mutation tokens
//! and are never expanded — that keeps artifacts small and makes two library
//! versions diffable at the mutation-list level.
//!
//! The `version` field is a checksum over the canonical rendering of the
//! document's content. Reading recomputes it and rejects any mismatch, so a
//! corrupted or hand-edited artifact never becomes a snapshot.

use crate::core::anchor::AnchorMap;
use crate::core::gene::{Allele, AlleleBody};
use crate::core::mutation::Mutation;
use crate::core::sequence::NucleotideSequence;
use crate::core::types::{AlleleName, Functionality, GeneType};
use crate::library::snapshot::{AssembledGene, LibrarySnapshot, ResolveError};
use crate::utils::validation::{is_valid_md5, md5_hex, MAX_ALLELES, MAX_GENES};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{Read, Write as _};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Format tag carried by every artifact; mismatches are tolerated with a
/// warning so older artifacts keep loading.
pub const ARTIFACT_FORMAT: &str = "vdjc-lib/1";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: String, computed: String },

    #[error("allele '{allele}' references parent '{parent}' missing from the artifact")]
    DanglingReference { allele: String, parent: String },

    #[error("allele '{allele}' participates in a cyclic derivation chain")]
    CyclicDerivation { allele: String },

    #[error("malformed artifact: {0}")]
    Malformed(String),
}

/// Serializable artifact envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDoc {
    pub format: String,
    /// Content checksum, doubling as the library version id.
    pub version: String,
    pub created: DateTime<Utc>,
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_id: Option<u64>,
    pub genes: Vec<GeneDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneDoc {
    pub name: String,
    pub gene_type: GeneType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<String>,
    pub alleles: Vec<AlleleDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlleleDoc {
    pub name: String,
    pub functionality: Functionality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub body: BodyDoc,
}

/// Persisted allele body. Untagged: the presence of `sequence` vs `parent`
/// decides the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyDoc {
    Reference {
        sequence: NucleotideSequence,
        anchors: AnchorMap,
    },
    Derived {
        parent: String,
        mutations: Vec<String>,
    },
}

/// Serialize a snapshot to pretty-printed artifact JSON.
///
/// # Errors
///
/// Only JSON serialization failures, which plain data does not produce in
/// practice.
pub fn write(snapshot: &LibrarySnapshot) -> Result<String, CodecError> {
    let doc = doc_from_snapshot(snapshot);
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Write an artifact file; a `.gz` extension selects gzip compression.
///
/// # Errors
///
/// IO or serialization failures.
pub fn write_file(snapshot: &LibrarySnapshot, path: &Path) -> Result<(), CodecError> {
    let text = write(snapshot)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        let file = std::fs::File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;
    } else {
        std::fs::write(path, text)?;
    }
    Ok(())
}

/// Parse and fully validate an artifact.
///
/// # Errors
///
/// `ChecksumMismatch` when the declared version does not match the
/// recomputed content checksum, `DanglingReference`/`CyclicDerivation` for
/// structurally broken derivation chains, `Malformed` for everything else.
pub fn read_str(text: &str) -> Result<LibrarySnapshot, CodecError> {
    let doc: ArtifactDoc = serde_json::from_str(text)?;

    if doc.format != ARTIFACT_FORMAT {
        warn!(
            declared = %doc.format,
            expected = ARTIFACT_FORMAT,
            "artifact format tag mismatch"
        );
    }

    if doc.genes.len() > MAX_GENES {
        return Err(CodecError::Malformed(format!(
            "too many genes: {} exceeds the maximum of {MAX_GENES}",
            doc.genes.len()
        )));
    }
    let num_alleles: usize = doc.genes.iter().map(|g| g.alleles.len()).sum();
    if num_alleles > MAX_ALLELES {
        return Err(CodecError::Malformed(format!(
            "too many alleles: {num_alleles} exceeds the maximum of {MAX_ALLELES}"
        )));
    }

    let computed = content_checksum(&doc.species, doc.taxon_id, &doc.genes);
    if !is_valid_md5(&doc.version) || doc.version != computed {
        return Err(CodecError::ChecksumMismatch {
            declared: doc.version,
            computed,
        });
    }

    let snapshot = snapshot_from_doc(doc)?;

    // Resolve every allele up front: surfaces cycles, dangling parents and
    // inapplicable mutation lists before the snapshot is handed out.
    for idx in 0..snapshot.arena().len() {
        if let Err(err) = snapshot.resolve_index(idx) {
            return Err(match err {
                ResolveError::UnknownParent { allele, parent } => {
                    CodecError::DanglingReference { allele, parent }
                }
                ResolveError::CyclicDerivation { allele } => {
                    CodecError::CyclicDerivation { allele }
                }
                ResolveError::MutationApply { allele, source } => CodecError::Malformed(format!(
                    "allele '{allele}' has an inapplicable mutation list: {source}"
                )),
            });
        }
    }

    Ok(snapshot)
}

/// Read an artifact file, transparently decompressing gzip.
///
/// # Errors
///
/// IO failures plus everything [`read_str`] rejects.
pub fn read_file(path: &Path) -> Result<LibrarySnapshot, CodecError> {
    let bytes = std::fs::read(path)?;
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(bytes)
            .map_err(|_| CodecError::Malformed("artifact is not valid UTF-8".to_string()))?
    };
    read_str(&text)
}

/// Content checksum of a snapshot, used by the compiler to stamp the
/// version id at finalization.
#[must_use]
pub(crate) fn checksum_for(snapshot: &LibrarySnapshot) -> String {
    let genes = genes_from_snapshot(snapshot);
    content_checksum(snapshot.species(), snapshot.taxon_id(), &genes)
}

fn doc_from_snapshot(snapshot: &LibrarySnapshot) -> ArtifactDoc {
    ArtifactDoc {
        format: ARTIFACT_FORMAT.to_string(),
        version: snapshot.version().to_string(),
        created: snapshot.created(),
        species: snapshot.species().to_string(),
        taxon_id: snapshot.taxon_id(),
        genes: genes_from_snapshot(snapshot),
    }
}

fn genes_from_snapshot(snapshot: &LibrarySnapshot) -> Vec<GeneDoc> {
    snapshot
        .genes()
        .iter()
        .map(|gene| GeneDoc {
            name: gene.name.clone(),
            gene_type: gene.gene_type,
            chains: gene.chains.clone(),
            alleles: snapshot
                .alleles_of(gene)
                .iter()
                .map(allele_to_doc)
                .collect(),
        })
        .collect()
}

fn allele_to_doc(allele: &Allele) -> AlleleDoc {
    let body = match &allele.body {
        AlleleBody::Reference(sequence) => BodyDoc::Reference {
            sequence: sequence.clone(),
            anchors: allele.anchors.clone(),
        },
        AlleleBody::Derived { parent, mutations } => BodyDoc::Derived {
            parent: parent.to_string(),
            mutations: mutations.iter().map(Mutation::to_string).collect(),
        },
    };
    AlleleDoc {
        name: allele.name.to_string(),
        functionality: allele.functionality,
        synonyms: allele.synonyms.iter().cloned().collect(),
        sources: allele.sources.iter().cloned().collect(),
        body,
    }
}

fn snapshot_from_doc(doc: ArtifactDoc) -> Result<LibrarySnapshot, CodecError> {
    let mut known_names = HashSet::new();
    for gene in &doc.genes {
        for allele in &gene.alleles {
            if !known_names.insert(allele.name.clone()) {
                return Err(CodecError::Malformed(format!(
                    "duplicate allele '{}'",
                    allele.name
                )));
            }
        }
    }

    let mut seen_genes = HashSet::new();
    let mut assembled = Vec::with_capacity(doc.genes.len());
    for gene in doc.genes {
        if !seen_genes.insert(gene.name.clone()) {
            return Err(CodecError::Malformed(format!(
                "duplicate gene '{}'",
                gene.name
            )));
        }
        let mut alleles = Vec::with_capacity(gene.alleles.len());
        for allele in gene.alleles {
            alleles.push(allele_from_doc(allele, &gene.name, &known_names)?);
        }
        assembled.push(AssembledGene {
            name: gene.name,
            gene_type: gene.gene_type,
            chains: gene.chains,
            alleles,
        });
    }

    Ok(LibrarySnapshot::assemble(
        doc.species,
        doc.taxon_id,
        doc.version,
        doc.created,
        assembled,
    ))
}

fn allele_from_doc(
    doc: AlleleDoc,
    gene_name: &str,
    known_names: &HashSet<String>,
) -> Result<Allele, CodecError> {
    let name: AlleleName = doc
        .name
        .parse()
        .map_err(|err| CodecError::Malformed(format!("{err}")))?;
    if name.gene() != gene_name {
        return Err(CodecError::Malformed(format!(
            "allele '{name}' listed under gene '{gene_name}'"
        )));
    }

    let (body, anchors) = match doc.body {
        BodyDoc::Reference { sequence, anchors } => (AlleleBody::Reference(sequence), anchors),
        BodyDoc::Derived { parent, mutations } => {
            if !known_names.contains(&parent) {
                return Err(CodecError::DanglingReference {
                    allele: doc.name,
                    parent,
                });
            }
            let parent: AlleleName = parent
                .parse()
                .map_err(|err| CodecError::Malformed(format!("{err}")))?;
            let mutations = mutations
                .iter()
                .map(|token| token.parse::<Mutation>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| {
                    CodecError::Malformed(format!("allele '{name}' has a bad mutation: {err}"))
                })?;
            (AlleleBody::Derived { parent, mutations }, AnchorMap::new())
        }
    };

    Ok(Allele {
        name,
        body,
        anchors,
        functionality: doc.functionality,
        sources: doc.sources.into_iter().collect(),
        synonyms: doc.synonyms.into_iter().collect(),
    })
}

/// Deterministic canonical rendering of artifact content, digested into the
/// version checksum. Field order is fixed and maps are ordered, so equal
/// content always produces equal checksums.
fn content_checksum(species: &str, taxon_id: Option<u64>, genes: &[GeneDoc]) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "species|{species}");
    if let Some(taxon_id) = taxon_id {
        let _ = writeln!(content, "taxon|{taxon_id}");
    }
    for gene in genes {
        let _ = writeln!(
            content,
            "gene|{}|{}|{}",
            gene.name,
            gene.gene_type,
            gene.chains.join(",")
        );
        for allele in &gene.alleles {
            let _ = write!(
                content,
                "allele|{}|{}|{}|{}|",
                allele.name,
                allele.functionality,
                allele.synonyms.join(","),
                allele.sources.join(",")
            );
            match &allele.body {
                BodyDoc::Reference { sequence, anchors } => {
                    let _ = write!(content, "ref|{sequence}|");
                    for (kind, pos) in anchors {
                        let _ = write!(content, "{kind}={pos};");
                    }
                }
                BodyDoc::Derived { parent, mutations } => {
                    let _ = write!(content, "der|{parent}|{}", mutations.join(","));
                }
            }
            content.push('\n');
        }
    }
    md5_hex(content.as_bytes())
}
