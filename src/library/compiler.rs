//! Library compilation: raw per-source gene records in, one immutable
//! snapshot out.
//!
//! A compilation run moves through `Collecting -> Validating -> Merging ->
//! Finalized`, or ends in `Failed` carrying the complete diagnostic report.
//! Validation never stops at the first problem: every record is checked and
//! every allele resolved so a broken source surfaces all of its defects in
//! one run. A snapshot is only produced when the run reaches `Finalized`;
//! there is no partial output.
//!
//! Raw records are deliberately loose — sequences and mutation tokens arrive
//! as text — because rejecting a malformed record with a located diagnostic
//! is the compiler's job, not the caller's.

use crate::core::anchor::{validate_ordering, AnchorMap, AnchorPointKind, OrderingViolation};
use crate::core::gene::{Allele, AlleleBody};
use crate::core::mutation::{self, Mutation, MutationError, MutationParseError};
use crate::core::sequence::{NucleotideSequence, SequenceError};
use crate::core::types::{
    smart_compare, AlleleName, AlleleNameError, Functionality, GeneType,
};
use crate::library::codec;
use crate::library::snapshot::{AssembledGene, LibrarySnapshot, QueryError, ResolveError};
use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// One raw gene/allele record as delivered by a source.
#[derive(Debug, Clone)]
pub struct GeneRecord {
    /// Full allele name, e.g. `TRBV12-3*01`.
    pub name: String,
    pub gene_type: GeneType,
    pub functionality: Functionality,
    /// Receptor chains of the owning gene, e.g. `["TRB"]`.
    pub chains: Vec<String>,
    pub synonyms: Vec<String>,
    pub body: RecordBody,
    /// Directly observed anchor positions. Required for Reference records;
    /// optional on Derived records, where they are cross-checked against
    /// the inherited positions instead of overriding them.
    pub anchors: AnchorMap,
}

/// Body of a raw record: full sequence text, or parent plus mutation tokens.
#[derive(Debug, Clone)]
pub enum RecordBody {
    Reference(String),
    Derived {
        parent: String,
        mutations: Vec<String>,
    },
}

impl GeneRecord {
    /// A Reference record carrying the canonical sequence.
    pub fn reference(
        name: impl Into<String>,
        gene_type: GeneType,
        sequence: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            gene_type,
            functionality: Functionality::Functional,
            chains: Vec::new(),
            synonyms: Vec::new(),
            body: RecordBody::Reference(sequence.into()),
            anchors: AnchorMap::new(),
        }
    }

    /// A Derived record: mutations against another allele of the same gene.
    pub fn derived<I, S>(
        name: impl Into<String>,
        gene_type: GeneType,
        parent: impl Into<String>,
        mutations: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            gene_type,
            functionality: Functionality::Functional,
            chains: Vec::new(),
            synonyms: Vec::new(),
            body: RecordBody::Derived {
                parent: parent.into(),
                mutations: mutations
                    .into_iter()
                    .map(|m| m.as_ref().to_string())
                    .collect(),
            },
            anchors: AnchorMap::new(),
        }
    }

    #[must_use]
    pub fn with_anchor(mut self, kind: AnchorPointKind, position: u32) -> Self {
        self.anchors.insert(kind, position);
        self
    }

    #[must_use]
    pub fn with_functionality(mut self, functionality: Functionality) -> Self {
        self.functionality = functionality;
        self
    }

    #[must_use]
    pub fn with_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.chains = chains.into_iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.synonyms = synonyms
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    #[error("malformed allele name: {0}")]
    MalformedName(AlleleNameError),

    #[error("duplicate record within the same source")]
    DuplicateRecord,

    #[error("invalid sequence: {0}")]
    InvalidSequence(SequenceError),

    #[error("empty reference sequence")]
    EmptySequence,

    #[error("invalid mutation token '{token}': {source}")]
    BadMutation {
        token: String,
        #[source]
        source: MutationParseError,
    },

    #[error("anchor {kind} at {position} is out of bounds for a sequence of length {length}")]
    AnchorOutOfBounds {
        kind: AnchorPointKind,
        position: u32,
        length: usize,
    },

    #[error(transparent)]
    Ordering(OrderingViolation),

    #[error("malformed parent name: {0}")]
    MalformedParent(AlleleNameError),

    #[error("parent '{parent}' belongs to another gene")]
    CrossGeneParent { parent: String },

    #[error("derives from unknown parent '{parent}'")]
    UnknownParent { parent: String },

    #[error("cyclic derivation chain")]
    CyclicDerivation,

    #[error("mutation list cannot be applied: {0}")]
    MutationApply(MutationError),

    #[error("declared anchor {kind} at {declared} disagrees with the inherited position {computed:?}")]
    AnchorMismatch {
        kind: AnchorPointKind,
        declared: u32,
        computed: Option<u32>,
    },

    #[error("gene type {found} conflicts with {expected} declared earlier for gene '{gene}'")]
    GeneTypeConflict {
        gene: String,
        expected: GeneType,
        found: GeneType,
    },

    #[error("resolved sequence conflicts with the definition from source '{other_source}'")]
    ConflictingAlleleDefinition { other_source: String },
}

/// One located validation or merge problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source the offending record came from.
    pub source: String,
    /// Full allele name as written in the record.
    pub allele: String,
    pub kind: DiagnosticKind,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.source, self.allele, self.kind)
    }
}

/// A failed compilation run with its complete diagnostic report.
#[derive(Error, Debug)]
#[error("library compilation failed with {} diagnostic(s)", .diagnostics.len())]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

/// A record that survived local validation, normalized into snapshot form.
#[derive(Debug, Clone)]
struct ValidRecord {
    source: String,
    allele: Allele,
    /// Anchors as written in the raw record; for Derived records these are
    /// cross-checked against the inherited positions.
    declared_anchors: AnchorMap,
}

/// Compiles raw gene records from one or more sources into a snapshot.
///
/// Sources are prioritized by insertion order: when the same allele appears
/// in several sources with an identical resolved sequence, the earliest
/// source wins anchor conflicts and the rest contribute metadata.
#[derive(Debug)]
pub struct LibraryCompiler {
    species: String,
    taxon_id: Option<u64>,
    sources: Vec<(String, Vec<GeneRecord>)>,
}

impl LibraryCompiler {
    pub fn new(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            taxon_id: None,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn taxon_id(mut self, taxon_id: u64) -> Self {
        self.taxon_id = Some(taxon_id);
        self
    }

    /// Add one source's records. Earlier sources have higher priority.
    pub fn add_source(&mut self, id: impl Into<String>, records: Vec<GeneRecord>) {
        self.sources.push((id.into(), records));
    }

    /// Run the compilation to completion.
    ///
    /// # Errors
    ///
    /// `CompileFailure` with the full diagnostic list when any record fails
    /// validation or sources conflict; no snapshot is produced in that case.
    pub fn compile(self) -> Result<LibrarySnapshot, CompileFailure> {
        let record_count: usize = self.sources.iter().map(|(_, r)| r.len()).sum();
        debug!(
            species = %self.species,
            sources = self.sources.len(),
            records = record_count,
            "compiling library"
        );

        let mut diagnostics = Vec::new();
        let mut gene_types: HashMap<String, GeneType> = HashMap::new();
        let mut gene_chains: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut primaries: Vec<ValidRecord> = Vec::new();
        let mut primary_of: HashMap<String, usize> = HashMap::new();
        let mut duplicates: Vec<ValidRecord> = Vec::new();

        // Validating: record-local checks, in source priority order.
        for (source_id, records) in &self.sources {
            let mut in_source: HashSet<String> = HashSet::new();
            for record in records {
                if !in_source.insert(record.name.clone()) {
                    diagnostics.push(Diagnostic {
                        source: source_id.clone(),
                        allele: record.name.clone(),
                        kind: DiagnosticKind::DuplicateRecord,
                    });
                    continue;
                }
                let Some(valid) = check_record(source_id, record, &mut diagnostics) else {
                    continue;
                };

                let gene = valid.allele.name.gene().to_string();
                match gene_types.get(&gene) {
                    None => {
                        gene_types.insert(gene.clone(), record.gene_type);
                    }
                    Some(&expected) if expected != record.gene_type => {
                        diagnostics.push(Diagnostic {
                            source: source_id.clone(),
                            allele: record.name.clone(),
                            kind: DiagnosticKind::GeneTypeConflict {
                                gene: gene.clone(),
                                expected,
                                found: record.gene_type,
                            },
                        });
                        continue;
                    }
                    Some(_) => {}
                }
                gene_chains
                    .entry(gene)
                    .or_default()
                    .extend(record.chains.iter().cloned());

                let full = valid.allele.name.to_string();
                if primary_of.contains_key(&full) {
                    duplicates.push(valid);
                } else {
                    primary_of.insert(full, primaries.len());
                    primaries.push(valid);
                }
            }
        }

        // Validating: resolve every primary allele against the combined
        // arena; collects cycles, dangling parents, inapplicable mutation
        // lists and derived-anchor problems in one pass.
        let provisional = assemble_from(
            &self.species,
            self.taxon_id,
            &primaries,
            &gene_types,
            &gene_chains,
        );
        for record in &primaries {
            let full = record.allele.name.to_string();
            validate_resolution(&provisional, record, &full, &gene_types, &mut diagnostics);
        }

        if !diagnostics.is_empty() {
            debug!(diagnostics = diagnostics.len(), "validation failed");
            return Err(CompileFailure { diagnostics });
        }

        // Merging: fold duplicate definitions into their primaries.
        debug!(duplicates = duplicates.len(), "merging across sources");
        let mut adopted_anchors: HashSet<usize> = HashSet::new();
        for dup in &duplicates {
            let full = dup.allele.name.to_string();
            // primary_of always has the name: the duplicate's own record
            // validated, so some record with this name did too.
            let Some(&primary_idx) = primary_of.get(&full) else {
                continue;
            };

            let dup_sequence = match resolve_duplicate(&provisional, dup) {
                Ok(sequence) => sequence,
                Err(kind) => {
                    diagnostics.push(Diagnostic {
                        source: dup.source.clone(),
                        allele: full,
                        kind,
                    });
                    continue;
                }
            };
            let primary_sequence = match provisional.resolve_sequence(&full) {
                Ok(sequence) => sequence,
                // Primaries were fully validated above.
                Err(_) => continue,
            };

            if dup_sequence != *primary_sequence {
                diagnostics.push(Diagnostic {
                    source: dup.source.clone(),
                    allele: full,
                    kind: DiagnosticKind::ConflictingAlleleDefinition {
                        other_source: primaries[primary_idx].source.clone(),
                    },
                });
                continue;
            }

            let primary = &mut primaries[primary_idx];
            primary.allele.sources.insert(dup.source.clone());
            primary.allele.synonyms.extend(dup.allele.synonyms.iter().cloned());
            if primary.allele.body.is_reference() {
                for (&kind, &pos) in &dup.declared_anchors {
                    // Only fill gaps; on conflict the higher-priority
                    // source's position stands.
                    if let Entry::Vacant(slot) = primary.allele.anchors.entry(kind) {
                        slot.insert(pos);
                        adopted_anchors.insert(primary_idx);
                    }
                }
            }
        }

        // Anchors adopted from lower-priority sources must still satisfy
        // the topology ordering.
        for &idx in &adopted_anchors {
            let record = &primaries[idx];
            let gene_type = gene_types[record.allele.name.gene()];
            for violation in validate_ordering(gene_type, &record.allele.anchors) {
                diagnostics.push(Diagnostic {
                    source: record.source.clone(),
                    allele: record.allele.name.to_string(),
                    kind: DiagnosticKind::Ordering(violation),
                });
            }
        }

        if !diagnostics.is_empty() {
            debug!(diagnostics = diagnostics.len(), "merge failed");
            return Err(CompileFailure { diagnostics });
        }

        // Finalized: canonical order, content checksum, immutable snapshot.
        let mut snapshot = assemble_from(
            &self.species,
            self.taxon_id,
            &primaries,
            &gene_types,
            &gene_chains,
        );
        let version = codec::checksum_for(&snapshot);
        snapshot.set_version(version);
        debug!(
            genes = snapshot.len(),
            alleles = snapshot.num_alleles(),
            version = %snapshot.version(),
            "library finalized"
        );
        Ok(snapshot)
    }
}

/// Record-local validation; returns the normalized record or pushes
/// diagnostics and returns None.
fn check_record(
    source_id: &str,
    record: &GeneRecord,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ValidRecord> {
    let mut push = |kind: DiagnosticKind| {
        diagnostics.push(Diagnostic {
            source: source_id.to_string(),
            allele: record.name.clone(),
            kind,
        });
    };

    let name: AlleleName = match record.name.parse() {
        Ok(name) => name,
        Err(err) => {
            push(DiagnosticKind::MalformedName(err));
            return None;
        }
    };

    let mut ok = true;
    let body = match &record.body {
        RecordBody::Reference(raw) => {
            let sequence: NucleotideSequence = match raw.parse() {
                Ok(sequence) => sequence,
                Err(err) => {
                    push(DiagnosticKind::InvalidSequence(err));
                    return None;
                }
            };
            if sequence.is_empty() {
                push(DiagnosticKind::EmptySequence);
                return None;
            }
            for (&kind, &position) in &record.anchors {
                if position as usize > sequence.len() {
                    push(DiagnosticKind::AnchorOutOfBounds {
                        kind,
                        position,
                        length: sequence.len(),
                    });
                    ok = false;
                }
            }
            for violation in validate_ordering(record.gene_type, &record.anchors) {
                push(DiagnosticKind::Ordering(violation));
                ok = false;
            }
            AlleleBody::Reference(sequence)
        }
        RecordBody::Derived { parent, mutations } => {
            let parent: AlleleName = match parent.parse() {
                Ok(parent) => parent,
                Err(err) => {
                    push(DiagnosticKind::MalformedParent(err));
                    return None;
                }
            };
            if parent.gene() != name.gene() {
                push(DiagnosticKind::CrossGeneParent {
                    parent: parent.to_string(),
                });
                return None;
            }
            let mut parsed = Vec::with_capacity(mutations.len());
            for token in mutations {
                match token.parse::<Mutation>() {
                    Ok(mutation) => parsed.push(mutation),
                    Err(err) => {
                        push(DiagnosticKind::BadMutation {
                            token: token.clone(),
                            source: err,
                        });
                        ok = false;
                    }
                }
            }
            // Declared anchors on derived records are checked for topology
            // membership here; positions are cross-checked post-resolution.
            for &kind in record.anchors.keys() {
                if kind.gene_type() != record.gene_type {
                    push(DiagnosticKind::Ordering(OrderingViolation::Foreign {
                        kind,
                        gene_type: record.gene_type,
                    }));
                    ok = false;
                }
            }
            AlleleBody::Derived {
                parent,
                mutations: parsed,
            }
        }
    };
    if !ok {
        return None;
    }

    let anchors = match &body {
        AlleleBody::Reference(_) => record.anchors.clone(),
        AlleleBody::Derived { .. } => AnchorMap::new(),
    };
    Some(ValidRecord {
        source: source_id.to_string(),
        allele: Allele {
            name,
            body,
            anchors,
            functionality: record.functionality,
            sources: BTreeSet::from([source_id.to_string()]),
            synonyms: record.synonyms.iter().cloned().collect(),
        },
        declared_anchors: record.anchors.clone(),
    })
}

/// Resolution-phase validation of one primary allele.
fn validate_resolution(
    provisional: &LibrarySnapshot,
    record: &ValidRecord,
    full: &str,
    gene_types: &HashMap<String, GeneType>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut push = |kind: DiagnosticKind| {
        diagnostics.push(Diagnostic {
            source: record.source.clone(),
            allele: full.to_string(),
            kind,
        });
    };

    let anchors = match provisional.resolve_anchors(full) {
        Ok(anchors) => anchors,
        Err(QueryError::Resolve(err)) => {
            // Attribute the failure to this allele only when it is the
            // directly affected one; ancestors report their own.
            match err {
                ResolveError::UnknownParent { allele, parent } if allele == full => {
                    push(DiagnosticKind::UnknownParent { parent });
                }
                ResolveError::CyclicDerivation { allele } if allele == full => {
                    push(DiagnosticKind::CyclicDerivation);
                }
                ResolveError::MutationApply { allele, source } if allele == full => {
                    push(DiagnosticKind::MutationApply(source));
                }
                // Failure inherited from an ancestor; that ancestor's own
                // diagnostic locates it.
                _ => {}
            }
            return;
        }
        Err(_) => return,
    };

    if record.allele.body.is_reference() {
        return;
    }

    let Some(&gene_type) = gene_types.get(record.allele.name.gene()) else {
        return;
    };
    for violation in validate_ordering(gene_type, anchors) {
        push(DiagnosticKind::Ordering(violation));
    }
    for (&kind, &declared) in &record.declared_anchors {
        let computed = anchors.get(&kind).copied();
        if computed != Some(declared) {
            push(DiagnosticKind::AnchorMismatch {
                kind,
                declared,
                computed,
            });
        }
    }
}

/// Resolved sequence of a duplicate record, evaluated against the primary
/// arena so its parent chain refers to the already-validated definitions.
fn resolve_duplicate(
    provisional: &LibrarySnapshot,
    dup: &ValidRecord,
) -> Result<NucleotideSequence, DiagnosticKind> {
    match &dup.allele.body {
        AlleleBody::Reference(sequence) => Ok(sequence.clone()),
        AlleleBody::Derived { parent, mutations } => {
            let parent_sequence = provisional
                .resolve_sequence(&parent.to_string())
                .map_err(|_| DiagnosticKind::UnknownParent {
                    parent: parent.to_string(),
                })?;
            mutation::apply(mutations, parent_sequence).map_err(DiagnosticKind::MutationApply)
        }
    }
}

/// Group validated records into genes, order them canonically and assemble
/// a snapshot (version stamped separately).
fn assemble_from(
    species: &str,
    taxon_id: Option<u64>,
    primaries: &[ValidRecord],
    gene_types: &HashMap<String, GeneType>,
    gene_chains: &HashMap<String, BTreeSet<String>>,
) -> LibrarySnapshot {
    let mut by_gene: BTreeMap<String, Vec<Allele>> = BTreeMap::new();
    for record in primaries {
        by_gene
            .entry(record.allele.name.gene().to_string())
            .or_default()
            .push(record.allele.clone());
    }

    let mut gene_names: Vec<String> = by_gene.keys().cloned().collect();
    gene_names.sort_by(|a, b| smart_compare(a, b));

    let assembled = gene_names
        .into_iter()
        .map(|name| {
            let mut alleles = by_gene.remove(&name).unwrap_or_default();
            alleles.sort_by(|a, b| a.name.cmp(&b.name));
            AssembledGene {
                gene_type: gene_types.get(&name).copied().unwrap_or(GeneType::Variable),
                chains: gene_chains
                    .get(&name)
                    .map(|chains| chains.iter().cloned().collect())
                    .unwrap_or_default(),
                name,
                alleles,
            }
        })
        .collect();

    LibrarySnapshot::assemble(
        species.to_string(),
        taxon_id,
        String::new(),
        Utc::now(),
        assembled,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::anchor::AnchorPointKind as K;
    use crate::core::feature::GeneFeature;

    fn j_reference(name: &str) -> GeneRecord {
        GeneRecord::reference(name, GeneType::Joining, "TGTGCCAGCAGTTTC")
            .with_anchor(K::JBegin, 0)
            .with_anchor(K::Cdr3End, 9)
            .with_anchor(K::Fr4End, 15)
            .with_chains(["TRB"])
    }

    fn compile(sources: Vec<(&str, Vec<GeneRecord>)>) -> Result<LibrarySnapshot, CompileFailure> {
        let mut compiler = LibraryCompiler::new("HomoSapiens").taxon_id(9606);
        for (id, records) in sources {
            compiler.add_source(id, records);
        }
        compiler.compile()
    }

    fn kinds(failure: &CompileFailure) -> Vec<&DiagnosticKind> {
        failure.diagnostics.iter().map(|d| &d.kind).collect()
    }

    #[test]
    fn test_compile_single_source() {
        let snapshot = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["SG3C"]),
            ],
        )])
        .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.num_alleles(), 2);
        assert_eq!(
            snapshot.resolve_sequence("TRBJ1-1*02").unwrap().to_string(),
            "TGTCCCAGCAGTTTC"
        );
        assert!(!snapshot.version().is_empty());
    }

    #[test]
    fn test_merge_identical_definitions() {
        let snapshot = compile(vec![
            ("imgt", vec![j_reference("TRBJ1-1*01")]),
            (
                "ogrdb",
                vec![j_reference("TRBJ1-1*01").with_synonyms(["TCRBJ1S1*01"])],
            ),
        ])
        .unwrap();

        let allele = snapshot.find_allele("TRBJ1-1*01").unwrap();
        assert!(allele.sources.contains("imgt"));
        assert!(allele.sources.contains("ogrdb"));
        assert!(allele.synonyms.contains("TCRBJ1S1*01"));
        assert_eq!(snapshot.num_alleles(), 1);
    }

    #[test]
    fn test_merge_prefers_higher_priority_anchors() {
        let mut other = j_reference("TRBJ1-1*01");
        other.anchors.insert(K::Cdr3End, 10);
        let snapshot = compile(vec![
            ("imgt", vec![j_reference("TRBJ1-1*01")]),
            ("ogrdb", vec![other]),
        ])
        .unwrap();
        assert_eq!(
            snapshot.resolve_anchors("TRBJ1-1*01").unwrap()[&K::Cdr3End],
            9
        );
    }

    #[test]
    fn test_merge_adopts_missing_anchors() {
        // Lower-priority source knows the optional CExon1End.
        let primary = GeneRecord::reference("TRBC1*01", GeneType::Constant, "ACGTACGTACGTACGT")
            .with_anchor(K::CBegin, 0)
            .with_anchor(K::CEnd, 16);
        let secondary = GeneRecord::reference("TRBC1*01", GeneType::Constant, "ACGTACGTACGTACGT")
            .with_anchor(K::CBegin, 0)
            .with_anchor(K::CExon1End, 12)
            .with_anchor(K::CEnd, 16);
        let snapshot = compile(vec![("imgt", vec![primary]), ("ogrdb", vec![secondary])]).unwrap();
        assert_eq!(
            snapshot.resolve_anchors("TRBC1*01").unwrap()[&K::CExon1End],
            12
        );
    }

    #[test]
    fn test_conflicting_definitions_fail() {
        let mut other = j_reference("TRBJ1-1*01");
        other.body = RecordBody::Reference("TGTGCCAGCAGTTTA".to_string());
        let failure = compile(vec![
            ("imgt", vec![j_reference("TRBJ1-1*01")]),
            ("ogrdb", vec![other]),
        ])
        .unwrap_err();

        assert!(kinds(&failure).iter().any(|k| matches!(
            k,
            DiagnosticKind::ConflictingAlleleDefinition { other_source } if other_source == "imgt"
        )));
    }

    #[test]
    fn test_diagnostics_accumulate() {
        let failure = compile(vec![(
            "broken",
            vec![
                GeneRecord::reference("TRBJ1-1", GeneType::Joining, "TGT"),
                GeneRecord::reference("TRBJ1-2*01", GeneType::Joining, "TG-T"),
                GeneRecord::derived("TRBJ1-3*02", GeneType::Joining, "TRBJ1-3*01", ["QQ"]),
            ],
        )])
        .unwrap_err();

        let kinds = kinds(&failure);
        assert!(kinds.iter().any(|k| matches!(k, DiagnosticKind::MalformedName(_))));
        assert!(kinds.iter().any(|k| matches!(k, DiagnosticKind::InvalidSequence(_))));
        assert!(kinds.iter().any(|k| matches!(k, DiagnosticKind::BadMutation { .. })));
        assert_eq!(failure.diagnostics.len(), 3);
    }

    #[test]
    fn test_missing_required_anchor_fails() {
        let mut record = j_reference("TRBJ1-1*01");
        record.anchors.remove(&K::Cdr3End);
        let failure = compile(vec![("imgt", vec![record])]).unwrap_err();
        assert!(kinds(&failure).iter().any(|k| matches!(
            k,
            DiagnosticKind::Ordering(OrderingViolation::MissingRequired(K::Cdr3End))
        )));
    }

    #[test]
    fn test_anchor_out_of_bounds_fails() {
        let record = j_reference("TRBJ1-1*01").with_anchor(K::Fr4End, 99);
        let failure = compile(vec![("imgt", vec![record])]).unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::AnchorOutOfBounds { position: 99, .. })));
    }

    #[test]
    fn test_unknown_parent_fails() {
        let failure = compile(vec![(
            "imgt",
            vec![GeneRecord::derived(
                "TRBJ1-1*02",
                GeneType::Joining,
                "TRBJ1-1*01",
                Vec::<String>::new(),
            )],
        )])
        .unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::UnknownParent { .. })));
    }

    #[test]
    fn test_cyclic_derivation_fails() {
        let failure = compile(vec![(
            "imgt",
            vec![
                GeneRecord::derived("TRBJ1-1*01", GeneType::Joining, "TRBJ1-1*02", ["I0A"]),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["I0A"]),
            ],
        )])
        .unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::CyclicDerivation)));
    }

    #[test]
    fn test_cross_gene_parent_fails() {
        let failure = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-2*01", GeneType::Joining, "TRBJ1-1*01", ["SG3C"]),
            ],
        )])
        .unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::CrossGeneParent { .. })));
    }

    #[test]
    fn test_declared_anchor_mismatch_on_derived_fails() {
        // Insertion before CDR3End shifts it to 10; declaring 9 is stale.
        let failure = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["I3A"])
                    .with_anchor(K::Cdr3End, 9),
            ],
        )])
        .unwrap_err();
        assert!(kinds(&failure).iter().any(|k| matches!(
            k,
            DiagnosticKind::AnchorMismatch {
                kind: K::Cdr3End,
                declared: 9,
                computed: Some(10)
            }
        )));
    }

    #[test]
    fn test_declared_anchor_match_on_derived_accepted() {
        let snapshot = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["I3A"])
                    .with_anchor(K::Cdr3End, 10),
            ],
        )])
        .unwrap();
        assert_eq!(
            snapshot.resolve_anchors("TRBJ1-1*02").unwrap()[&K::Cdr3End],
            10
        );
    }

    #[test]
    fn test_derived_anchor_collapse_breaks_ordering() {
        // Deleting the whole FR4 pins FR4End onto CDR3End, which the
        // topology rejects for a J gene.
        let failure = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived(
                    "TRBJ1-1*02",
                    GeneType::Joining,
                    "TRBJ1-1*01",
                    ["DA9", "DG10", "DT11", "DT12", "DT13", "DC14"],
                ),
            ],
        )])
        .unwrap_err();
        assert!(kinds(&failure).iter().any(|k| matches!(
            k,
            DiagnosticKind::Ordering(OrderingViolation::NotIncreasing { .. })
        )));
    }

    #[test]
    fn test_gene_type_conflict_fails() {
        let failure = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::reference("TRBJ1-1*02", GeneType::Diversity, "ACGT")
                    .with_anchor(K::DBegin, 0)
                    .with_anchor(K::DEnd, 4),
            ],
        )])
        .unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::GeneTypeConflict { .. })));
    }

    #[test]
    fn test_duplicate_record_in_source_fails() {
        let failure = compile(vec![(
            "imgt",
            vec![j_reference("TRBJ1-1*01"), j_reference("TRBJ1-1*01")],
        )])
        .unwrap_err();
        assert!(kinds(&failure)
            .iter()
            .any(|k| matches!(k, DiagnosticKind::DuplicateRecord)));
    }

    #[test]
    fn test_version_is_deterministic() {
        let build = || {
            compile(vec![(
                "imgt",
                vec![
                    j_reference("TRBJ1-1*01"),
                    GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["SG3C"]),
                ],
            )])
            .unwrap()
        };
        assert_eq!(build().version(), build().version());

        let extended = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["SG3C"]),
                j_reference("TRBJ1-2*01"),
            ],
        )])
        .unwrap();
        assert_ne!(build().version(), extended.version());
    }

    #[test]
    fn test_genes_in_canonical_order() {
        let snapshot = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ2-1*01"),
                j_reference("TRBJ10-1*01"),
                j_reference("TRBJ1-1*01"),
            ],
        )])
        .unwrap();
        let names: Vec<&str> = snapshot.genes().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["TRBJ1-1", "TRBJ2-1", "TRBJ10-1"]);
    }

    #[test]
    fn test_compiled_snapshot_supports_feature_queries() {
        let snapshot = compile(vec![(
            "imgt",
            vec![
                j_reference("TRBJ1-1*01"),
                GeneRecord::derived("TRBJ1-1*02", GeneType::Joining, "TRBJ1-1*01", ["I3A"]),
            ],
        )])
        .unwrap();
        assert_eq!(
            snapshot
                .extract_feature("TRBJ1-1*02", GeneFeature::GermlineJCdr3Part)
                .unwrap()
                .to_string(),
            "TGTAGCCAGC"
        );
    }
}
