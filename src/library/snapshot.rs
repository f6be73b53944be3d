//! Immutable, versioned library snapshots and allele resolution.
//!
//! A [`LibrarySnapshot`] is produced once — by the compiler or the codec —
//! and never mutated afterwards. Alleles live in a flat arena addressed by
//! index; parent links are pre-resolved to arena indices so derivation
//! chains walk integers, not names. Resolution results are memoized in
//! per-allele [`OnceLock`] slots: resolution is a pure function of
//! `(snapshot, index)`, so concurrent duplicate computation can only waste
//! work, never disagree.

use crate::core::anchor::AnchorMap;
use crate::core::feature::{resolve_feature, FeatureError, GeneFeature};
use crate::core::gene::{Allele, AlleleBody};
use crate::core::mutation::{self, MutationError};
use crate::core::sequence::NucleotideSequence;
use crate::core::types::GeneType;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("allele '{allele}' participates in a cyclic derivation chain")]
    CyclicDerivation { allele: String },

    #[error("allele '{allele}' derives from unknown parent '{parent}'")]
    UnknownParent { allele: String, parent: String },

    #[error("allele '{allele}' has an inapplicable mutation list")]
    MutationApply {
        allele: String,
        #[source]
        source: MutationError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown allele '{0}'")]
    UnknownAllele(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// A named group of alleles of one gene type.
#[derive(Debug, Clone)]
pub struct Gene {
    pub name: String,
    pub gene_type: GeneType,
    /// Receptor chains this gene participates in, e.g. `["TRB"]`.
    pub chains: Vec<String>,
    /// Arena slice owned by this gene.
    pub(crate) alleles: Range<usize>,
}

/// An allele resolved to absolute coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAllele {
    pub sequence: NucleotideSequence,
    pub anchors: AnchorMap,
}

/// Input to [`LibrarySnapshot::assemble`]: one gene with its alleles already
/// validated and ordered by the caller.
#[derive(Debug, Clone)]
pub(crate) struct AssembledGene {
    pub name: String,
    pub gene_type: GeneType,
    pub chains: Vec<String>,
    pub alleles: Vec<Allele>,
}

/// One immutable library of germline genes for a single species.
#[derive(Debug)]
pub struct LibrarySnapshot {
    species: String,
    taxon_id: Option<u64>,
    /// Content-derived checksum identifying this snapshot.
    version: String,
    created: DateTime<Utc>,

    genes: Vec<Gene>,
    alleles: Vec<Allele>,
    /// Arena index of each allele's parent; None for Reference alleles and
    /// for dangling parents (reported as `UnknownParent` on resolution).
    parents: Vec<Option<usize>>,
    /// Gene owning each allele.
    gene_of: Vec<usize>,
    /// Lazily populated resolution results, one slot per allele.
    memo: Vec<OnceLock<Result<ResolvedAllele, ResolveError>>>,

    gene_index: HashMap<String, usize>,
    allele_index: HashMap<String, usize>,
    synonym_index: HashMap<String, usize>,
}

impl LibrarySnapshot {
    /// Build a snapshot from assembled genes.
    ///
    /// Callers (compiler, codec) are responsible for name uniqueness and
    /// validation; dangling parent references are tolerated here and
    /// surface as `UnknownParent` when the affected allele is resolved.
    pub(crate) fn assemble(
        species: String,
        taxon_id: Option<u64>,
        version: String,
        created: DateTime<Utc>,
        assembled: Vec<AssembledGene>,
    ) -> Self {
        let mut genes = Vec::with_capacity(assembled.len());
        let mut alleles = Vec::new();
        let mut gene_of = Vec::new();
        let mut gene_index = HashMap::new();
        let mut allele_index = HashMap::new();
        let mut synonym_index = HashMap::new();

        for gene in assembled {
            let start = alleles.len();
            let gene_idx = genes.len();
            for allele in gene.alleles {
                let idx = alleles.len();
                allele_index.insert(allele.name.to_string(), idx);
                for synonym in &allele.synonyms {
                    synonym_index.insert(synonym.clone(), idx);
                }
                gene_of.push(gene_idx);
                alleles.push(allele);
            }
            gene_index.insert(gene.name.clone(), gene_idx);
            genes.push(Gene {
                name: gene.name,
                gene_type: gene.gene_type,
                chains: gene.chains,
                alleles: start..alleles.len(),
            });
        }

        let parents = alleles
            .iter()
            .map(|allele| match &allele.body {
                AlleleBody::Reference(_) => None,
                AlleleBody::Derived { parent, .. } => {
                    allele_index.get(&parent.to_string()).copied()
                }
            })
            .collect();
        let memo = (0..alleles.len()).map(|_| OnceLock::new()).collect();

        Self {
            species,
            taxon_id,
            version,
            created,
            genes,
            alleles,
            parents,
            gene_of,
            memo,
            gene_index,
            allele_index,
            synonym_index,
        }
    }

    pub(crate) fn set_version(&mut self, version: String) {
        self.version = version;
    }

    #[must_use]
    pub fn species(&self) -> &str {
        &self.species
    }

    #[must_use]
    pub fn taxon_id(&self) -> Option<u64> {
        self.taxon_id
    }

    /// Content-derived version checksum of this snapshot.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Number of genes in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    #[must_use]
    pub fn num_alleles(&self) -> usize {
        self.alleles.len()
    }

    #[must_use]
    pub fn find_gene(&self, name: &str) -> Option<&Gene> {
        self.gene_index.get(name).map(|&idx| &self.genes[idx])
    }

    /// Alleles of a gene, in allele-index order.
    #[must_use]
    pub fn alleles_of(&self, gene: &Gene) -> &[Allele] {
        &self.alleles[gene.alleles.clone()]
    }

    /// Look up an allele by full name, falling back to synonyms.
    #[must_use]
    pub fn find_allele(&self, name: &str) -> Option<&Allele> {
        self.lookup(name).map(|idx| &self.alleles[idx])
    }

    /// Resolved absolute sequence of an allele.
    ///
    /// # Errors
    ///
    /// `UnknownAllele` for names absent from this snapshot, `Resolve` for
    /// structural failures in the derivation chain.
    pub fn resolve_sequence(&self, name: &str) -> Result<&NucleotideSequence, QueryError> {
        let idx = self
            .lookup(name)
            .ok_or_else(|| QueryError::UnknownAllele(name.to_string()))?;
        Ok(&self.resolve_index(idx)?.sequence)
    }

    /// Resolved absolute anchor positions of an allele.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::resolve_sequence`].
    pub fn resolve_anchors(&self, name: &str) -> Result<&AnchorMap, QueryError> {
        let idx = self
            .lookup(name)
            .ok_or_else(|| QueryError::UnknownAllele(name.to_string()))?;
        Ok(&self.resolve_index(idx)?.anchors)
    }

    /// Extract a named feature's subsequence from an allele.
    ///
    /// # Errors
    ///
    /// `Feature(NotApplicable)` when the feature belongs to another gene
    /// type, `Feature(AnchorMissing | InvalidRange)` when the allele's
    /// anchors cannot delimit it, plus the resolution failure modes.
    pub fn extract_feature(
        &self,
        name: &str,
        feature: GeneFeature,
    ) -> Result<NucleotideSequence, QueryError> {
        let idx = self
            .lookup(name)
            .ok_or_else(|| QueryError::UnknownAllele(name.to_string()))?;
        let gene_type = self.genes[self.gene_of[idx]].gene_type;
        if feature.gene_type() != gene_type {
            return Err(FeatureError::NotApplicable { feature, gene_type }.into());
        }

        let resolved = self.resolve_index(idx)?;
        let (start, end) = resolve_feature(&resolved.anchors, feature)?;
        if end as usize > resolved.sequence.len() {
            return Err(FeatureError::InvalidRange {
                feature,
                start: i64::from(start),
                end: i64::from(end),
            }
            .into());
        }
        Ok(resolved.sequence.subsequence(start as usize, end as usize))
    }

    pub(crate) fn arena(&self) -> &[Allele] {
        &self.alleles
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.allele_index
            .get(name)
            .or_else(|| self.synonym_index.get(name))
            .copied()
    }

    /// Resolve an allele by arena index, memoizing the result.
    pub(crate) fn resolve_index(&self, idx: usize) -> Result<&ResolvedAllele, ResolveError> {
        if self.memo[idx].get().is_none() {
            self.fill_chain(idx)?;
        }
        match self.memo[idx].get() {
            Some(Ok(resolved)) => Ok(resolved),
            Some(Err(err)) => Err(err.clone()),
            None => Err(ResolveError::CyclicDerivation {
                allele: self.alleles[idx].name.to_string(),
            }),
        }
    }

    /// Walk the parent chain of `idx` up to a Reference root or an already
    /// memoized ancestor, then compute downwards so every parent is cached
    /// before its children.
    fn fill_chain(&self, idx: usize) -> Result<(), ResolveError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = idx;

        while self.memo[cur].get().is_none() {
            if !seen.insert(cur) {
                return Err(ResolveError::CyclicDerivation {
                    allele: self.alleles[idx].name.to_string(),
                });
            }
            chain.push(cur);
            match &self.alleles[cur].body {
                AlleleBody::Reference(_) => break,
                AlleleBody::Derived { parent, .. } => match self.parents[cur] {
                    Some(parent_idx) => cur = parent_idx,
                    None => {
                        return Err(ResolveError::UnknownParent {
                            allele: self.alleles[cur].name.to_string(),
                            parent: parent.to_string(),
                        })
                    }
                },
            }
        }

        for &member in chain.iter().rev() {
            let computed = self.compute_one(member);
            // A concurrent resolver may have won the race; both computed
            // the same value, so the losing set() is irrelevant.
            let _ = self.memo[member].set(computed);
        }
        Ok(())
    }

    fn compute_one(&self, idx: usize) -> Result<ResolvedAllele, ResolveError> {
        let allele = &self.alleles[idx];
        match &allele.body {
            AlleleBody::Reference(sequence) => Ok(ResolvedAllele {
                sequence: sequence.clone(),
                anchors: allele.anchors.clone(),
            }),
            AlleleBody::Derived { parent, mutations } => {
                let parent_result = self
                    .parents[idx]
                    .and_then(|parent_idx| self.memo[parent_idx].get())
                    .ok_or_else(|| ResolveError::UnknownParent {
                        allele: allele.name.to_string(),
                        parent: parent.to_string(),
                    })?;
                let parent_resolved = parent_result.as_ref().map_err(Clone::clone)?;

                let sequence = mutation::apply(mutations, &parent_resolved.sequence).map_err(
                    |source| ResolveError::MutationApply {
                        allele: allele.name.to_string(),
                        source,
                    },
                )?;
                let anchors = parent_resolved
                    .anchors
                    .iter()
                    .map(|(&kind, &pos)| (kind, mutation::translate_position(mutations, pos)))
                    .collect();
                Ok(ResolvedAllele { sequence, anchors })
            }
        }
    }
}

impl PartialEq for LibrarySnapshot {
    /// Structural equality over the published data: identity, genes,
    /// alleles, bodies and anchors. Memoization state is not observable.
    fn eq(&self, other: &Self) -> bool {
        self.species == other.species
            && self.taxon_id == other.taxon_id
            && self.version == other.version
            && self.created == other.created
            && self.genes.len() == other.genes.len()
            && self.genes.iter().zip(other.genes.iter()).all(|(a, b)| {
                a.name == b.name
                    && a.gene_type == b.gene_type
                    && a.chains == b.chains
                    && self.alleles_of(a) == other.alleles_of(b)
            })
    }
}
