//! Named gene features: subsequences bounded by a pair of anchor points.
//!
//! Feature definitions are static and gene-type-specific; per-allele data
//! never enters them. A bound may carry a fixed offset from its anchor,
//! which is how codon-sized features like the conserved CDR3 cysteine are
//! expressed.

use crate::core::anchor::{AnchorMap, AnchorPointKind, AnchorPointKind as K};
use crate::core::types::GeneType;
use thiserror::Error;

/// One feature bound: an anchor point plus a fixed offset in bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorRef {
    pub kind: AnchorPointKind,
    pub offset: i32,
}

impl AnchorRef {
    const fn at(kind: AnchorPointKind) -> Self {
        Self { kind, offset: 0 }
    }

    const fn shifted(kind: AnchorPointKind, offset: i32) -> Self {
        Self { kind, offset }
    }
}

/// A named germline feature extractable from a single allele.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneFeature {
    // V gene
    Utr5,
    Exon1,
    VIntron,
    Exon2,
    Fr1,
    Cdr1,
    Fr2,
    Cdr2,
    Fr3,
    /// Germline part of CDR3 contributed by the V gene.
    GermlineVCdr3Part,
    /// Coding region of the V gene, FR1 through the V end.
    VRegion,
    /// The conserved cysteine codon opening CDR3.
    ConservedCys,

    // D gene
    DRegion,

    // J gene
    /// Germline part of CDR3 contributed by the J gene.
    GermlineJCdr3Part,
    Fr4,
    JRegion,
    /// The conserved phenylalanine/tryptophan codon closing CDR3.
    ConservedPheTrp,

    // C gene
    CExon1,
    CRegion,
}

impl GeneFeature {
    pub const ALL: [GeneFeature; 19] = [
        Self::Utr5,
        Self::Exon1,
        Self::VIntron,
        Self::Exon2,
        Self::Fr1,
        Self::Cdr1,
        Self::Fr2,
        Self::Cdr2,
        Self::Fr3,
        Self::GermlineVCdr3Part,
        Self::VRegion,
        Self::ConservedCys,
        Self::DRegion,
        Self::GermlineJCdr3Part,
        Self::Fr4,
        Self::JRegion,
        Self::ConservedPheTrp,
        Self::CExon1,
        Self::CRegion,
    ];

    /// The anchor pair delimiting this feature, `[start, end)`.
    #[must_use]
    pub fn bounds(self) -> (AnchorRef, AnchorRef) {
        match self {
            Self::Utr5 => (AnchorRef::at(K::Utr5Begin), AnchorRef::at(K::L1Begin)),
            Self::Exon1 => (AnchorRef::at(K::L1Begin), AnchorRef::at(K::L1End)),
            Self::VIntron => (AnchorRef::at(K::L1End), AnchorRef::at(K::L2Begin)),
            Self::Exon2 => (AnchorRef::at(K::L2Begin), AnchorRef::at(K::VEnd)),
            Self::Fr1 => (AnchorRef::at(K::Fr1Begin), AnchorRef::at(K::Cdr1Begin)),
            Self::Cdr1 => (AnchorRef::at(K::Cdr1Begin), AnchorRef::at(K::Fr2Begin)),
            Self::Fr2 => (AnchorRef::at(K::Fr2Begin), AnchorRef::at(K::Cdr2Begin)),
            Self::Cdr2 => (AnchorRef::at(K::Cdr2Begin), AnchorRef::at(K::Fr3Begin)),
            Self::Fr3 => (AnchorRef::at(K::Fr3Begin), AnchorRef::at(K::Cdr3Begin)),
            Self::GermlineVCdr3Part => (AnchorRef::at(K::Cdr3Begin), AnchorRef::at(K::VEnd)),
            Self::VRegion => (AnchorRef::at(K::Fr1Begin), AnchorRef::at(K::VEnd)),
            Self::ConservedCys => {
                (AnchorRef::at(K::Cdr3Begin), AnchorRef::shifted(K::Cdr3Begin, 3))
            }
            Self::DRegion => (AnchorRef::at(K::DBegin), AnchorRef::at(K::DEnd)),
            Self::GermlineJCdr3Part => (AnchorRef::at(K::JBegin), AnchorRef::at(K::Cdr3End)),
            Self::Fr4 => (AnchorRef::at(K::Cdr3End), AnchorRef::at(K::Fr4End)),
            Self::JRegion => (AnchorRef::at(K::JBegin), AnchorRef::at(K::Fr4End)),
            Self::ConservedPheTrp => {
                (AnchorRef::shifted(K::Cdr3End, -3), AnchorRef::at(K::Cdr3End))
            }
            Self::CExon1 => (AnchorRef::at(K::CBegin), AnchorRef::at(K::CExon1End)),
            Self::CRegion => (AnchorRef::at(K::CBegin), AnchorRef::at(K::CEnd)),
        }
    }

    /// The gene type this feature is defined for.
    #[must_use]
    pub fn gene_type(self) -> GeneType {
        self.bounds().0.kind.gene_type()
    }

    /// Canonical name, identical to the parsed form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utr5 => "UTR5",
            Self::Exon1 => "Exon1",
            Self::VIntron => "VIntron",
            Self::Exon2 => "Exon2",
            Self::Fr1 => "FR1",
            Self::Cdr1 => "CDR1",
            Self::Fr2 => "FR2",
            Self::Cdr2 => "CDR2",
            Self::Fr3 => "FR3",
            Self::GermlineVCdr3Part => "GermlineVCDR3Part",
            Self::VRegion => "VRegion",
            Self::ConservedCys => "ConservedCys",
            Self::DRegion => "DRegion",
            Self::GermlineJCdr3Part => "GermlineJCDR3Part",
            Self::Fr4 => "FR4",
            Self::JRegion => "JRegion",
            Self::ConservedPheTrp => "ConservedPheTrp",
            Self::CExon1 => "CExon1",
            Self::CRegion => "CRegion",
        }
    }
}

impl std::fmt::Display for GeneFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown gene feature '{0}'")]
pub struct UnknownFeature(String);

impl std::str::FromStr for GeneFeature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|feature| feature.name() == s)
            .copied()
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("feature {feature} is not applicable to {gene_type} genes")]
    NotApplicable {
        feature: GeneFeature,
        gene_type: GeneType,
    },

    #[error("anchor {kind} required by feature {feature} is not defined for this allele")]
    AnchorMissing {
        feature: GeneFeature,
        kind: AnchorPointKind,
    },

    #[error("feature {feature} resolves to the invalid range [{start}, {end})")]
    InvalidRange {
        feature: GeneFeature,
        start: i64,
        end: i64,
    },
}

/// Locate a feature within an allele's resolved anchor positions.
///
/// # Errors
///
/// `AnchorMissing` when a bounding anchor is absent, `InvalidRange` when the
/// offset-adjusted bounds are empty, inverted or negative.
pub fn resolve_feature(
    anchors: &AnchorMap,
    feature: GeneFeature,
) -> Result<(u32, u32), FeatureError> {
    let (left, right) = feature.bounds();
    let start_anchor = anchors.get(&left.kind).ok_or(FeatureError::AnchorMissing {
        feature,
        kind: left.kind,
    })?;
    let end_anchor = anchors.get(&right.kind).ok_or(FeatureError::AnchorMissing {
        feature,
        kind: right.kind,
    })?;

    let start = i64::from(*start_anchor) + i64::from(left.offset);
    let end = i64::from(*end_anchor) + i64::from(right.offset);
    if start < 0 || end <= start {
        return Err(FeatureError::InvalidRange {
            feature,
            start,
            end,
        });
    }
    Ok((start as u32, end as u32))
}
