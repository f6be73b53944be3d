//! Reference points: named positions inside a germline allele sequence.
//!
//! Each [`AnchorPointKind`] belongs to exactly one gene type and has a fixed
//! place in that gene type's topology (the declaration order below). Per gene
//! type a subset of the topology is *required*: those anchors must be present
//! in every allele and strictly increase. The leader/UTR/intron points of V
//! genes and `CExon1End` of C genes are optional because many source records
//! annotate only the coding region.
//!
//! Positions are zero-based boundaries: an anchor at position `p` sits
//! between bases `p-1` and `p`, so a region spanning two anchors is the
//! half-open interval `[start, end)`.

use crate::core::types::GeneType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Anchor positions of one allele, keyed in topology order.
pub type AnchorMap = BTreeMap<AnchorPointKind, u32>;

/// A named reference point within a germline gene segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnchorPointKind {
    // Points in V
    #[serde(rename = "UTR5Begin")]
    Utr5Begin,
    #[serde(rename = "L1Begin")]
    L1Begin,
    #[serde(rename = "L1End")]
    L1End,
    #[serde(rename = "L2Begin")]
    L2Begin,
    #[serde(rename = "FR1Begin")]
    Fr1Begin,
    #[serde(rename = "CDR1Begin")]
    Cdr1Begin,
    #[serde(rename = "FR2Begin")]
    Fr2Begin,
    #[serde(rename = "CDR2Begin")]
    Cdr2Begin,
    #[serde(rename = "FR3Begin")]
    Fr3Begin,
    #[serde(rename = "CDR3Begin")]
    Cdr3Begin,
    #[serde(rename = "VEnd")]
    VEnd,

    // Points in D
    #[serde(rename = "DBegin")]
    DBegin,
    #[serde(rename = "DEnd")]
    DEnd,

    // Points in J
    #[serde(rename = "JBegin")]
    JBegin,
    #[serde(rename = "CDR3End")]
    Cdr3End,
    #[serde(rename = "FR4End")]
    Fr4End,

    // Points in C
    #[serde(rename = "CBegin")]
    CBegin,
    #[serde(rename = "CExon1End")]
    CExon1End,
    #[serde(rename = "CEnd")]
    CEnd,
}

use AnchorPointKind::*;

const V_TOPOLOGY: [AnchorPointKind; 11] = [
    Utr5Begin, L1Begin, L1End, L2Begin, Fr1Begin, Cdr1Begin, Fr2Begin, Cdr2Begin, Fr3Begin,
    Cdr3Begin, VEnd,
];
const V_REQUIRED: [AnchorPointKind; 7] =
    [Fr1Begin, Cdr1Begin, Fr2Begin, Cdr2Begin, Fr3Begin, Cdr3Begin, VEnd];

const D_TOPOLOGY: [AnchorPointKind; 2] = [DBegin, DEnd];
const D_REQUIRED: [AnchorPointKind; 2] = [DBegin, DEnd];

const J_TOPOLOGY: [AnchorPointKind; 3] = [JBegin, Cdr3End, Fr4End];
const J_REQUIRED: [AnchorPointKind; 3] = [JBegin, Cdr3End, Fr4End];

const C_TOPOLOGY: [AnchorPointKind; 3] = [CBegin, CExon1End, CEnd];
const C_REQUIRED: [AnchorPointKind; 2] = [CBegin, CEnd];

impl AnchorPointKind {
    pub const ALL: [AnchorPointKind; 19] = [
        Utr5Begin, L1Begin, L1End, L2Begin, Fr1Begin, Cdr1Begin, Fr2Begin, Cdr2Begin, Fr3Begin,
        Cdr3Begin, VEnd, DBegin, DEnd, JBegin, Cdr3End, Fr4End, CBegin, CExon1End, CEnd,
    ];

    /// The gene type this anchor belongs to.
    #[must_use]
    pub fn gene_type(self) -> GeneType {
        match self {
            Utr5Begin | L1Begin | L1End | L2Begin | Fr1Begin | Cdr1Begin | Fr2Begin | Cdr2Begin
            | Fr3Begin | Cdr3Begin | VEnd => GeneType::Variable,
            DBegin | DEnd => GeneType::Diversity,
            JBegin | Cdr3End | Fr4End => GeneType::Joining,
            CBegin | CExon1End | CEnd => GeneType::Constant,
        }
    }

    /// Whether every allele of the anchor's gene type must carry it.
    #[must_use]
    pub fn is_required(self) -> bool {
        required_anchors(self.gene_type()).contains(&self)
    }

    /// Canonical name, identical to the serialized form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Utr5Begin => "UTR5Begin",
            L1Begin => "L1Begin",
            L1End => "L1End",
            L2Begin => "L2Begin",
            Fr1Begin => "FR1Begin",
            Cdr1Begin => "CDR1Begin",
            Fr2Begin => "FR2Begin",
            Cdr2Begin => "CDR2Begin",
            Fr3Begin => "FR3Begin",
            Cdr3Begin => "CDR3Begin",
            VEnd => "VEnd",
            DBegin => "DBegin",
            DEnd => "DEnd",
            JBegin => "JBegin",
            Cdr3End => "CDR3End",
            Fr4End => "FR4End",
            CBegin => "CBegin",
            CExon1End => "CExon1End",
            CEnd => "CEnd",
        }
    }
}

impl std::fmt::Display for AnchorPointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// All anchors applicable to a gene type, in topology order.
#[must_use]
pub fn topology(gene_type: GeneType) -> &'static [AnchorPointKind] {
    match gene_type {
        GeneType::Variable => &V_TOPOLOGY,
        GeneType::Diversity => &D_TOPOLOGY,
        GeneType::Joining => &J_TOPOLOGY,
        GeneType::Constant => &C_TOPOLOGY,
    }
}

/// The anchors every allele of a gene type must define, in topology order.
#[must_use]
pub fn required_anchors(gene_type: GeneType) -> &'static [AnchorPointKind] {
    match gene_type {
        GeneType::Variable => &V_REQUIRED,
        GeneType::Diversity => &D_REQUIRED,
        GeneType::Joining => &J_REQUIRED,
        GeneType::Constant => &C_REQUIRED,
    }
}

/// Anchor pairs that may legitimately share a position.
///
/// Short J alleles can have the recombination-signal boundary directly on the
/// CDR3 boundary, leaving no germline CDR3 part.
fn coincidence_allowed(first: AnchorPointKind, second: AnchorPointKind) -> bool {
    matches!((first, second), (JBegin, Cdr3End))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderingViolation {
    #[error("required anchor {0} is missing")]
    MissingRequired(AnchorPointKind),

    #[error("anchor {kind} does not belong to gene type {gene_type}")]
    Foreign {
        kind: AnchorPointKind,
        gene_type: GeneType,
    },

    #[error("anchor {second} at {second_pos} must lie after {first} at {first_pos}")]
    NotIncreasing {
        first: AnchorPointKind,
        first_pos: u32,
        second: AnchorPointKind,
        second_pos: u32,
    },
}

/// Check an allele's anchors against its gene type's topology.
///
/// Returns every violation found, not just the first: missing required
/// anchors, anchors of a foreign gene type, and positions that fail the
/// monotonicity rule (strict increase between required anchors except for
/// explicitly allowed coincidences; non-strict where an optional anchor is
/// involved).
#[must_use]
pub fn validate_ordering(gene_type: GeneType, anchors: &AnchorMap) -> Vec<OrderingViolation> {
    let mut violations = Vec::new();

    for &kind in anchors.keys() {
        if kind.gene_type() != gene_type {
            violations.push(OrderingViolation::Foreign { kind, gene_type });
        }
    }

    for &kind in required_anchors(gene_type) {
        if !anchors.contains_key(&kind) {
            violations.push(OrderingViolation::MissingRequired(kind));
        }
    }

    let present: Vec<(AnchorPointKind, u32)> = topology(gene_type)
        .iter()
        .filter_map(|kind| anchors.get(kind).map(|&pos| (*kind, pos)))
        .collect();
    for window in present.windows(2) {
        let ((first, first_pos), (second, second_pos)) = (window[0], window[1]);
        let strict = first.is_required() && second.is_required() && !coincidence_allowed(first, second);
        let ok = if strict {
            second_pos > first_pos
        } else {
            second_pos >= first_pos
        };
        if !ok {
            violations.push(OrderingViolation::NotIncreasing {
                first,
                first_pos,
                second,
                second_pos,
            });
        }
    }

    violations
}

/// True when `validate_ordering` finds nothing to complain about.
#[must_use]
pub fn is_valid_ordering(gene_type: GeneType, anchors: &AnchorMap) -> bool {
    validate_ordering(gene_type, anchors).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v_anchors(positions: &[(AnchorPointKind, u32)]) -> AnchorMap {
        positions.iter().copied().collect()
    }

    fn complete_v() -> AnchorMap {
        v_anchors(&[
            (Fr1Begin, 0),
            (Cdr1Begin, 78),
            (Fr2Begin, 114),
            (Cdr2Begin, 165),
            (Fr3Begin, 195),
            (Cdr3Begin, 309),
            (VEnd, 327),
        ])
    }

    #[test]
    fn test_topology_sizes() {
        assert_eq!(topology(GeneType::Variable).len(), 11);
        assert_eq!(topology(GeneType::Diversity).len(), 2);
        assert_eq!(topology(GeneType::Joining).len(), 3);
        assert_eq!(topology(GeneType::Constant).len(), 3);
    }

    #[test]
    fn test_required_subset_of_topology() {
        for gene_type in GeneType::ALL {
            for kind in required_anchors(gene_type) {
                assert!(topology(gene_type).contains(kind));
                assert_eq!(kind.gene_type(), gene_type);
            }
        }
    }

    #[test]
    fn test_valid_complete_v() {
        assert!(is_valid_ordering(GeneType::Variable, &complete_v()));
    }

    #[test]
    fn test_optional_anchors_accepted() {
        let mut anchors = complete_v();
        anchors.insert(Utr5Begin, 0);
        anchors.insert(L1Begin, 0);
        assert!(is_valid_ordering(GeneType::Variable, &anchors));
    }

    #[test]
    fn test_missing_required_reported() {
        let mut anchors = complete_v();
        anchors.remove(&Cdr3Begin);
        let violations = validate_ordering(GeneType::Variable, &anchors);
        assert!(violations.contains(&OrderingViolation::MissingRequired(Cdr3Begin)));
    }

    #[test]
    fn test_not_increasing_reported() {
        let mut anchors = complete_v();
        anchors.insert(Cdr2Begin, 120);
        let violations = validate_ordering(GeneType::Variable, &anchors);
        assert!(violations
            .iter()
            .any(|v| matches!(v, OrderingViolation::NotIncreasing { second: Cdr2Begin, .. })));
    }

    #[test]
    fn test_equal_required_positions_rejected() {
        let mut anchors = complete_v();
        anchors.insert(VEnd, 309);
        assert!(!is_valid_ordering(GeneType::Variable, &anchors));
    }

    #[test]
    fn test_j_coincidence_allowed() {
        let anchors = v_anchors(&[(JBegin, 0), (Cdr3End, 0), (Fr4End, 30)]);
        assert!(is_valid_ordering(GeneType::Joining, &anchors));
    }

    #[test]
    fn test_foreign_anchor_reported() {
        let mut anchors = v_anchors(&[(DBegin, 0), (DEnd, 12)]);
        anchors.insert(VEnd, 5);
        let violations = validate_ordering(GeneType::Diversity, &anchors);
        assert!(violations
            .iter()
            .any(|v| matches!(v, OrderingViolation::Foreign { kind: VEnd, .. })));
    }

    #[test]
    fn test_all_reported_at_once() {
        // Missing FR1Begin and reversed CDR3Begin/VEnd in one report.
        let anchors = v_anchors(&[
            (Cdr1Begin, 78),
            (Fr2Begin, 114),
            (Cdr2Begin, 165),
            (Fr3Begin, 195),
            (Cdr3Begin, 320),
            (VEnd, 310),
        ]);
        let violations = validate_ordering(GeneType::Variable, &anchors);
        assert!(violations.len() >= 2);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Cdr3Begin).unwrap();
        assert_eq!(json, "\"CDR3Begin\"");
        let kind: AnchorPointKind = serde_json::from_str("\"FR4End\"").unwrap();
        assert_eq!(kind, Fr4End);
    }
}
