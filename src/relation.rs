//! Exact spatial relation evaluation.
//!
//! The index prunes candidates at the cell level; final answers come from
//! DE-9IM predicates over the raw WKB pairs, evaluated through the `geo`
//! relate kernel.

use crate::error::Result;
use crate::geometry::parse_wkb_exact;
use geo::Relate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spatial relation operators the index can refine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationOp {
    Equals,
    Touches,
    Overlaps,
    Crosses,
    Contains,
    Intersects,
    Within,
}

impl RelationOp {
    /// All operators, in wire order.
    pub const ALL: [RelationOp; 7] = [
        RelationOp::Equals,
        RelationOp::Touches,
        RelationOp::Overlaps,
        RelationOp::Crosses,
        RelationOp::Contains,
        RelationOp::Intersects,
        RelationOp::Within,
    ];

    /// Lower-case operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationOp::Equals => "equals",
            RelationOp::Touches => "touches",
            RelationOp::Overlaps => "overlaps",
            RelationOp::Crosses => "crosses",
            RelationOp::Contains => "contains",
            RelationOp::Intersects => "intersects",
            RelationOp::Within => "within",
        }
    }
}

impl fmt::Display for RelationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equals" => Ok(RelationOp::Equals),
            "touches" => Ok(RelationOp::Touches),
            "overlaps" => Ok(RelationOp::Overlaps),
            "crosses" => Ok(RelationOp::Crosses),
            "contains" => Ok(RelationOp::Contains),
            "intersects" => Ok(RelationOp::Intersects),
            "within" => Ok(RelationOp::Within),
            other => Err(format!("unknown relation op: {other}")),
        }
    }
}

/// Evaluate `op(lhs, rhs)` over two WKB values.
///
/// A null sentinel on either side matches nothing. Parse failures
/// propagate; candidates reaching this point already parsed once during
/// build, so a failure here means the artifact is corrupt.
pub fn evaluate(op: RelationOp, lhs: &[u8], rhs: &[u8]) -> Result<bool> {
    let Some(lhs) = parse_wkb_exact(lhs)? else {
        return Ok(false);
    };
    let Some(rhs) = parse_wkb_exact(rhs)? else {
        return Ok(false);
    };

    let matrix = lhs.relate(&rhs);
    let related = match op {
        RelationOp::Equals => matrix.is_equal_topo(),
        RelationOp::Touches => matrix.is_touches(),
        RelationOp::Overlaps => matrix.is_overlaps(),
        RelationOp::Crosses => matrix.is_crosses(),
        RelationOp::Contains => matrix.is_contains(),
        RelationOp::Intersects => matrix.is_intersects(),
        RelationOp::Within => matrix.is_within(),
    };
    Ok(related)
}
