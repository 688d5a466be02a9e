//! Request kinds and their priority order.
//!
//! `Kind` carries the total order `Z1 < Z2 < Z3` used by the stage-1
//! priority FIFO (`Z3` is dispatched first when multiple kinds have
//! deliverable work and idle workers simultaneously).

use serde::{Deserialize, Serialize};

/// A request kind. Ordered so that `Kind::Z3 > Kind::Z2 > Kind::Z1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Z1,
    Z2,
    Z3,
}

impl Kind {
    /// All kinds, lowest priority first.
    pub const ALL: [Kind; 3] = [Kind::Z1, Kind::Z2, Kind::Z3];

    /// All kinds, highest priority first — the dispatch order stage-1
    /// capacity is considered in.
    pub const ALL_BY_PRIORITY_DESC: [Kind; 3] = [Kind::Z3, Kind::Z2, Kind::Z1];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Z1 => "z1",
            Kind::Z2 => "z2",
            Kind::Z3 => "z3",
        }
    }
}

impl core::fmt::Display for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "z1" => Ok(Kind::Z1),
            "z2" => Ok(Kind::Z2),
            "z3" => Ok(Kind::Z3),
            other => Err(format!("unknown kind: {other}")),
        }
    }
}
