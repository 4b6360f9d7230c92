use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;

// ---------------------------------------------------------------------------
// Finish: Physical print variant, part of the tracking identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    Normal,
    Foil,
    Etched,
}

impl Finish {
    pub const ALL: [Finish; 3] = [Finish::Normal, Finish::Foil, Finish::Etched];

    pub fn as_str(&self) -> &'static str {
        match self {
            Finish::Normal => "normal",
            Finish::Foil => "foil",
            Finish::Etched => "etched",
        }
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finish {
    type Err = TrackerError;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Finish::Normal),
            "foil" => Ok(Finish::Foil),
            "etched" => Ok(Finish::Etched),
            other => Err(TrackerError::InvalidArgument(format!(
                "Unknown finish: {}",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PriceKey: (printing_id, finish) identity of a tracked item
// ---------------------------------------------------------------------------

/// Identity of a tracked printing. Ordering is `(printing_id, finish)`, which
/// is also the deterministic tie-break order used when ranking spikes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceKey {
    pub printing_id: String,
    pub finish: Finish,
}

impl PriceKey {
    pub fn new(printing_id: impl Into<String>, finish: Finish) -> Self {
        Self {
            printing_id: printing_id.into(),
            finish,
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.printing_id, self.finish)
    }
}
