use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Population subgroup with its own fitted tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stratum(SmolStr);

impl Stratum {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn rural() -> Self {
        Self::new("rural")
    }

    pub fn urban() -> Self {
        Self::new("urban")
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Stratum {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Collects strata in first-seen order without duplicates.
pub(crate) fn unique_strata<'a>(strata: impl IntoIterator<Item = &'a Stratum>) -> Vec<Stratum> {
    let mut seen: Vec<Stratum> = Vec::new();
    for stratum in strata {
        if !seen.contains(stratum) {
            seen.push(stratum.clone());
        }
    }
    seen
}
