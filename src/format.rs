//! Display formats a card can define a template for

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requested format name is not one of the known formats
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown format '{0}' (expected one of: isolated, embedded, edit)")]
pub struct UnknownFormat(pub String);

/// A named display mode with its own template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Isolated,
    Embedded,
    Edit,
}

impl Format {
    /// Every format, in the order they are compiled and serialized
    pub const ALL: [Format; 3] = [Format::Isolated, Format::Embedded, Format::Edit];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Isolated => "isolated",
            Format::Embedded => "embedded",
            Format::Edit => "edit",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(Format::Isolated),
            "embedded" => Ok(Format::Embedded),
            "edit" => Ok(Format::Edit),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}
