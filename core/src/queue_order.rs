//! Queue ordering policy, spec §4.6. Two orthogonal settings control which
//! queued file the Encoder worker picks next.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSort {
    BitrateDesc,
    BitrateAsc,
    Alphabetical,
    Random,
}

impl FileSort {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "bitrate_desc" => Self::BitrateDesc,
            "bitrate_asc" => Self::BitrateAsc,
            "alphabetical" => Self::Alphabetical,
            "random" => Self::Random,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BitrateDesc => "bitrate_desc",
            Self::BitrateAsc => "bitrate_asc",
            Self::Alphabetical => "alphabetical",
            Self::Random => "random",
        }
    }

    /// `ORDER BY` fragment for this sort, `NULL`s sorting last in every case.
    pub fn order_by_sql(&self) -> &'static str {
        match self {
            Self::BitrateDesc => "original_bitrate is null, original_bitrate desc",
            Self::BitrateAsc => "original_bitrate is null, original_bitrate asc",
            Self::Alphabetical => "file_path asc",
            Self::Random => "random()",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryPriority {
    AlphabeticalAsc,
    AlphabeticalDesc,
    RoundRobin,
}

impl LibraryPriority {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "alphabetical_asc" => Self::AlphabeticalAsc,
            "alphabetical_desc" => Self::AlphabeticalDesc,
            "round_robin" => Self::RoundRobin,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlphabeticalAsc => "alphabetical_asc",
            Self::AlphabeticalDesc => "alphabetical_desc",
            Self::RoundRobin => "round_robin",
        }
    }
}
