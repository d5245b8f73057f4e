/// Crawl request kind and lifecycle definitions
///
/// A request moves Pending -> Discovering -> (Discovered | Truncated) -> Archived.
/// Once the total is finalized it never changes again.
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of listing a crawl request walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// A user's listen history
    History,

    /// A user-curated collection
    Collection,
}

impl RequestKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Collection => "collection",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "history" => Some(Self::History),
            "collection" => Some(Self::Collection),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Represents the current state of a crawl request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    // ===== Active States =====
    /// Request recorded, first page not yet fetched
    Pending,

    /// At least one non-empty page has been recorded
    Discovering,

    // ===== Finalized States =====
    /// An empty page was observed; the total is final
    Discovered,

    /// A page failed to load; the total was finalized with what had been found
    Truncated,

    /// An archive was assembled and uploaded
    Archived,
}

impl RequestStatus {
    /// Returns true once pagination has terminated and the total is final
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Discovered | Self::Truncated | Self::Archived)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discovering => "discovering",
            Self::Discovered => "discovered",
            Self::Truncated => "truncated",
            Self::Archived => "archived",
        }
    }

    /// Parses a request status from its database representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "discovering" => Some(Self::Discovering),
            "discovered" => Some(Self::Discovered),
            "truncated" => Some(Self::Truncated),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Discovering,
            Self::Discovered,
            Self::Truncated,
            Self::Archived,
        ]
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
