use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Provider-intrinsic properties of a release, as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexerFlags(u32);

impl IndexerFlags {
    /// Downloading does not count against the user's ratio.
    pub const FREELEECH: IndexerFlags = IndexerFlags(1);
    /// Release originates from a scene group.
    pub const SCENE: IndexerFlags = IndexerFlags(16);

    pub const fn empty() -> Self {
        IndexerFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: IndexerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: IndexerFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for IndexerFlags {
    type Output = IndexerFlags;

    fn bitor(self, rhs: IndexerFlags) -> IndexerFlags {
        IndexerFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for IndexerFlags {
    fn bitor_assign(&mut self, rhs: IndexerFlags) {
        self.insert(rhs);
    }
}

/// Provider-agnostic release record handed to the decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Stable identity used downstream for de-duplication.
    pub guid: String,
    pub title: String,
    /// Primary entity names, never empty.
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Configured name of the provider the record came from.
    pub indexer: String,
    pub size: Option<u64>,
    pub seeders: Option<u32>,
    pub peers: Option<u32>,
    pub popularity: Option<u32>,
    pub publish_date: Option<DateTime<Utc>>,
    pub info_url: Option<String>,
    pub download_url: Option<String>,
    pub codec: Option<String>,
    pub container: Option<String>,
    pub media: Option<String>,
    pub year: Option<u32>,
    pub flags: IndexerFlags,
}

impl ReleaseInfo {
    /// Build a record, or None when the title or every artist name is blank.
    /// Blank artist names are discarded.
    pub fn new(guid: String, title: String, artists: Vec<String>, indexer: &str) -> Option<Self> {
        let artists: Vec<String> = artists
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let title = title.trim().to_string();
        if title.is_empty() || artists.is_empty() {
            return None;
        }
        Some(Self {
            guid,
            title,
            artists,
            album: None,
            indexer: indexer.to_string(),
            size: None,
            seeders: None,
            peers: None,
            popularity: None,
            publish_date: None,
            info_url: None,
            download_url: None,
            codec: None,
            container: None,
            media: None,
            year: None,
            flags: IndexerFlags::empty(),
        })
    }

    /// First (primary) artist name.
    pub fn artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }
}
