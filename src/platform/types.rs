//! Platform identities and the typed raw payload schema

use crate::metrics::{CountMetrics, ImpressionMetrics};
use crate::normalize::RawValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A social platform the harvester can crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Telegram => "telegram",
        }
    }

    /// Canonical form of a handle on this platform
    ///
    /// Twitter handles are case-insensitive and stored lower-case; Telegram
    /// channel ids are kept as given.
    pub fn canonical_handle(&self, handle: &str) -> String {
        let handle = handle.trim();
        match self {
            Self::Twitter => handle.trim_start_matches('@').to_lowercase(),
            Self::Telegram => handle.to_string(),
        }
    }

    /// Collection holding content items (messages, tweets)
    pub fn posts_collection(&self) -> String {
        format!("{}_posts", self.as_str())
    }

    /// Collection holding actors (users, participants, profiles)
    pub fn actors_collection(&self) -> String {
        format!("{}_actors", self.as_str())
    }

    /// Collection holding follow/membership edges
    pub fn relationships_collection(&self) -> String {
        format!("{}_relationships", self.as_str())
    }

    /// Collection holding per-target followings summaries
    pub fn followings_collection(&self) -> String {
        format!("{}_followings", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "telegram" => Ok(Self::Telegram),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// A crawled entity: a channel, account or handle on one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub handle: String,
    pub platform: Platform,
}

impl Target {
    pub fn new(platform: Platform, handle: &str) -> Self {
        Self {
            handle: platform.canonical_handle(handle),
            platform,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.handle)
    }
}

/// Kind of data collected for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// The target's own profile and counters
    Profiles,
    /// Messages or posts published by the target
    Posts,
    /// Channel participants or followers of the target
    Members,
    /// Accounts the target follows
    Followings,
    /// Authors of recent posts that have no stored actor yet
    Authors,
    /// Whether the target is a broadcast channel, copied onto its posts
    Announcements,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Posts => "posts",
            Self::Members => "members",
            Self::Followings => "followings",
            Self::Authors => "authors",
            Self::Announcements => "announcements",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One credential set used to authenticate a session
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "emailPassword", skip_serializing_if = "Option::is_none")]
    pub email_password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Engagement counters as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawPostMetrics {
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub replies: Option<u64>,
    pub shares: Option<u64>,
}

impl RawPostMetrics {
    pub fn snapshot(&self) -> ImpressionMetrics {
        ImpressionMetrics {
            views: self.views.unwrap_or(0),
            likes: self.likes.unwrap_or(0),
            replies: self.replies.unwrap_or(0),
            shares: self.shares.unwrap_or(0),
        }
    }
}

/// A message or post, newest-first in feeds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    /// Creation time, seconds since epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metrics: RawPostMetrics,
    /// Remaining platform-specific payload
    #[serde(default)]
    pub extra: RawValue,
}

/// A user, participant or profile
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActor {
    pub id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Account creation time, seconds since epoch
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Cumulative counters (followers, friends, participants, ...)
    #[serde(default)]
    pub counts: CountMetrics,
    #[serde(default)]
    pub extra: RawValue,
}
