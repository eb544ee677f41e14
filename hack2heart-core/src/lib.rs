use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub mod host;
pub mod pinned;
pub mod view;

pub const MAX_SLOTS: usize = 5;
pub const SNIPPET_KEY_PREFIX: &str = "code-";
pub const SLOT_ID_PREFIX: &str = "blank-";
pub const CARD_TITLE_MAX_CHARS: usize = 40;
pub const UNTITLED_CODE_TITLE: &str = "Untitled Code";
pub const SENT_MESSAGE_EVENT: &str = "sent_message";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

pub type UserId = i64;
pub type CodeId = i64;
pub type ChatroomId = String;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid snippet key {0:?} (expected \"code-<id>\")")]
    InvalidSnippetKey(String),
    #[error("invalid slot id {0:?} (expected \"blank-<n>\")")]
    InvalidSlotId(String),
    #[error("invalid reaction type {0:?}")]
    InvalidReactionType(String),
    #[error("invalid gender {0:?} (expected male, female or other)")]
    InvalidGender(String),
    #[error("host message error: {0}")]
    HostMessage(String),
}

/// Local identifier for a cached snippet: `"code-" + server id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnippetKey(CodeId);

impl SnippetKey {
    pub fn new(code_id: CodeId) -> Self {
        Self(code_id)
    }

    pub fn code_id(self) -> CodeId {
        self.0
    }
}

impl fmt::Display for SnippetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SNIPPET_KEY_PREFIX}{}", self.0)
    }
}

impl FromStr for SnippetKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(SNIPPET_KEY_PREFIX)
            .and_then(|id| id.parse::<CodeId>().ok())
            .map(SnippetKey)
            .ok_or_else(|| CoreError::InvalidSnippetKey(s.to_owned()))
    }
}

impl Serialize for SnippetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SnippetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeSnippet {
    pub id: CodeId,
    pub content: String,
    /// Pinned slot position persisted by the server.
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl CodeSnippet {
    pub fn key(&self) -> SnippetKey {
        SnippetKey(self.id)
    }

    pub fn card(&self) -> SnippetCard {
        let first_line = self.content.split('\n').next().unwrap_or_default();
        let first_line = first_line.strip_suffix('\r').unwrap_or(first_line);
        let title = if first_line.is_empty() {
            UNTITLED_CODE_TITLE
        } else {
            first_line
        };

        SnippetCard {
            key: self.key(),
            title: title.chars().take(CARD_TITLE_MAX_CHARS).collect(),
            length: self.content.chars().count(),
        }
    }
}

/// Display summary of a snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetCard {
    pub key: SnippetKey,
    pub title: String,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl FromStr for Gender {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(CoreError::InvalidGender(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionType {
    SuperLike,
    Like,
    Dislike,
}

impl ReactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionType::SuperLike => "SUPER_LIKE",
            ReactionType::Like => "LIKE",
            ReactionType::Dislike => "DISLIKE",
        }
    }
}

impl FromStr for ReactionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "super-like" | "superlike" => Ok(ReactionType::SuperLike),
            "like" => Ok(ReactionType::Like),
            "dislike" => Ok(ReactionType::Dislike),
            _ => Err(CoreError::InvalidReactionType(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tmi {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub avatar_id: Option<i64>,
    pub most_preferred_language: String,
    pub most_preferred_package: String,
    #[serde(default)]
    pub looking_for_love: bool,
    #[serde(default)]
    pub looking_for_friend: bool,
    #[serde(default)]
    pub looking_for_coworker: bool,
    #[serde(default)]
    pub tmis: Vec<Tmi>,
}

impl UserProfile {
    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let birth = self.birth_date;
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).unwrap_or(0)
    }
}

/// Profile fields submitted when creating or editing a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewProfile {
    pub name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub avatar_id: Option<i64>,
    pub most_preferred_language: String,
    pub most_preferred_package: String,
    pub looking_for_love: bool,
    pub looking_for_friend: bool,
    pub looking_for_coworker: bool,
    #[serde(default)]
    pub tmis: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    #[serde(flatten)]
    pub user: UserProfile,
    #[serde(default)]
    pub previous_reaction_type: Option<ReactionType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub chatroom_id: ChatroomId,
    pub user_id: UserId,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Authenticated identity propagated from the host environment.
///
/// A session without a service token belongs to a GitHub user who has not
/// created a profile yet.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_oauth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_email: Option<String>,
    #[serde(
        rename = "accessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    #[serde(
        rename = "serviceToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_token: Option<String>,
}

impl Session {
    pub fn bearer_token(&self) -> Option<&str> {
        self.service_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn is_registered(&self) -> bool {
        self.bearer_token().is_some()
    }
}

/// Serde adapter for backend timestamps.
///
/// Accepts RFC 3339 strings and naive `YYYY-MM-DDTHH:MM:SS[.f]` strings,
/// which are taken as UTC. Always writes RFC 3339.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
