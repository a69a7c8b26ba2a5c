use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Feed Selection
// ============================================================================

/// The feeds exposed by the backend.
///
/// `Liked` requires an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Latest,
    Hottest,
    Liked,
}

impl FeedType {
    pub const ALL: [FeedType; 3] = [FeedType::Latest, FeedType::Hottest, FeedType::Liked];

    /// Path segment used by `GET /news/feed/{feedType}`.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedType::Latest => "latest",
            FeedType::Hottest => "hottest",
            FeedType::Liked => "liked",
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, FeedType::Liked)
    }

    pub fn has_time_filter(self) -> bool {
        matches!(self, FeedType::Hottest)
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(FeedType::Latest),
            "hottest" => Ok(FeedType::Hottest),
            "liked" => Ok(FeedType::Liked),
            other => Err(format!(
                "unknown feed type '{other}' (expected latest, hottest or liked)"
            )),
        }
    }
}

/// Secondary filter for the hottest feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            other => Err(format!(
                "unknown time filter '{other}' (expected week, month, year or all)"
            )),
        }
    }
}

/// A feed plus its optional time window: the unit that is fetched and cached.
///
/// Keying on both means each time window of the hottest feed keeps its own
/// cached pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub feed_type: FeedType,
    pub time_filter: Option<TimeFilter>,
}

impl FeedKey {
    /// Build a key. Only [`FeedType::Hottest`] has time windows; a filter
    /// given for any other feed is dropped.
    pub fn new(feed_type: FeedType, time_filter: Option<TimeFilter>) -> Self {
        Self {
            feed_type,
            time_filter: time_filter.filter(|_| feed_type.has_time_filter()),
        }
    }
}

impl From<FeedType> for FeedKey {
    fn from(feed_type: FeedType) -> Self {
        Self::new(feed_type, None)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_filter {
            Some(filter) => write!(f, "{}/{}", self.feed_type, filter),
            None => write!(f, "{}", self.feed_type),
        }
    }
}

// ============================================================================
// Articles
// ============================================================================

/// Publisher of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "nome")]
    pub name: String,
    pub url: String,
}

/// Article snapshot as returned by the backend.
///
/// Owned by the backend; the client never edits one except to mirror a like
/// toggle into cached copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "resumo", default)]
    pub summary: String,
    #[serde(rename = "imagem", default)]
    pub image_url: String,
    #[serde(rename = "url")]
    pub link: String,
    #[serde(rename = "data_postagem", deserialize_with = "deserialize_timestamp")]
    pub posted_at: DateTime<Utc>,
    #[serde(
        rename = "data_coleta",
        default,
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(rename = "id_fonte", default)]
    pub source_id: Option<i64>,
    #[serde(rename = "qtd_curtidas", default)]
    pub likes: i64,
    #[serde(rename = "curtido", default)]
    pub liked: bool,
    #[serde(rename = "fonte")]
    pub source: Source,
}

/// Parse either an RFC 3339 timestamp or the naive ISO form the backend emits
/// (`2024-01-01T12:00:00`, optionally with fractional seconds). Naive values
/// are taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
    }
}

// ============================================================================
// Auth
// ============================================================================

/// Result of the status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub has_refresh_token: bool,
}

/// Token pair returned by `/auth/login` and `/auth/refresh`.
///
/// Both fields are optional on the wire: login insists on both, refresh only
/// on the access token.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Login form.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    #[serde(rename = "senha")]
    pub password: String,
}

/// Registration form, sent as multipart.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub image: Option<ImageUpload>,
}

/// Optional picture attached to a registration.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Generic `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Likes and Profile
// ============================================================================

/// Outcome of `POST /news/handle-like/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "dataCadastro", default)]
    pub registered_at: Option<String>,
    #[serde(rename = "foto_perfil", default)]
    pub picture: Option<String>,
}

/// Profile edit form. An absent password leaves it unchanged.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
}
