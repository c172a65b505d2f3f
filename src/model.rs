use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{address::BaseAddress, code::ShortCode};

/// LinkRecord is what the registry keeps for each shortened URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkRecord {
    pub original_url: String, // target as entered, trimmed
    pub short_code: ShortCode,
    pub created_at: DateTime<Utc>,
    pub clicks: u64, // successful resolutions
}

impl LinkRecord {
    pub fn new(original_url: String, short_code: ShortCode) -> Self {
        Self {
            original_url,
            short_code,
            created_at: Utc::now(),
            clicks: 0,
        }
    }

    pub fn short_url(&self, base: &BaseAddress) -> String {
        base.short_url(&self.short_code)
    }

    pub(crate) fn to_stored(&self, base: &BaseAddress) -> StoredLink {
        StoredLink {
            original_url: self.original_url.clone(),
            short_url: self.short_url(base),
            short_code: self.short_code.to_string(),
            created_at: self.created_at,
            clicks: self.clicks,
        }
    }
}

impl std::fmt::Display for LinkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} -> {}", self.short_code, self.original_url)?;
        write!(f, " [created: {}, clicks: {}]", self.created_at.to_rfc3339(), self.clicks)?;
        Ok(())
    }
}

/// StoredLink is the persisted shape of a record. `shortUrl` is written so the
/// stored array reads on its own, but it is recomputed on load.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredLink {
    pub original_url: String,
    #[serde(default)]
    pub short_url: String,
    pub short_code: String,
    pub created_at: DateTime<Utc>,
    pub clicks: u64,
}

impl TryFrom<StoredLink> for LinkRecord {
    type Error = crate::code::InvalidShortCode;

    fn try_from(stored: StoredLink) -> Result<Self, Self::Error> {
        Ok(LinkRecord {
            original_url: stored.original_url,
            short_code: ShortCode::parse(&stored.short_code)?,
            created_at: stored.created_at,
            clicks: stored.clicks,
        })
    }
}

/// Truncates `url` to at most `max` characters, appending `...` when cut.
pub fn truncate_url(url: &str, max: usize) -> String {
    match url.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &url[..idx]),
        None => url.to_string(),
    }
}
