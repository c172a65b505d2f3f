use url::Url;

use crate::code::{InvalidShortCode, ShortCode};

/// BaseAddress is the location short links hang off. The short link for a
/// code is the base with the code as its fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseAddress {
    url: Url,
}

impl BaseAddress {
    pub fn parse(base: &str) -> Result<Self, url::ParseError> {
        let mut url = Url::parse(base.trim())?;
        url.set_fragment(None);
        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn short_url(&self, code: &ShortCode) -> String {
        let mut url = self.url.clone();
        url.set_fragment(Some(code.as_str()));
        url.to_string()
    }
}

impl Default for BaseAddress {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost/").expect("static base address"),
        }
    }
}

impl std::fmt::Display for BaseAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Pulls the short code out of whatever the user pasted: a full short link
/// (`https://host/path#Ab3dE9`), a bare fragment (`#Ab3dE9`) or the code itself.
pub fn extract_code(location: &str) -> Result<ShortCode, InvalidShortCode> {
    let location = location.trim();
    let fragment = match location.rsplit_once('#') {
        Some((_, fragment)) => fragment,
        None => location,
    };
    ShortCode::parse(fragment)
}
