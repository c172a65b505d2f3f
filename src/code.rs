use std::sync::OnceLock;

use rand::{Rng, RngExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The 62 symbols a short code is drawn from.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const CODE_LENGTH: usize = 6;

static CODE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn code_pattern() -> &'static Regex {
    CODE_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{6}$").expect("static pattern"))
}

/// ShortCode is the fixed-length alphanumeric key of a link, e.g. the `Ab3dE9`
/// in `https://host/path#Ab3dE9`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0:?} is not a 6 character alphanumeric code")]
pub struct InvalidShortCode(pub String);

impl ShortCode {
    pub fn parse(s: &str) -> Result<Self, InvalidShortCode> {
        if code_pattern().is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidShortCode(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShortCode {
    type Err = InvalidShortCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShortCode {
    type Error = InvalidShortCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortCode> for String {
    fn from(code: ShortCode) -> Self {
        code.0
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// CodeSource hands out candidate codes. It knows nothing about which codes
/// are taken; the registry retries on collision.
pub trait CodeSource {
    fn next_code(&mut self) -> ShortCode;
}

/// Samples each position uniformly from [`ALPHABET`], with replacement.
#[derive(Debug)]
pub struct RandomCodes<R> {
    rng: R,
}

impl<R: Rng> RandomCodes<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomCodes<rand::rngs::ThreadRng> {
    pub fn thread_local() -> Self {
        Self::new(rand::rng())
    }
}

impl Default for RandomCodes<rand::rngs::ThreadRng> {
    fn default() -> Self {
        Self::thread_local()
    }
}

impl<R: Rng> CodeSource for RandomCodes<R> {
    fn next_code(&mut self) -> ShortCode {
        let code: String = (0..CODE_LENGTH)
            .map(|_| ALPHABET[self.rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode(code)
    }
}

/// Replays a fixed list of codes, cycling when it runs out. Useful for
/// forcing collisions.
#[derive(Clone, Debug)]
pub struct ScriptedCodes {
    codes: Vec<ShortCode>,
    next: usize,
}

impl ScriptedCodes {
    pub fn new(codes: Vec<ShortCode>) -> Self {
        assert!(!codes.is_empty(), "ScriptedCodes needs at least one code");
        Self { codes, next: 0 }
    }
}

impl CodeSource for ScriptedCodes {
    fn next_code(&mut self) -> ShortCode {
        let code = self.codes[self.next % self.codes.len()].clone();
        self.next += 1;
        code
    }
}
