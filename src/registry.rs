use std::collections::HashSet;

use url::Url;

use crate::{
    address::BaseAddress,
    code::{CodeSource, RandomCodes, ShortCode},
    error::{RegistryError, Result},
    model::{LinkRecord, StoredLink},
    storage::{Storage, StorageError},
};

/// Key the collection is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "urlShortenerData";
/// How many candidate codes `allocate` draws before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub base: BaseAddress,
    pub storage_key: String,
    pub max_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base: BaseAddress::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Registry owns the ordered, most-recent-first collection of links and writes
/// it back to storage after every change.
pub struct Registry<S: Storage> {
    storage: S,
    config: RegistryConfig,
    codes: Box<dyn CodeSource>,
    links: Vec<LinkRecord>,
    index: HashSet<ShortCode>,
}

impl<S: Storage> std::fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("links", &self.links.len())
            .finish()
    }
}

impl<S: Storage> Registry<S> {
    /// Loads the registry from `storage` with default settings and random codes.
    pub fn open(storage: S) -> Self {
        Self::with_config(storage, RegistryConfig::default())
    }

    pub fn with_config(storage: S, config: RegistryConfig) -> Self {
        Self::with_code_source(storage, config, Box::new(RandomCodes::thread_local()))
    }

    pub fn with_code_source(storage: S, config: RegistryConfig, codes: Box<dyn CodeSource>) -> Self {
        let links = restore(&storage, &config.storage_key);
        let index = links.iter().map(|link| link.short_code.clone()).collect();
        tracing::debug!("restored {} links from {:?}", links.len(), config.storage_key);
        Self {
            storage,
            config,
            codes,
            links,
            index,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn base(&self) -> &BaseAddress {
        &self.config.base
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn short_url(&self, link: &LinkRecord) -> String {
        link.short_url(&self.config.base)
    }

    /// Shortens `original_url`, storing the new record at the head of the list.
    pub fn allocate(&mut self, original_url: &str) -> Result<LinkRecord> {
        let original_url = original_url.trim();
        validate_url(original_url)?;

        let code = self.fresh_code()?;
        let link = LinkRecord::new(original_url.to_string(), code);

        self.links.insert(0, link.clone());
        self.index.insert(link.short_code.clone());
        if let Err(e) = self.persist() {
            self.links.remove(0);
            self.index.remove(&link.short_code);
            return Err(e);
        }

        tracing::info!("allocated {}", link);
        Ok(link)
    }

    fn fresh_code(&mut self) -> Result<ShortCode> {
        for attempt in 1..=self.config.max_attempts {
            let candidate = self.codes.next_code();
            if !self.index.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!("code collision on {} (attempt {})", candidate, attempt);
        }
        tracing::error!("gave up allocating a code after {} attempts", self.config.max_attempts);
        Err(RegistryError::CodeSpaceExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Looks up `code` and counts a visit. Returns the updated record.
    pub fn resolve(&mut self, code: &str) -> Result<LinkRecord> {
        let position = self
            .position(code)
            .ok_or_else(|| RegistryError::NotFound(code.to_string()))?;

        let previous = self.links[position].clicks;
        if previous == u64::MAX {
            tracing::warn!("click counter for #{} is saturated", self.links[position].short_code);
        }
        self.links[position].clicks = previous.saturating_add(1);
        if let Err(e) = self.persist() {
            self.links[position].clicks = previous;
            return Err(e);
        }

        let link = self.links[position].clone();
        tracing::info!("resolved #{} -> {} ({} clicks)", link.short_code, link.original_url, link.clicks);
        Ok(link)
    }

    /// Removes the link for `code`. Returns whether anything was removed.
    pub fn delete(&mut self, code: &str) -> Result<bool> {
        let Some(position) = self.position(code) else {
            tracing::debug!("delete of unknown code {:?}", code);
            return Ok(false);
        };

        let link = self.links.remove(position);
        self.index.remove(&link.short_code);
        if let Err(e) = self.persist() {
            self.index.insert(link.short_code.clone());
            self.links.insert(position, link);
            return Err(e);
        }

        tracing::info!("deleted {}", link);
        Ok(true)
    }

    /// The `limit` most recent links, newest first.
    pub fn list(&self, limit: usize) -> &[LinkRecord] {
        &self.links[..limit.min(self.links.len())]
    }

    /// Looks up `code` without counting a visit.
    pub fn get(&self, code: &str) -> Option<&LinkRecord> {
        self.position(code).map(|position| &self.links[position])
    }

    fn position(&self, code: &str) -> Option<usize> {
        let code = ShortCode::parse(code).ok()?;
        if !self.index.contains(&code) {
            return None;
        }
        self.links.iter().position(|link| link.short_code == code)
    }

    /// Writes the whole collection under the configured key.
    pub fn persist(&self) -> Result<()> {
        let stored: Vec<StoredLink> = self
            .links
            .iter()
            .map(|link| link.to_stored(&self.config.base))
            .collect();
        let json = serde_json::to_string(&stored).map_err(StorageError::from)?;
        self.storage.set(&self.config.storage_key, &json)?;
        tracing::debug!("persisted {} links", self.links.len());
        Ok(())
    }

    /// Hands back the storage backend, dropping the in-memory state.
    pub fn into_storage(self) -> S {
        self.storage
    }
}

/// Reads the collection stored under `key`. Missing or unreadable data yields
/// an empty collection; this never fails.
pub fn restore<S: Storage + ?Sized>(storage: &S, key: &str) -> Vec<LinkRecord> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!("could not read {:?}, starting empty: {}", key, e);
            return Vec::new();
        }
    };

    let stored: Vec<StoredLink> = match serde_json::from_str(&raw) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!("could not parse {:?}, starting empty: {}", key, e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(stored.len());
    for entry in stored {
        match LinkRecord::try_from(entry) {
            Ok(link) => {
                if seen.insert(link.short_code.clone()) {
                    links.push(link);
                } else {
                    tracing::warn!("dropping duplicate stored code {}", link.short_code);
                }
            }
            Err(e) => tracing::warn!("dropping stored link: {}", e),
        }
    }
    links
}

/// Accepts absolute URLs that carry a host, e.g. `https://example.com/a`.
pub fn validate_url(input: &str) -> Result<Url> {
    if input.is_empty() {
        return Err(RegistryError::invalid_url(input, "empty"));
    }
    let url = Url::parse(input).map_err(|e| RegistryError::invalid_url(input, e))?;
    if !url.has_host() {
        return Err(RegistryError::invalid_url(input, "missing host"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        code::{ALPHABET, ScriptedCodes},
        storage::MemoryStorage,
    };

    fn code(s: &str) -> ShortCode {
        ShortCode::parse(s).unwrap()
    }

    fn scripted(storage: MemoryStorage, codes: &[&str]) -> Registry<MemoryStorage> {
        let codes = ScriptedCodes::new(codes.iter().map(|c| code(c)).collect());
        Registry::with_code_source(storage, RegistryConfig::default(), Box::new(codes))
    }

    /// Refuses every write.
    struct ReadOnly(MemoryStorage);

    impl Storage for ReadOnly {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::new("read only".to_string()))
        }
    }

    #[test]
    fn test_allocate_shape() {
        let mut registry = Registry::open(MemoryStorage::new());
        let link = registry.allocate("https://example.com/a").unwrap();
        assert_eq!(link.original_url, "https://example.com/a");
        assert_eq!(link.short_code.as_str().len(), 6);
        assert!(link.short_code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
        assert_eq!(link.clicks, 0);
    }

    #[test]
    fn test_allocate_trims_input() {
        let mut registry = Registry::open(MemoryStorage::new());
        let link = registry.allocate("  https://example.com/a \n").unwrap();
        assert_eq!(link.original_url, "https://example.com/a");
    }

    #[test]
    fn test_allocate_prepends() {
        let mut registry = scripted(MemoryStorage::new(), &["AAAAAA", "BBBBBB", "CCCCCC"]);
        registry.allocate("https://one.example").unwrap();
        registry.allocate("https://two.example").unwrap();
        registry.allocate("https://three.example").unwrap();
        let codes: Vec<&str> = registry.list(10).iter().map(|l| l.short_code.as_str()).collect();
        assert_eq!(codes, vec!["CCCCCC", "BBBBBB", "AAAAAA"]);
    }

    #[test]
    fn test_allocate_retries_on_collision() {
        let mut registry = scripted(MemoryStorage::new(), &["AAAAAA", "AAAAAA", "AAAAAA", "BBBBBB"]);
        registry.allocate("https://one.example").unwrap();
        let second = registry.allocate("https://two.example").unwrap();
        assert_eq!(second.short_code.as_str(), "BBBBBB");
    }

    #[test]
    fn test_allocate_exhausted() {
        let storage = MemoryStorage::new();
        let codes = ScriptedCodes::new(vec![code("AAAAAA")]);
        let config = RegistryConfig {
            max_attempts: 5,
            ..RegistryConfig::default()
        };
        let mut registry = Registry::with_code_source(storage, config, Box::new(codes));
        registry.allocate("https://one.example").unwrap();

        let err = registry.allocate("https://two.example").unwrap_err();
        assert!(matches!(err, RegistryError::CodeSpaceExhausted { attempts: 5 }));
        assert_eq!(registry.len(), 1);

        // still usable for everything else
        assert_eq!(registry.resolve("AAAAAA").unwrap().clicks, 1);
        assert!(registry.delete("AAAAAA").unwrap());
    }

    #[test]
    fn test_allocate_invalid() {
        let mut registry = Registry::open(MemoryStorage::new());
        for input in ["", "   ", "not a url", "example.com", "mailto:someone@example.com", "/relative/path"] {
            let err = registry.allocate(input).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidUrl { .. }), "{input}: {err}");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_counts() {
        let mut registry = Registry::open(MemoryStorage::new());
        let link = registry.allocate("https://example.com/a").unwrap();
        let code = link.short_code.to_string();
        assert_eq!(registry.resolve(&code).unwrap().clicks, 1);
        assert_eq!(registry.resolve(&code).unwrap().clicks, 2);
        assert_eq!(registry.get(&code).unwrap().clicks, 2);
    }

    #[test]
    fn test_resolve_saturates_clicks() {
        let storage = MemoryStorage::new();
        storage
            .set(
                DEFAULT_STORAGE_KEY,
                r#"[{"originalUrl":"https://a.example","shortCode":"AAAAAA","createdAt":"2024-01-02T00:00:00Z","clicks":18446744073709551615}]"#,
            )
            .unwrap();
        let mut registry = Registry::open(storage.clone());
        assert_eq!(registry.resolve("AAAAAA").unwrap().clicks, u64::MAX);
        assert_eq!(registry.resolve("AAAAAA").unwrap().original_url, "https://a.example");
        assert_eq!(Registry::open(storage).get("AAAAAA").unwrap().clicks, u64::MAX);
    }

    #[test]
    fn test_resolve_missing() {
        let mut registry = Registry::open(MemoryStorage::new());
        registry.allocate("https://example.com/a").unwrap();
        let before = registry.list(10).to_vec();
        let err = registry.resolve("doesnotexist").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(matches!(registry.resolve("ZZZZZZ"), Err(RegistryError::NotFound(_))));
        assert_eq!(registry.list(10), before.as_slice());
    }

    #[test]
    fn test_delete() {
        let mut registry = scripted(MemoryStorage::new(), &["AAAAAA", "BBBBBB"]);
        registry.allocate("https://one.example").unwrap();
        registry.allocate("https://two.example").unwrap();
        assert!(registry.delete("AAAAAA").unwrap());
        assert!(!registry.delete("AAAAAA").unwrap());
        assert!(!registry.delete("not-a-code").unwrap());
        assert!(matches!(registry.resolve("AAAAAA"), Err(RegistryError::NotFound(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deleted_code_can_be_reused() {
        let mut registry = scripted(MemoryStorage::new(), &["AAAAAA"]);
        registry.allocate("https://one.example").unwrap();
        registry.delete("AAAAAA").unwrap();
        let link = registry.allocate("https://two.example").unwrap();
        assert_eq!(link.short_code.as_str(), "AAAAAA");
    }

    #[test]
    fn test_list_limit() {
        let mut registry = Registry::open(MemoryStorage::new());
        assert!(registry.list(10).is_empty());
        for i in 0..12 {
            registry.allocate(&format!("https://example.com/{i}")).unwrap();
        }
        assert_eq!(registry.list(10).len(), 10);
        assert_eq!(registry.list(100).len(), 12);
        assert!(registry.list(0).is_empty());
        assert_eq!(registry.list(1)[0].original_url, "https://example.com/11");
    }

    #[test]
    fn test_mutations_persist() {
        let storage = MemoryStorage::new();
        let mut registry = Registry::open(storage.clone());
        let link = registry.allocate("https://example.com/a").unwrap();
        registry.resolve(link.short_code.as_str()).unwrap();

        let reopened = Registry::open(storage.clone());
        assert_eq!(reopened.list(10), registry.list(10));
        assert_eq!(reopened.list(10)[0].clicks, 1);

        registry.delete(link.short_code.as_str()).unwrap();
        assert!(Registry::open(storage).is_empty());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let storage = MemoryStorage::new();
        let mut registry = Registry::open(storage.clone());
        let link = registry.allocate("https://example.com/a").unwrap();
        let code = link.short_code.to_string();

        let mut read_only = Registry::open(ReadOnly(storage));
        assert!(matches!(
            read_only.allocate("https://example.com/b"),
            Err(RegistryError::Storage(_))
        ));
        assert!(matches!(read_only.resolve(&code), Err(RegistryError::Storage(_))));
        assert!(matches!(read_only.delete(&code), Err(RegistryError::Storage(_))));
        assert_eq!(read_only.list(10), vec![link].as_slice());
    }

    #[test]
    fn test_restore_corrupt() {
        let storage = MemoryStorage::new();
        storage.set(DEFAULT_STORAGE_KEY, "{not json").unwrap();
        let registry = Registry::open(storage);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_restore_skips_bad_entries() {
        let storage = MemoryStorage::new();
        storage
            .set(
                DEFAULT_STORAGE_KEY,
                r#"[
                {"originalUrl":"https://a.example","shortUrl":"x#AAAAAA","shortCode":"AAAAAA","createdAt":"2024-01-02T00:00:00Z","clicks":1},
                {"originalUrl":"https://b.example","shortUrl":"x#bad","shortCode":"bad","createdAt":"2024-01-01T00:00:00Z","clicks":0},
                {"originalUrl":"https://c.example","shortUrl":"x#AAAAAA","shortCode":"AAAAAA","createdAt":"2024-01-01T00:00:00Z","clicks":0}
            ]"#,
            )
            .unwrap();
        let registry = Registry::open(storage);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list(10)[0].original_url, "https://a.example");
    }

    #[test]
    fn test_custom_key() {
        let storage = MemoryStorage::new();
        let config = RegistryConfig {
            storage_key: "other".to_string(),
            ..RegistryConfig::default()
        };
        let mut registry = Registry::with_config(storage.clone(), config);
        registry.allocate("https://example.com").unwrap();
        assert!(storage.get("other").unwrap().is_some());
        assert!(storage.get(DEFAULT_STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://localhost:8080/x?y=1#z").is_ok());
        assert!(validate_url("ftp://files.example.com/a.txt").is_ok());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
    }
}
