//! Ordered lookup strategies.
//!
//! Each strategy only answers "is there an entry where I would put it";
//! decoding, version checks and eviction are done once by the cache for
//! whichever strategy hits first.

use std::path::{Path, PathBuf};

use crate::key::CacheKey;

/// Outcome of one lookup step.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Miss => None,
        }
    }
}

/// What a caller knows about the entry it wants.
#[derive(Debug, Clone)]
pub struct LookupRequest<'a> {
    pub key: &'a CacheKey,
    /// File stem of the original media, for entries written before
    /// content hashing was introduced
    pub legacy_name: Option<&'a str>,
}

impl<'a> LookupRequest<'a> {
    pub fn new(key: &'a CacheKey) -> Self {
        Self { key, legacy_name: None }
    }

    pub fn with_legacy_name(mut self, name: &'a str) -> Self {
        self.legacy_name = Some(name);
        self
    }
}

pub trait LookupStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Where this strategy would find the entry, if it applies to the request.
    fn locate(&self, root: &Path, request: &LookupRequest<'_>) -> Option<PathBuf>;

    fn probe(&self, root: &Path, request: &LookupRequest<'_>) -> Lookup<PathBuf> {
        match self.locate(root, request) {
            Some(path) if path.is_file() => Lookup::Hit(path),
            _ => Lookup::Miss,
        }
    }
}

/// `{root}/{purpose}/{content_hash}.{label}.json.gz`
#[derive(Debug, Default)]
pub struct ContentHashLookup;

impl LookupStrategy for ContentHashLookup {
    fn name(&self) -> &'static str {
        "content_hash"
    }

    fn locate(&self, root: &Path, request: &LookupRequest<'_>) -> Option<PathBuf> {
        let key = request.key;
        Some(root.join(key.purpose.dir_name()).join(key.entry_file_name()))
    }
}

/// `{root}/{purpose}/by-name/{stem}.{label}.json.gz`
#[derive(Debug, Default)]
pub struct LegacyFilenameLookup;

impl LegacyFilenameLookup {
    pub const DIR: &'static str = "by-name";

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl LookupStrategy for LegacyFilenameLookup {
    fn name(&self) -> &'static str {
        "legacy_filename"
    }

    fn locate(&self, root: &Path, request: &LookupRequest<'_>) -> Option<PathBuf> {
        let name = request.legacy_name.filter(|n| !n.is_empty())?;
        let key = request.key;
        Some(
            root.join(key.purpose.dir_name())
                .join(Self::DIR)
                .join(format!("{}.{}.json.gz", Self::sanitize(name), key.label)),
        )
    }
}

/// Strategies tried in order; the first is the canonical location.
pub struct LookupChain {
    strategies: Vec<Box<dyn LookupStrategy>>,
}

impl LookupChain {
    pub fn new(strategies: Vec<Box<dyn LookupStrategy>>) -> Self {
        Self { strategies }
    }

    /// Content hash first, then legacy filename.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(ContentHashLookup), Box::new(LegacyFilenameLookup)])
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LookupStrategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for LookupChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for LookupChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|s| s.name())).finish()
    }
}
