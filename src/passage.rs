use crate::error::{EngineError, EngineResult};
use include_dir::{include_dir, Dir};
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use tracing::debug;

static PASSAGE_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/passages");

pub const DEFAULT_LANGUAGE: &str = "English";

/// The fixed target text a tester must reproduce. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    text: String,
    chars: Vec<char>,
}

impl Passage {
    /// Returns `None` for an empty text.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        let chars = text.chars().collect();
        Some(Self { text, chars })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Length in characters, not bytes.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl fmt::Display for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// On-disk shape of one language's passages.
#[derive(Deserialize, Clone, Debug)]
pub struct PassagePool {
    pub language: String,
    pub passages: Vec<String>,
}

/// Registered mapping from language tag to passage pool, with a default
/// language used for any tag that is not registered.
#[derive(Debug, Clone)]
pub struct PassageCatalog {
    default_language: String,
    pools: BTreeMap<String, Vec<Passage>>,
}

impl PassageCatalog {
    pub fn from_pools<I>(default_language: &str, pools: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = PassagePool>,
    {
        let mut registered: BTreeMap<String, Vec<Passage>> = BTreeMap::new();

        for PassagePool { language, passages } in pools {
            if passages.is_empty() {
                return Err(EngineError::EmptyPool(language));
            }
            let passages = passages
                .into_iter()
                .map(|text| {
                    Passage::new(text).ok_or_else(|| EngineError::EmptyPassage(language.clone()))
                })
                .collect::<EngineResult<Vec<_>>>()?;
            registered.entry(language).or_default().extend(passages);
        }

        if !registered.contains_key(default_language) {
            return Err(EngineError::MissingDefault(default_language.to_string()));
        }

        Ok(Self {
            default_language: default_language.to_string(),
            pools: registered,
        })
    }

    /// Parse a JSON array of `{ "language": .., "passages": [..] }` objects.
    pub fn from_json_str(default_language: &str, json: &str) -> EngineResult<Self> {
        let pools: Vec<PassagePool> = serde_json::from_str(json)?;
        Self::from_pools(default_language, pools)
    }

    /// The corpus compiled into the binary.
    pub fn builtin() -> EngineResult<Self> {
        let mut pools = Vec::new();
        for file in PASSAGE_DIR.files() {
            if file.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = file.contents_utf8().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not valid UTF-8", file.path().display()),
                )
            })?;
            pools.push(serde_json::from_str::<PassagePool>(contents)?);
        }
        Self::from_pools(DEFAULT_LANGUAGE, pools)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn contains(&self, language: &str) -> bool {
        self.pools.contains_key(language)
    }

    /// Registered language tags, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// The tag whose pool `fetch` draws from for `language`.
    pub fn resolve<'a>(&'a self, language: &'a str) -> &'a str {
        if self.contains(language) {
            language
        } else {
            &self.default_language
        }
    }

    /// Pick one passage uniformly at random. Unknown tags fall back to the
    /// default language.
    pub fn fetch<R: Rng + ?Sized>(&self, language: &str, rng: &mut R) -> Passage {
        let resolved = self.resolve(language);
        if resolved != language {
            debug!(
                requested = language,
                fallback = resolved,
                "unknown language, using default pool"
            );
        }
        // pools are non-empty and the default is registered, both checked in from_pools
        let pool = &self.pools[resolved];
        pool[rng.gen_range(0..pool.len())].clone()
    }
}
