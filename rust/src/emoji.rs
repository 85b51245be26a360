use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Where a custom emoji's visual comes from.
///
/// Encoded as a single-key object, e.g. `{"character": "😄"}` or
/// `{"alias": "smile"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmojiSource {
    Character(String),
    ImageUrl(String),
    ImageAsset(String),
    Alias(String),
}

/// Application-wide identity of an emoji image. Fetches are coalesced per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageKey {
    Remote(String),
    Asset(String),
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "url:{url}"),
            Self::Asset(name) => write!(f, "asset:{name}"),
        }
    }
}

/// A shortcode after alias resolution: something that can actually be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolvedEmoji {
    Glyph(String),
    Image(ImageKey),
}

impl ResolvedEmoji {
    pub fn image_key(&self) -> Option<&ImageKey> {
        match self {
            Self::Image(key) => Some(key),
            Self::Glyph(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmojiMapError {
    #[error("failed to read emoji map {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid emoji map json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("empty shortcode name")]
    EmptyName,
}

/// Immutable shortcode → source mapping supplied by the host app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EmojiMap {
    entries: HashMap<String, EmojiSource>,
}

impl EmojiMap {
    pub fn new(entries: HashMap<String, EmojiSource>) -> Result<Self, EmojiMapError> {
        let mut normalized = HashMap::with_capacity(entries.len());
        for (name, source) in entries {
            let name = bare_name(&name);
            if name.is_empty() {
                return Err(EmojiMapError::EmptyName);
            }
            normalized.insert(name.to_string(), source);
        }
        Ok(Self {
            entries: normalized,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, EmojiMapError> {
        let entries: HashMap<String, EmojiSource> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn load(path: &Path) -> Result<Self, EmojiMapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EmojiMapError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, EmojiMapError> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entry, without following aliases. Accepts `smile` or `:smile:`.
    pub fn get(&self, name: &str) -> Option<&EmojiSource> {
        self.entries.get(bare_name(name))
    }

    /// Resolve a shortcode, following an alias exactly once.
    ///
    /// An alias whose target is itself an alias does not resolve.
    pub fn resolve(&self, name: &str) -> Option<ResolvedEmoji> {
        match self.get(name)? {
            EmojiSource::Alias(target) => match self.get(target)? {
                EmojiSource::Alias(next) => {
                    tracing::debug!(
                        shortcode = bare_name(name),
                        %target,
                        %next,
                        "emoji alias chain longer than one hop left unresolved"
                    );
                    None
                }
                direct => resolve_direct(direct),
            },
            direct => resolve_direct(direct),
        }
    }
}

fn resolve_direct(source: &EmojiSource) -> Option<ResolvedEmoji> {
    match source {
        EmojiSource::Character(c) => Some(ResolvedEmoji::Glyph(c.clone())),
        EmojiSource::ImageUrl(url) => Some(ResolvedEmoji::Image(ImageKey::Remote(url.clone()))),
        EmojiSource::ImageAsset(name) => Some(ResolvedEmoji::Image(ImageKey::Asset(name.clone()))),
        EmojiSource::Alias(_) => None,
    }
}

fn bare_name(name: &str) -> &str {
    let name = name.trim();
    let name = name.strip_prefix(':').unwrap_or(name);
    name.strip_suffix(':').unwrap_or(name)
}
