//! Playlist entries.
//!
//! The config store hands out entries in several shapes: a bare string, or an
//! object carrying any mix of `filename`, `url`, `path` and `id`. They are
//! normalized once, at deserialization, into a [`PlaylistEntry`] whose
//! [`EntrySource`] records the single reference the resolver will follow.
//! Precedence is `filename` > `url` > `path` > id only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The reference a playlist entry resolves through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntrySource {
    /// File name relative to the managed video directory.
    File(String),

    /// Absolute or relative URL whose path ends in the file name.
    Url(String),

    /// Local filesystem path.
    Path(PathBuf),

    /// Only a catalog id; cannot be resolved without the catalog.
    IdOnly,
}

impl EntrySource {
    /// The file name this source points at, if one can be derived.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::File(name) => last_segment(name),
            Self::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                last_segment(path)
            }
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Self::IdOnly => None,
        }
    }
}

fn last_segment(s: &str) -> Option<String> {
    s.rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// One playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct PlaylistEntry {
    /// Catalog identity.
    pub id: Option<String>,

    /// Display title.
    pub title: Option<String>,

    /// Display duration ("3:25"); not used for scheduling.
    pub duration: Option<String>,

    /// Per-entry volume override.
    pub volume: Option<f32>,

    /// What the entry points at.
    pub source: EntrySource,
}

impl PlaylistEntry {
    /// Entry referring to a file in the video directory.
    pub fn file(name: impl Into<String>) -> Self {
        Self::with_source(EntrySource::File(name.into()))
    }

    /// Entry with only a source and no metadata.
    pub fn with_source(source: EntrySource) -> Self {
        Self {
            id: None,
            title: None,
            duration: None,
            volume: None,
            source,
        }
    }

    /// Sets the catalog id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Identity used for resume and pointer correction: the catalog id when
    /// present, otherwise the file name.
    pub fn identity(&self) -> Option<String> {
        self.id.clone().or_else(|| self.source.file_name())
    }

    /// Returns true if `other` refers to the same catalog item or file.
    pub fn same_item(&self, other: &PlaylistEntry) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => match (self.source.file_name(), other.source.file_name()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Wire shapes accepted from the config store.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(String),
    Object(RawEntryObject),
}

#[derive(Default, Serialize, Deserialize)]
struct RawEntryObject {
    #[serde(
        default,
        deserialize_with = "id_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<f32>,
}

fn id_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.and_then(|id| match id {
        Id::Text(text) => non_empty(Some(text)),
        Id::Number(n) => Some(n.to_string()),
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<RawEntry> for PlaylistEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Bare(text) => {
                let text = text.trim().to_string();
                let source = if text.contains("://") {
                    EntrySource::Url(text)
                } else if text.contains('/') || text.contains('\\') {
                    EntrySource::Path(PathBuf::from(text))
                } else if text.is_empty() {
                    EntrySource::IdOnly
                } else {
                    EntrySource::File(text)
                };
                PlaylistEntry::with_source(source)
            }
            RawEntry::Object(obj) => {
                let source = if let Some(name) = non_empty(obj.filename) {
                    EntrySource::File(name)
                } else if let Some(url) = non_empty(obj.url) {
                    EntrySource::Url(url)
                } else if let Some(path) = non_empty(obj.path) {
                    EntrySource::Path(PathBuf::from(path))
                } else {
                    EntrySource::IdOnly
                };
                PlaylistEntry {
                    id: obj.id,
                    title: non_empty(obj.title),
                    duration: non_empty(obj.duration),
                    volume: obj.volume,
                    source,
                }
            }
        }
    }
}

impl From<PlaylistEntry> for RawEntry {
    fn from(entry: PlaylistEntry) -> Self {
        let mut obj = RawEntryObject {
            id: entry.id,
            title: entry.title,
            duration: entry.duration,
            volume: entry.volume,
            ..Default::default()
        };
        match entry.source {
            EntrySource::File(name) => obj.filename = Some(name),
            EntrySource::Url(url) => obj.url = Some(url),
            EntrySource::Path(path) => obj.path = Some(path_to_string(&path)),
            EntrySource::IdOnly => {}
        }
        RawEntry::Object(obj)
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
