//! Maps playlist entries to files in the managed media directories.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::{debug, warn};
use url::Url;

use loopcast_ffmpeg::OverlayInput;
use loopcast_ipc::{AudioOverlay, EntrySource, EntrySummary, PlaylistEntry};

use crate::error::Unresolvable;

/// An entry whose file existed when the playlist was last validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub entry: PlaylistEntry,
    pub path: PathBuf,
}

impl ResolvedEntry {
    pub fn new(entry: PlaylistEntry, path: impl Into<PathBuf>) -> Self {
        Self {
            entry,
            path: path.into(),
        }
    }

    /// File name on disk.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Title when known, else the file name.
    pub fn label(&self) -> String {
        self.entry.title.clone().unwrap_or_else(|| self.file_name())
    }

    /// Key written to the resume checkpoint.
    pub fn identity(&self) -> String {
        self.entry.identity().unwrap_or_else(|| self.file_name())
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.entry.id.clone(),
            title: self.entry.title.clone(),
            duration: self.entry.duration.clone(),
            volume: self.entry.volume,
            file: self.file_name(),
        }
    }
}

/// Outcome of [`PlaylistResolver::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    /// Playable entries, in playlist order.
    pub entries: Vec<ResolvedEntry>,

    /// Positions (in the input) of entries whose file is gone.
    pub missing: Vec<usize>,

    /// Entries that could not be mapped to a file at all.
    pub unresolvable: usize,
}

impl Validated {
    pub fn removed(&self) -> usize {
        self.missing.len() + self.unresolvable
    }

    /// `original` minus the entries whose file is gone, for write-back.
    /// Unresolvable entries are kept; fixing them is up to whoever edits the catalog.
    pub fn without_missing(&self, original: &[PlaylistEntry]) -> Vec<PlaylistEntry> {
        let missing: HashSet<usize> = self.missing.iter().copied().collect();
        original
            .iter()
            .enumerate()
            .filter(|(i, _)| !missing.contains(i))
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

/// Resolves entries against the video directory.
#[derive(Debug, Clone)]
pub struct PlaylistResolver {
    video_dir: PathBuf,
    audio_dir: PathBuf,
    url_prefix: String,
}

impl PlaylistResolver {
    pub fn new(
        video_dir: impl Into<PathBuf>,
        audio_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            video_dir: video_dir.into(),
            audio_dir: audio_dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    /// Map an entry to the path it names. Does not touch the filesystem.
    pub fn resolve(&self, entry: &PlaylistEntry) -> Result<PathBuf, Unresolvable> {
        match &entry.source {
            EntrySource::File(_) => {
                let name = entry.source.file_name().ok_or(Unresolvable::NoSource)?;
                self.join_relative(&name)
            }
            EntrySource::Url(raw) => self.resolve_url(raw),
            EntrySource::Path(path) if path.is_absolute() => Ok(path.clone()),
            EntrySource::Path(path) => self.join_relative(&path.to_string_lossy()),
            EntrySource::IdOnly => Err(Unresolvable::NoSource),
        }
    }

    fn resolve_url(&self, raw: &str) -> Result<PathBuf, Unresolvable> {
        let parsed = Url::parse(raw)
            .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(raw)))
            .map_err(|e| Unresolvable::BadUrl(format!("{raw}: {e}")))?;

        let decoded = percent_decode_str(parsed.path())
            .decode_utf8()
            .map_err(|e| Unresolvable::BadUrl(format!("{raw}: {e}")))?;

        let relative = match decoded.strip_prefix(self.url_prefix.as_str()) {
            Some(rest) if !self.url_prefix.is_empty() => rest.to_string(),
            _ => decoded
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        if relative.is_empty() {
            return Err(Unresolvable::BadUrl(raw.to_string()));
        }
        self.join_relative(&relative)
    }

    fn join_relative(&self, relative: &str) -> Result<PathBuf, Unresolvable> {
        let relative = Path::new(relative);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Unresolvable::Traversal(relative.display().to_string()));
        }
        Ok(self.video_dir.join(relative))
    }

    /// Resolve every entry and keep the ones whose file exists right now.
    pub fn validate(&self, playlist: &[PlaylistEntry]) -> Validated {
        let mut validated = Validated::default();

        for (position, entry) in playlist.iter().enumerate() {
            match self.resolve(entry) {
                Ok(path) if path.is_file() => {
                    validated.entries.push(ResolvedEntry::new(entry.clone(), path));
                }
                Ok(path) => {
                    warn!(
                        position,
                        path = %path.display(),
                        "Dropping playlist entry: {}",
                        Unresolvable::Missing(path.display().to_string())
                    );
                    validated.missing.push(position);
                }
                Err(reason) => {
                    warn!(position, id = ?entry.id, "Playlist entry cannot be resolved: {}", reason);
                    validated.unresolvable += 1;
                }
            }
        }

        debug!(
            total = playlist.len(),
            playable = validated.entries.len(),
            removed = validated.removed(),
            "Playlist validated"
        );
        validated
    }

    /// Background track for the master, if enabled and present on disk.
    pub fn resolve_overlay(&self, overlay: &AudioOverlay) -> Option<OverlayInput> {
        if !overlay.is_active() {
            return None;
        }

        let reference = overlay.audio_file_ref.trim();
        let path = if Path::new(reference).is_absolute() {
            PathBuf::from(reference)
        } else {
            let name = reference.rsplit(['/', '\\']).next().unwrap_or(reference);
            self.audio_dir.join(name)
        };

        if !path.is_file() {
            warn!(path = %path.display(), "Background audio not found, streaming without it");
            return None;
        }

        Some(OverlayInput {
            path,
            weight: overlay.mix_weight(),
        })
    }
}
