//! Common types shared by the config store, the engine and the control surface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playlist::PlaylistEntry;

/// Video bitrate used when the config record does not set one.
pub const DEFAULT_VIDEO_BITRATE_KBPS: u32 = 8000;

fn default_video_bitrate() -> u32 {
    DEFAULT_VIDEO_BITRATE_KBPS
}

/// The desired broadcast state, as polled from the config store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Desired on/off.
    #[serde(default)]
    pub is_active: bool,

    /// Where the master publishes.
    #[serde(default)]
    pub rtmp_endpoint: RtmpEndpoint,

    /// Video bitrate in kbps (default: 8000).
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate_kbps: u32,

    /// Optional looping background audio.
    #[serde(default)]
    pub audio_overlay: AudioOverlay,

    /// Insertion order is playback order.
    #[serde(default)]
    pub playlist: Vec<PlaylistEntry>,

    /// Advisory; only used for logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            is_active: false,
            rtmp_endpoint: RtmpEndpoint::default(),
            video_bitrate_kbps: DEFAULT_VIDEO_BITRATE_KBPS,
            audio_overlay: AudioOverlay::default(),
            playlist: Vec::new(),
            updated_at: None,
        }
    }
}

impl StreamConfig {
    /// The fields that are baked into the master's command line.
    pub fn critical_settings(&self) -> CriticalSettings {
        CriticalSettings {
            endpoint: self.rtmp_endpoint.clone(),
            video_bitrate_kbps: self.video_bitrate_kbps,
            audio_overlay: self.audio_overlay.clone(),
        }
    }
}

/// Settings that cannot be hot-reloaded into a running master.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalSettings {
    pub endpoint: RtmpEndpoint,
    pub video_bitrate_kbps: u32,
    pub audio_overlay: AudioOverlay,
}

impl CriticalSettings {
    /// Names of the fields that differ between `self` and `other`.
    pub fn changed_fields(&self, other: &CriticalSettings) -> Vec<String> {
        let mut fields = Vec::new();
        if self.endpoint.base_url != other.endpoint.base_url {
            fields.push("rtmp url".to_string());
        }
        if self.endpoint.key != other.endpoint.key {
            fields.push("stream key".to_string());
        }
        if self.video_bitrate_kbps != other.video_bitrate_kbps {
            fields.push("video bitrate".to_string());
        }
        if self.audio_overlay.enabled != other.audio_overlay.enabled {
            fields.push("audio overlay".to_string());
        }
        if self.audio_overlay.volume_percent != other.audio_overlay.volume_percent {
            fields.push("audio volume".to_string());
        }
        if self.audio_overlay.audio_file_ref != other.audio_overlay.audio_file_ref {
            fields.push("audio file".to_string());
        }
        fields
    }
}

/// RTMP publish target. The key is a secret and is masked in `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtmpEndpoint {
    /// Server URL (e.g., "rtmp://a.rtmp.youtube.com/live2").
    #[serde(default)]
    pub base_url: String,

    /// Stream key.
    #[serde(default)]
    pub key: String,
}

impl RtmpEndpoint {
    /// Full publish URL including the key.
    pub fn publish_url(&self) -> String {
        format!("{}/{}", self.base_url.trim().trim_end_matches('/'), self.key.trim())
    }

    /// Publish URL safe for logs.
    pub fn redacted(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            redact_key(self.key.trim())
        )
    }
}

impl fmt::Debug for RtmpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtmpEndpoint")
            .field("base_url", &self.base_url)
            .field("key", &redact_key(&self.key))
            .finish()
    }
}

/// Masks a stream key, keeping at most its first four characters.
pub fn redact_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let visible: String = key.chars().take(4).collect();
    if visible.chars().count() == key.chars().count() {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

/// Looping background audio mixed into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOverlay {
    #[serde(default)]
    pub enabled: bool,

    /// Mix weight, 0-100.
    #[serde(default = "default_overlay_volume")]
    pub volume_percent: u8,

    /// File name (or path) of the background track.
    #[serde(default)]
    pub audio_file_ref: String,
}

fn default_overlay_volume() -> u8 {
    30
}

impl Default for AudioOverlay {
    fn default() -> Self {
        Self {
            enabled: false,
            volume_percent: default_overlay_volume(),
            audio_file_ref: String::new(),
        }
    }
}

impl AudioOverlay {
    /// Returns true if the overlay should be mixed in.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.audio_file_ref.trim().is_empty()
    }

    /// Mix weight in `[0.0, 1.0]`.
    pub fn mix_weight(&self) -> f32 {
        f32::from(self.volume_percent.min(100)) / 100.0
    }
}

/// Display data for one playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<String>,
    pub volume: Option<f32>,

    /// Resolved file name.
    pub file: String,
}

/// Playout counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayoutMetrics {
    /// Feeders spawned since the process started.
    pub entries_started: u64,

    /// Feeders that exited with code 0.
    pub entries_completed: u64,

    /// Feeders that failed to spawn or exited non-zero.
    pub feeder_failures: u64,

    /// Manual skips accepted.
    pub skips: u64,

    /// Master processes that exited on their own.
    pub master_failures: u64,

    /// Playlist snapshots adopted by hot-reload.
    pub playlist_reloads: u64,

    /// Seconds since the current session went live (0 when idle).
    pub uptime_seconds: u64,
}

/// Answer to a status query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastStatus {
    /// False while the master is down, including mid-recovery.
    pub is_streaming: bool,

    /// Engine state name.
    pub state: String,

    /// Playhead into the snapshot; `None` when idle.
    pub current_index: Option<usize>,

    /// Entries in the snapshot.
    pub total_entries: usize,

    /// Entry currently being fed (or about to be).
    pub current_entry: Option<EntrySummary>,

    /// Entry a natural advance would play next.
    pub next_entry: Option<EntrySummary>,

    /// Playout counters.
    pub metrics: PlayoutMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key("abcd-efgh-ijkl"), "abcd****");
        assert_eq!(redact_key("abc"), "****");
        assert_eq!(redact_key(""), "");
    }

    #[test]
    fn test_endpoint_debug_hides_key() {
        let endpoint = RtmpEndpoint {
            base_url: "rtmp://a.rtmp.youtube.com/live2/".into(),
            key: "secret-stream-key".into(),
        };
        let printed = format!("{endpoint:?}");
        assert!(!printed.contains("secret-stream-key"));
        assert_eq!(
            endpoint.publish_url(),
            "rtmp://a.rtmp.youtube.com/live2/secret-stream-key"
        );
        assert_eq!(endpoint.redacted(), "rtmp://a.rtmp.youtube.com/live2/secr****");
    }

    #[test]
    fn test_config_defaults_from_camel_case_json() {
        let json = r#"{
            "isActive": true,
            "rtmpEndpoint": { "baseUrl": "rtmp://host/app", "key": "k" },
            "audioOverlay": { "enabled": true, "volumePercent": 40, "audioFileRef": "bed.mp3" },
            "playlist": ["intro.mp4"]
        }"#;
        let config: StreamConfig = serde_json::from_str(json).unwrap();
        assert!(config.is_active);
        assert_eq!(config.video_bitrate_kbps, DEFAULT_VIDEO_BITRATE_KBPS);
        assert!(config.audio_overlay.is_active());
        assert!((config.audio_overlay.mix_weight() - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.playlist.len(), 1);
    }

    #[test]
    fn test_critical_changed_fields() {
        let base = StreamConfig::default();
        let mut changed = base.clone();
        changed.audio_overlay.volume_percent = 80;
        changed.video_bitrate_kbps = 6000;

        let fields = base
            .critical_settings()
            .changed_fields(&changed.critical_settings());
        assert_eq!(fields, vec!["video bitrate", "audio volume"]);
    }
}
