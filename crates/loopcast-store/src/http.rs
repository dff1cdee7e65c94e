//! HTTP config store.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use loopcast_ipc::{PlaylistEntry, StreamConfig};

use crate::{parse_record, ConfigStore, StoreError, StoreResult};

#[derive(Serialize)]
struct PlaylistPatch<'a> {
    playlist: &'a [PlaylistEntry],
}

/// Talks to the admin backend: `GET {base}/config`,
/// `PATCH {base}/config/playlist`.
///
/// Uses the blocking client; call it from a plain thread, never from inside
/// an async runtime.
#[derive(Debug, Clone)]
pub struct HttpConfigStore {
    base_url: String,
    client: Client,
}

impl HttpConfigStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loopcast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn config_url(&self) -> String {
        format!("{}/config", self.base_url)
    }
}

impl ConfigStore for HttpConfigStore {
    fn fetch(&self) -> StoreResult<Option<StreamConfig>> {
        let url = self.config_url();
        let response = self.client.get(&url).send()?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => parse_record(&response.text()?),
            status => Err(StoreError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }

    fn patch_playlist(&self, playlist: &[PlaylistEntry]) -> StoreResult<()> {
        let url = format!("{}/playlist", self.config_url());
        let response = self
            .client
            .patch(&url)
            .json(&PlaylistPatch { playlist })
            .send()?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        debug!(url = %url, entries = playlist.len(), "Playlist written back");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let store = HttpConfigStore::new("http://admin.local/api/", Duration::from_secs(2)).unwrap();
        assert_eq!(store.config_url(), "http://admin.local/api/config");
        assert_eq!(store.describe(), "http http://admin.local/api");
    }

    #[test]
    fn test_unreachable_store_is_an_error_not_a_stop() {
        // Port 9 (discard) on localhost is normally closed.
        let store = HttpConfigStore::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(store.fetch().is_err());
    }
}
