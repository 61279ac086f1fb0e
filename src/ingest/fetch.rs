//! Artifact retrieval. Gateway URIs go through a blocking HTTP client with
//! a bounded timeout; anything else is read from the local filesystem.

use std::fs;
use std::time::Duration;

use log::debug;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::ingest::{FetchSnafu, IngestResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves the raw artifact document for a URI.
pub trait ArtifactFetcher {
    fn fetch(&self, uri: &str) -> IngestResult<JSValue>;
}

/// Fetcher over HTTP(S) gateways and local files.
pub struct HttpArtifactFetcher {
    http: reqwest::blocking::Client,
}

impl HttpArtifactFetcher {
    pub fn new(timeout: Duration) -> HttpArtifactFetcher {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("actacount/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        HttpArtifactFetcher { http }
    }
}

impl Default for HttpArtifactFetcher {
    fn default() -> HttpArtifactFetcher {
        HttpArtifactFetcher::new(DEFAULT_TIMEOUT)
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch(&self, uri: &str) -> IngestResult<JSValue> {
        debug!("Fetching artifact {}", uri);
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let response = self
                .http
                .get(uri)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| FetchSnafu { uri, message: e.to_string() }.build())?;
            response
                .json::<JSValue>()
                .map_err(|e| {
                    FetchSnafu {
                        uri,
                        message: format!("unparseable document: {}", e),
                    }
                    .build()
                })
        } else {
            let contents = fs::read_to_string(uri)
                .map_err(|e| FetchSnafu { uri, message: e.to_string() }.build())?;
            serde_json::from_str(&contents).map_err(|e| {
                FetchSnafu {
                    uri,
                    message: format!("unparseable document: {}", e),
                }
                .build()
            })
        }
    }
}
