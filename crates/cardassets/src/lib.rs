//! Background data acquisition for card environments.
//!
//! A card's `data_location` names either a filesystem path or an http(s)
//! URL. [`AssetClient`] turns a location into raw bytes synchronously;
//! [`BackgroundLoader`] runs the same fetch on a worker thread and hands
//! completions back through a channel, each tagged with the generation of
//! the configuration that requested it. In-flight fetches are never
//! cancelled; the consumer compares generations and discards stale results.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use lightconfig::DataType;
use reqwest::blocking::Client;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[error("failed to construct http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to start background loader: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("background loader worker is gone")]
    WorkerGone,
}

/// Where a card's background payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLocation {
    File(PathBuf),
    Url(String),
}

impl DataLocation {
    /// Anything with an http(s) scheme is a URL; everything else is treated
    /// as a local path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            DataLocation::Url(raw.to_string())
        } else {
            DataLocation::File(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocation::File(path) => write!(f, "{}", path.display()),
            DataLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Blocking fetcher for background payloads.
pub struct AssetClient {
    http: Client,
}

impl AssetClient {
    pub fn new() -> Result<Self, AssetError> {
        let http = Client::builder().build().map_err(AssetError::Client)?;
        Ok(Self { http })
    }

    pub fn fetch(&self, location: &DataLocation) -> Result<Vec<u8>, AssetError> {
        match location {
            DataLocation::File(path) => fs::read(path).map_err(|source| AssetError::Io {
                path: path.display().to_string(),
                source,
            }),
            DataLocation::Url(url) => {
                tracing::debug!(%url, "fetching background data");
                let response = self
                    .http
                    .get(url)
                    .send()
                    .and_then(|response| response.error_for_status())
                    .map_err(|source| AssetError::Http {
                        url: url.clone(),
                        source,
                    })?;
                let bytes = response.bytes().map_err(|source| AssetError::Http {
                    url: url.clone(),
                    source,
                })?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// One queued background fetch.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Configuration generation that asked for this payload.
    pub generation: u64,
    pub location: DataLocation,
    pub data_type: DataType,
}

/// Completion of a background fetch, stale or not.
#[derive(Debug)]
pub struct LoadResult {
    pub generation: u64,
    pub data_type: DataType,
    pub outcome: Result<Vec<u8>, AssetError>,
}

/// Worker-thread loader polled by the rendering side once per frame.
pub struct BackgroundLoader {
    requests: Sender<LoadRequest>,
    completions: Receiver<LoadResult>,
}

impl BackgroundLoader {
    pub fn spawn() -> Result<Self, AssetError> {
        let client = AssetClient::new()?;
        let (requests, request_rx) = unbounded::<LoadRequest>();
        let (completion_tx, completions) = unbounded();

        thread::Builder::new()
            .name("background-loader".into())
            .spawn(move || {
                for request in request_rx {
                    let outcome = client.fetch(&request.location);
                    if let Err(error) = &outcome {
                        tracing::warn!(
                            location = %request.location,
                            generation = request.generation,
                            %error,
                            "background fetch failed"
                        );
                    }
                    let result = LoadResult {
                        generation: request.generation,
                        data_type: request.data_type,
                        outcome,
                    };
                    if completion_tx.send(result).is_err() {
                        break;
                    }
                }
            })
            .map_err(AssetError::Spawn)?;

        Ok(Self {
            requests,
            completions,
        })
    }

    /// Queues a fetch; returns an error only if the worker has exited.
    pub fn begin(&self, request: LoadRequest) -> Result<(), AssetError> {
        tracing::debug!(
            location = %request.location,
            generation = request.generation,
            data_type = %request.data_type,
            "queueing background load"
        );
        self.requests
            .send(request)
            .map_err(|_| AssetError::WorkerGone)
    }

    /// Takes one finished load if any, without blocking.
    pub fn poll(&self) -> Option<LoadResult> {
        self.completions.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn parses_urls_and_paths() {
        assert_eq!(
            DataLocation::parse("https://example.com/sky.exr"),
            DataLocation::Url("https://example.com/sky.exr".into())
        );
        assert_eq!(
            DataLocation::parse("textures/sky.png"),
            DataLocation::File(PathBuf::from("textures/sky.png"))
        );
    }

    #[test]
    fn fetches_file_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.bin");
        fs::write(&path, b"environment").expect("write fixture");

        let client = AssetClient::new().expect("client");
        let bytes = client
            .fetch(&DataLocation::File(path))
            .expect("fetch file");
        assert_eq!(bytes, b"environment");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let client = AssetClient::new().expect("client");
        let err = client
            .fetch(&DataLocation::File(PathBuf::from("/nonexistent/sky.png")))
            .unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    fn wait_for_completion(loader: &BackgroundLoader) -> LoadResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = loader.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "loader completion timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn loader_reports_completions_with_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sky.png");
        fs::write(&path, b"not-actually-png").expect("write fixture");

        let loader = BackgroundLoader::spawn().expect("spawn loader");
        loader
            .begin(LoadRequest {
                generation: 7,
                location: DataLocation::File(path),
                data_type: DataType::Png,
            })
            .expect("queue load");

        let result = wait_for_completion(&loader);
        assert_eq!(result.generation, 7);
        assert_eq!(result.data_type, DataType::Png);
        assert_eq!(result.outcome.expect("payload"), b"not-actually-png");
    }

    #[test]
    fn loader_reports_failures() {
        let loader = BackgroundLoader::spawn().expect("spawn loader");
        loader
            .begin(LoadRequest {
                generation: 1,
                location: DataLocation::File(PathBuf::from("/nonexistent/sky.png")),
                data_type: DataType::Png,
            })
            .expect("queue load");

        let result = wait_for_completion(&loader);
        assert!(result.outcome.is_err());
    }

    #[test]
    fn completions_preserve_request_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("first.png");
        let second = dir.path().join("second.png");
        fs::write(&first, b"first").expect("write fixture");
        fs::write(&second, b"second").expect("write fixture");

        let loader = BackgroundLoader::spawn().expect("spawn loader");
        for (generation, path) in [(1, &first), (2, &second)] {
            loader
                .begin(LoadRequest {
                    generation,
                    location: DataLocation::File(path.clone()),
                    data_type: DataType::Png,
                })
                .expect("queue load");
        }

        assert_eq!(wait_for_completion(&loader).generation, 1);
        assert_eq!(wait_for_completion(&loader).generation, 2);
    }
}
