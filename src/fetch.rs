//! HTTP fetch client: one attempt per URL, fixed user-agent, fixed
//! timeouts, no retries.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::CaptureError;

/// User-agent sent with every request.
pub const USER_AGENT: &str = concat!("sitesnap/", env!("CARGO_PKG_VERSION"));

/// Connection-establishment timeout for a single request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall timeout for a single request, reads included. A hung
/// connection surfaces as a `Network` failure instead of blocking the
/// session.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum interval between progress callbacks on a streamed fetch.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Successful fetch with the body held in memory. Used for the root page,
/// which must be parsed before it is written.
#[derive(Debug)]
pub struct FetchedPage {
    pub status: u16,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

/// Successful streamed fetch, already written to disk.
#[derive(Debug)]
pub struct FetchedFile {
    pub status: u16,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Failed fetch attempt, carrying whatever accounting accumulated before
/// the failure so the attempt can still be recorded.
#[derive(Debug)]
pub struct FetchFailure {
    pub error: CaptureError,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl FetchFailure {
    /// Status code when the failure was an HTTP error response.
    pub fn status(&self) -> Option<u16> {
        match &self.error {
            CaptureError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Progress observer for streamed fetches: `(bytes so far, elapsed)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Duration) + Send + Sync);

/// Transport seam for the capture engine. The production implementation
/// is [`HttpFetcher`]; tests script outcomes without touching a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Single GET with the body buffered in memory.
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchFailure>;

    /// Single GET streamed straight to `dest`, reporting progress roughly
    /// every 100 ms. The destination's parent directories must already
    /// exist. A partial file may remain on failure; the byte count in the
    /// failure reflects it.
    async fn fetch_to_file(
        &self,
        url: &Url,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<FetchedFile, FetchFailure>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a client with the fixed user-agent and timeouts. Redirects
    /// stay at reqwest's defaults.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Sends the request and screens the status; non-2xx is a failure.
    async fn send(&self, url: &Url, started: Instant) -> Result<reqwest::Response, FetchFailure> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchFailure {
                error: CaptureError::Network {
                    url: url.to_string(),
                    source: Some(source),
                },
                bytes: 0,
                elapsed: started.elapsed(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                error: CaptureError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                },
                bytes: 0,
                elapsed: started.elapsed(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchFailure> {
        let started = Instant::now();
        let response = self.send(url, started).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|source| FetchFailure {
            error: CaptureError::Network {
                url: url.to_string(),
                source: Some(source),
            },
            bytes: 0,
            elapsed: started.elapsed(),
        })?;
        Ok(FetchedPage {
            status,
            body: body.to_vec(),
            elapsed: started.elapsed(),
        })
    }

    async fn fetch_to_file(
        &self,
        url: &Url,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<FetchedFile, FetchFailure> {
        let started = Instant::now();
        let response = self.send(url, started).await?;
        let status = response.status().as_u16();

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| FetchFailure {
                error: CaptureError::Io {
                    path: dest.to_path_buf(),
                    source,
                },
                bytes: 0,
                elapsed: started.elapsed(),
            })?;

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_report = Instant::now();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    return Err(FetchFailure {
                        error: CaptureError::Network {
                            url: url.to_string(),
                            source: Some(source),
                        },
                        bytes: received,
                        elapsed: started.elapsed(),
                    });
                }
            };
            if let Err(source) = file.write_all(&chunk).await {
                return Err(FetchFailure {
                    error: CaptureError::Io {
                        path: dest.to_path_buf(),
                        source,
                    },
                    bytes: received,
                    elapsed: started.elapsed(),
                });
            }
            received += chunk.len() as u64;
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                progress(received, started.elapsed());
                last_report = Instant::now();
            }
        }
        if let Err(source) = file.flush().await {
            return Err(FetchFailure {
                error: CaptureError::Io {
                    path: dest.to_path_buf(),
                    source,
                },
                bytes: received,
                elapsed: started.elapsed(),
            });
        }

        Ok(FetchedFile {
            status,
            bytes: received,
            elapsed: started.elapsed(),
        })
    }
}
