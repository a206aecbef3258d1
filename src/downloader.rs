//! The capture engine.
//!
//! Fetches one page, then the same-host stylesheets, scripts, and images
//! it references, mirroring each under the target directory and recording
//! per-resource and per-session statistics through a [`SessionStore`].
//!
//! A session moves Created → InProgress → Completed/Failed. Whichever
//! terminal state is reached, the session record is finalized exactly
//! once, with whatever totals had accumulated.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use url::Url;

use crate::error::CaptureError;
use crate::fetch::{FetchedFile, Fetcher};
use crate::file_manager::{filename_of, FileManager};
use crate::html_parser::{ExtractedResources, HtmlParser};
use crate::progress::{CaptureStats, ProgressEvent, ResourceKind};
use crate::store::{unix_timestamp, SessionId, SessionStore};

/// Final accounting handed back to the caller after a capture.
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub session_id: SessionId,
    pub site_name: String,
    pub discovered: u64,
    pub completed: u64,
    pub malformed_refs: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

/// Per-invocation state: a fresh seen-set and fresh counters for every
/// `download_site` call, threaded through the call graph instead of
/// living on the downloader. Concurrent sessions cannot touch each
/// other's accounting.
struct CaptureContext {
    session_id: SessionId,
    root_host: String,
    seen: HashSet<String>,
    stats: Arc<CaptureStats>,
    started: Instant,
}

pub struct SiteDownloader<F, S> {
    fetcher: F,
    store: Arc<S>,
    events: Option<mpsc::Sender<ProgressEvent>>,
}

impl<F: Fetcher, S: SessionStore> SiteDownloader<F, S> {
    pub fn new(fetcher: F, store: Arc<S>) -> Self {
        Self {
            fetcher,
            store,
            events: None,
        }
    }

    /// Attaches a progress channel. Delivery is lossy (`try_send`) and
    /// purely observational; the capture runs the same without a receiver.
    pub fn with_events(mut self, events: mpsc::Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Captures `root_url` into `target_dir` and returns the session
    /// accounting.
    ///
    /// The URL is expected validated and normalized (see `url_check`); a
    /// string that doesn't parse fails with `InvalidUrl` before any
    /// session is created. A failing root page finalizes the session and
    /// surfaces the error with its cause; a failing secondary resource is
    /// recorded and skipped.
    pub async fn download_site(
        &self,
        root_url: &str,
        target_dir: &Path,
    ) -> Result<CaptureSummary, CaptureError> {
        let root =
            Url::parse(root_url).map_err(|_| CaptureError::InvalidUrl(root_url.to_string()))?;
        let root_host = root
            .host_str()
            .ok_or_else(|| CaptureError::InvalidUrl(root_url.to_string()))?
            .to_string();

        let files = FileManager::new(target_dir)?;

        let site_name = site_name_from_host(&root_host);
        let session_id = self
            .store
            .create_session(&site_name, unix_timestamp())
            .await?;
        tracing::info!(session_id, site = %site_name, url = %root, "capture session started");

        let mut ctx = CaptureContext {
            session_id,
            root_host,
            seen: HashSet::new(),
            stats: Arc::new(CaptureStats::new()),
            started: Instant::now(),
        };

        let outcome = self.capture(&mut ctx, &root, &files).await;

        // Finalize exactly once, on success or failure, with whatever
        // accumulated. A finalize hiccup must not mask the capture outcome.
        let elapsed = ctx.started.elapsed();
        if let Err(e) = self
            .store
            .finalize_session(
                session_id,
                unix_timestamp(),
                elapsed.as_millis() as i64,
                ctx.stats.total_kb(),
            )
            .await
        {
            tracing::warn!(session_id, error = %e, "failed to finalize session record");
        }

        match outcome {
            Ok(()) => {
                tracing::info!(
                    session_id,
                    discovered = ctx.stats.discovered(),
                    completed = ctx.stats.completed(),
                    kb = ctx.stats.total_kb(),
                    "capture session completed"
                );
                Ok(CaptureSummary {
                    session_id,
                    site_name,
                    discovered: ctx.stats.discovered(),
                    completed: ctx.stats.completed(),
                    malformed_refs: ctx.stats.malformed(),
                    total_bytes: ctx.stats.bytes(),
                    elapsed,
                })
            }
            Err(e) => {
                tracing::info!(session_id, error = %e, "capture session failed");
                Err(e)
            }
        }
    }

    /// The root page, then each qualifying resource in discovery order.
    async fn capture(
        &self,
        ctx: &mut CaptureContext,
        root: &Url,
        files: &FileManager,
    ) -> Result<(), CaptureError> {
        let Some(body) = self.fetch_root_page(ctx, root, files).await? else {
            return Ok(());
        };

        let parser = HtmlParser::new(root.clone());
        let html = String::from_utf8_lossy(&body);
        let resources = parser.extract_resources(&html);
        self.note_malformed(ctx, &resources);

        let groups = [
            (ResourceKind::Stylesheet, &resources.stylesheets),
            (ResourceKind::Script, &resources.scripts),
            (ResourceKind::Image, &resources.images),
        ];
        for (kind, urls) in groups {
            for url in urls {
                if !same_origin(&ctx.root_host, url) {
                    tracing::debug!(url = %url, "skipping cross-host resource");
                    continue;
                }
                if let Err(e) = self.fetch_resource(ctx, kind, url, files).await {
                    if e.is_recoverable() {
                        tracing::warn!(url = %url, error = %e, "resource failed; continuing");
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetches, writes, and records the root page. Returns the body for
    /// extraction, or `None` when the URL was already seen (defends
    /// against self-referential reuse of the routine). Any failure here
    /// is fatal for the session; the attempt is still recorded first.
    async fn fetch_root_page(
        &self,
        ctx: &mut CaptureContext,
        root: &Url,
        files: &FileManager,
    ) -> Result<Option<Vec<u8>>, CaptureError> {
        if !ctx.seen.insert(root.to_string()) {
            return Ok(None);
        }
        let total = ctx.stats.add_discovered();
        self.emit(ProgressEvent::Started {
            kind: ResourceKind::Page,
            url: root.to_string(),
        });

        match self.fetcher.fetch_page(root).await {
            Ok(page) => {
                let written = files
                    .map_path(root.path())
                    .and_then(|dest| files.write_file(&dest, &page.body));
                let done = ctx.stats.add_completed();
                match written {
                    Ok(()) => {
                        let bytes = page.body.len() as u64;
                        ctx.stats.add_bytes(bytes);
                        self.record(ctx, root, page.elapsed, bytes).await;
                        self.emit(ProgressEvent::Finished {
                            kind: ResourceKind::Page,
                            url: root.to_string(),
                            filename: filename_of(root),
                            status: Some(page.status),
                            bytes,
                            elapsed: page.elapsed,
                            succeeded: true,
                            done,
                            total,
                        });
                        Ok(Some(page.body))
                    }
                    Err(e) => {
                        self.record(ctx, root, page.elapsed, 0).await;
                        self.emit(ProgressEvent::Finished {
                            kind: ResourceKind::Page,
                            url: root.to_string(),
                            filename: filename_of(root),
                            status: Some(page.status),
                            bytes: 0,
                            elapsed: page.elapsed,
                            succeeded: false,
                            done,
                            total,
                        });
                        Err(e)
                    }
                }
            }
            Err(failure) => {
                let done = ctx.stats.add_completed();
                ctx.stats.add_bytes(failure.bytes);
                self.record(ctx, root, failure.elapsed, failure.bytes).await;
                self.emit(ProgressEvent::Finished {
                    kind: ResourceKind::Page,
                    url: root.to_string(),
                    filename: filename_of(root),
                    status: failure.status(),
                    bytes: failure.bytes,
                    elapsed: failure.elapsed,
                    succeeded: false,
                    done,
                    total,
                });
                Err(failure.error)
            }
        }
    }

    /// One secondary resource: dedup, fetch, account, record. The attempt
    /// is recorded whether it succeeds or not; the returned error exists
    /// so the caller can apply the recoverable/fatal distinction.
    async fn fetch_resource(
        &self,
        ctx: &mut CaptureContext,
        kind: ResourceKind,
        url: &Url,
        files: &FileManager,
    ) -> Result<(), CaptureError> {
        if !ctx.seen.insert(url.to_string()) {
            return Ok(());
        }
        let total = ctx.stats.add_discovered();
        self.emit(ProgressEvent::Started {
            kind,
            url: url.to_string(),
        });

        let url_path = url.path();
        if url_path.is_empty() || url_path == "/" {
            // Would collide with the root page mapping: counted as
            // completed, nothing written, no record of its own.
            ctx.stats.add_completed();
            return Ok(());
        }

        let attempt = self.attempt_resource(kind, url, files).await;
        let done = ctx.stats.add_completed();
        match attempt {
            Ok(fetched) => {
                ctx.stats.add_bytes(fetched.bytes);
                self.record(ctx, url, fetched.elapsed, fetched.bytes).await;
                self.emit(ProgressEvent::Finished {
                    kind,
                    url: url.to_string(),
                    filename: filename_of(url),
                    status: Some(fetched.status),
                    bytes: fetched.bytes,
                    elapsed: fetched.elapsed,
                    succeeded: true,
                    done,
                    total,
                });
                Ok(())
            }
            Err(failure) => {
                ctx.stats.add_bytes(failure.bytes);
                self.record(ctx, url, failure.elapsed, failure.bytes).await;
                self.emit(ProgressEvent::Finished {
                    kind,
                    url: url.to_string(),
                    filename: filename_of(url),
                    status: failure.status(),
                    bytes: failure.bytes,
                    elapsed: failure.elapsed,
                    succeeded: false,
                    done,
                    total,
                });
                Err(failure.error)
            }
        }
    }

    /// Maps the path and streams the body to it, forwarding transfer
    /// progress as events.
    async fn attempt_resource(
        &self,
        kind: ResourceKind,
        url: &Url,
        files: &FileManager,
    ) -> Result<FetchedFile, crate::fetch::FetchFailure> {
        use crate::fetch::FetchFailure;

        let dest = files.map_path(url.path()).map_err(|error| FetchFailure {
            error,
            bytes: 0,
            elapsed: Duration::ZERO,
        })?;
        files.prepare_parent(&dest).map_err(|error| FetchFailure {
            error,
            bytes: 0,
            elapsed: Duration::ZERO,
        })?;

        let filename = filename_of(url);
        let events = self.events.clone();
        let progress = move |bytes_so_far: u64, elapsed: Duration| {
            if let Some(tx) = &events {
                let _ = tx.try_send(ProgressEvent::Transferring {
                    kind,
                    filename: filename.clone(),
                    bytes_so_far,
                    elapsed,
                });
            }
        };
        self.fetcher.fetch_to_file(url, &dest, &progress).await
    }

    /// Every attempted URL gets exactly one row. A persistence hiccup
    /// here is logged and swallowed so one bad insert cannot sink the
    /// session; startup storage failures are surfaced elsewhere.
    async fn record(&self, ctx: &CaptureContext, url: &Url, elapsed: Duration, bytes: u64) {
        if let Err(e) = self
            .store
            .record_resource(
                ctx.session_id,
                url.as_str(),
                elapsed.as_millis() as i64,
                bytes as f64 / 1024.0,
            )
            .await
        {
            tracing::warn!(url = %url, error = %e, "failed to record resource");
        }
    }

    fn note_malformed(&self, ctx: &CaptureContext, resources: &ExtractedResources) {
        if resources.malformed > 0 {
            ctx.stats.add_malformed(resources.malformed);
            tracing::warn!(
                count = resources.malformed,
                "skipped references that could not be resolved"
            );
            self.emit(ProgressEvent::MalformedReferences {
                count: resources.malformed,
            });
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}

/// Host-string equality only: scheme and port are deliberately ignored,
/// and subdomains never match — `www.example.com` and `example.com` are
/// different origins here.
fn same_origin(root_host: &str, url: &Url) -> bool {
    url.host_str() == Some(root_host)
}

/// Name a session is recorded under: the host with one leading `www.`
/// stripped.
fn site_name_from_host(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
