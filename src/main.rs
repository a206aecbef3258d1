use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use sitesnap::cli::{Cli, Command};
use sitesnap::downloader::SiteDownloader;
use sitesnap::fetch::HttpFetcher;
use sitesnap::progress::ProgressEvent;
use sitesnap::store::{SessionStore, SqliteStore};
use sitesnap::{report, url_check};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for tables and JSON.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let store = match &args.db {
        Some(path) => SqliteStore::open_at(path).await,
        None => SqliteStore::open_default().await,
    }
    .context("session store unavailable")?;

    match args.command {
        Command::Download {
            url,
            output_dir,
            quiet,
        } => download(store, &url, &output_dir, quiet).await,
        Command::History { json } => history(store, json).await,
        Command::Report { target, json } => show_report(store, &target, json).await,
    }
}

async fn download(store: SqliteStore, raw_url: &str, output_dir: &Path, quiet: bool) -> Result<()> {
    let url = url_check::normalize(raw_url);
    if !url_check::is_valid(&url) {
        anyhow::bail!("invalid URL: {raw_url:?} (http and https only)");
    }
    println!("capturing {} into {}", url.blue(), output_dir.display());

    let fetcher = HttpFetcher::new().context("failed to build HTTP client")?;
    let mut downloader = SiteDownloader::new(fetcher, Arc::new(store));

    let printer = if quiet {
        None
    } else {
        let (tx, rx) = mpsc::channel(64);
        downloader = downloader.with_events(tx);
        Some(tokio::spawn(render_progress(rx)))
    };

    let result = downloader.download_site(&url, output_dir).await;
    // Dropping the downloader closes the event channel so the renderer
    // drains and exits.
    drop(downloader);
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    match result {
        Ok(summary) => {
            report::print_summary(&summary);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("capture of {url} failed"))),
    }
}

async fn history(store: SqliteStore, json: bool) -> Result<()> {
    let sessions = store.list_sessions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        report::print_history(&sessions);
    }
    Ok(())
}

async fn show_report(store: SqliteStore, target: &str, json: bool) -> Result<()> {
    // Numeric input is a session id, anything else a site name.
    let found = match target.parse::<i64>() {
        Ok(id) => store.session_by_id(id).await?,
        Err(_) => store.session_by_name(target).await?,
    };
    match found {
        Some(r) if json => println!("{}", serde_json::to_string_pretty(&r)?),
        Some(r) => report::print_report(&r),
        None => anyhow::bail!("no session found for {target:?}"),
    }
    Ok(())
}

async fn render_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap(),
    );

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Started { .. } => {}
            ProgressEvent::Transferring {
                kind,
                filename,
                bytes_so_far,
                elapsed,
            } => {
                let speed = if elapsed.as_millis() > 0 {
                    bytes_so_far * 1000 / elapsed.as_millis() as u64
                } else {
                    0
                };
                spinner.set_message(format!(
                    "[{}] {} @ {}/s {}",
                    kind.label(),
                    report::format_bytes(bytes_so_far),
                    report::format_bytes(speed),
                    filename
                ));
                spinner.tick();
            }
            ProgressEvent::Finished {
                kind,
                filename,
                status,
                bytes,
                elapsed,
                succeeded,
                done,
                total,
                ..
            } => {
                let mark = if succeeded {
                    "ok".green()
                } else {
                    "failed".red()
                };
                let status = status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "---".into());
                spinner.println(format!(
                    "  [{done}/{total}] {mark} {status} {:>10} {:>8} [{}] {}",
                    report::format_bytes(bytes),
                    report::format_duration_ms(elapsed.as_millis() as i64),
                    kind.label(),
                    filename
                ));
            }
            ProgressEvent::MalformedReferences { count } => {
                spinner.println(format!(
                    "  {}",
                    format!("{count} unparseable reference(s) skipped").yellow()
                ));
            }
        }
    }
    spinner.finish_and_clear();
}
