//! Cache command - manage the local document cache

use crate::cache::{CacheEntryInfo, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::context::CatalogContext;
use crate::config::Config;
use crate::error::CatalogResult;
use crate::fetch::FetchOrchestrator;
use console::style;
use std::io::{self, Write};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let cache = ctx.cache();

    let result = match args.action {
        CacheAction::List { format } => list_entries(cache, format).await,
        CacheAction::Path => {
            println!("{}", cache.dir().display());
            Ok(())
        }
        CacheAction::Clear { yes } => clear_entries(cache, yes).await,
        CacheAction::ClearStale => clear_stale(cache).await,
        CacheAction::Refresh => refresh_stale(ctx.orchestrator()).await,
    };

    ctx.close().await;
    result
}

/// Format bytes as a human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn entry_label(entry: &CacheEntryInfo) -> String {
    match &entry.url {
        Some(url) => url.clone(),
        None => entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// List cached documents
async fn list_entries(cache: &CacheStore, format: OutputFormat) -> CatalogResult<()> {
    let entries = cache.entries().await?;

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => entries.iter().for_each(|e| println!("{}", entry_label(e))),
    }
    Ok(())
}

fn print_entry_table(entries: &[CacheEntryInfo]) {
    if entries.is_empty() {
        println!("{}", style("No cached documents.").dim());
        return;
    }

    println!(
        "{:<8} {:<10} {:<17} {}",
        style("STATE").bold(),
        style("SIZE").bold(),
        style("MODIFIED").bold(),
        style("URL").bold()
    );
    println!("{}", "-".repeat(90));

    let mut total = 0;
    for entry in entries {
        let state = if entry.stale {
            style("stale").yellow()
        } else {
            style("fresh").green()
        };
        total += entry.size;
        println!(
            "{:<8} {:<10} {:<17} {}",
            state,
            format_bytes(entry.size),
            entry.modified.format("%Y-%m-%d %H:%M"),
            entry_label(entry)
        );
    }

    println!();
    println!("Total: {} document(s), {}", entries.len(), format_bytes(total));
}

fn print_entry_json(entries: &[CacheEntryInfo]) -> CatalogResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        url: Option<String>,
        path: String,
        size: u64,
        modified: String,
        stale: bool,
    }

    let json: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            url: e.url.clone(),
            path: e.path.display().to_string(),
            size: e.size,
            modified: e.modified.to_rfc3339(),
            stale: e.stale,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Remove the whole cache directory
async fn clear_entries(cache: &CacheStore, skip_confirm: bool) -> CatalogResult<()> {
    let entries = cache.entries().await?;
    if entries.is_empty() {
        println!("No cached documents to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} cached document(s) from {}",
        entries.len(),
        cache.dir().display()
    );

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    cache.clear().await?;
    println!("{} cleared {} document(s)", style("✓").green(), entries.len());
    Ok(())
}

async fn clear_stale(cache: &CacheStore) -> CatalogResult<()> {
    let removed = cache.clear_stale().await?;
    println!("{} removed {} stale document(s)", style("✓").green(), removed);
    Ok(())
}

/// Re-fetch stale documents in the foreground, under the fetch ceiling
async fn refresh_stale(orchestrator: &FetchOrchestrator) -> CatalogResult<()> {
    let urls = orchestrator.cache().stale_urls().await?;
    if urls.is_empty() {
        println!("No stale documents.");
        return Ok(());
    }

    print!("Refreshing {} document(s)... ", urls.len());
    let _ = io::stdout().flush();

    let results = orchestrator.refresh_urls(&urls).await;
    let mut failed = Vec::new();
    for (url, result) in urls.iter().zip(results) {
        if let Err(e) = result {
            debug!("Refresh of {} failed: {}", url, e);
            failed.push((url, e));
        }
    }

    println!(
        "{} refreshed {} document(s)",
        style("✓").green(),
        urls.len() - failed.len()
    );
    for (url, e) in &failed {
        println!("  {} {}: {}", style("✗").red(), url, e);
    }
    Ok(())
}
