//! Cache command - inspect the persistent asset store

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::FlagResult;
use crate::key::ResourceKey;
use crate::store::{AssetStore, CacheEntry, FileStore, StoreOptions};
use chrono::{DateTime, Utc};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config, store_dir: &Path) -> FlagResult<()> {
    debug!("Using store at {}", store_dir.display());
    let backend = Arc::new(FileStore::new(store_dir));
    let store = AssetStore::load(backend, StoreOptions::from(&config.cache)).await;

    let result = match args.action {
        CacheAction::List { format } => list_entries(&store, format),
        CacheAction::Prune => prune(&store),
    };

    // Loading may have scheduled a rewrite of the pruned record
    store.flush().await;
    result
}

/// List persisted assets
fn list_entries(store: &AssetStore, format: OutputFormat) -> FlagResult<()> {
    let entries = store.entries();

    if entries.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No cached assets found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => print_entry_plain(&entries),
    }

    Ok(())
}

fn print_entry_table(entries: &[(ResourceKey, CacheEntry)]) {
    let now = Utc::now();

    println!("{:<24} {:<6} {:>10} {:<20}", "KEY", "FLAG", "SIZE", "CACHED");
    println!("{}", "-".repeat(64));

    for (key, entry) in entries {
        let flag = flag_glyph(key).unwrap_or_default();
        let cached = entry
            .created_at()
            .map(|at| format!("{} ({})", at.format("%Y-%m-%d %H:%M"), age(now, at)))
            .unwrap_or_else(|| style("unknown").dim().to_string());

        println!(
            "{:<24} {:<6} {:>10} {:<20}",
            key.as_str(),
            flag,
            entry.data.len(),
            cached
        );
    }

    println!();
    println!("Total: {} asset(s)", entries.len());
}

fn print_entry_json(entries: &[(ResourceKey, CacheEntry)]) -> FlagResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        key: &'a str,
        size: usize,
        timestamp: i64,
        cached_at: Option<String>,
    }

    let json_entries: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|(key, entry)| EntryJson {
            key: key.as_str(),
            size: entry.data.len(),
            timestamp: entry.timestamp,
            cached_at: entry.created_at().map(|at| at.to_rfc3339()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

fn print_entry_plain(entries: &[(ResourceKey, CacheEntry)]) {
    for (key, _) in entries {
        println!("{}", key);
    }
}

/// Report what survived; expired entries were dropped on load
fn prune(store: &AssetStore) -> FlagResult<()> {
    println!(
        "{} {} fresh asset(s) kept",
        style("✓").green(),
        store.len()
    );
    Ok(())
}

/// Render a flag key back into its glyph
fn flag_glyph(key: &ResourceKey) -> Option<String> {
    if !key.is_flag() {
        return None;
    }
    key.code_points()?
        .into_iter()
        .map(char::from_u32)
        .collect()
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    if elapsed.num_days() > 0 {
        format!("{}d ago", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}m ago", elapsed.num_minutes().max(0))
    }
}
