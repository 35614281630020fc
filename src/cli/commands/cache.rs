//! Cache command - inspect the module artifact cache

use crate::cache::{ArtifactCache, CacheEntryInfo, CacheState};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::ForgeResult;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ForgeResult<()> {
    let cache = ArtifactCache::new(ConfigManager::cache_dir(config));

    match args.action {
        CacheAction::List { board, format } => list_entries(cache, board, format).await,
        CacheAction::Path => {
            println!("{}", cache.root().display());
            Ok(())
        }
    }
}

async fn list_entries(
    cache: ArtifactCache,
    board: Option<String>,
    format: OutputFormat,
) -> ForgeResult<()> {
    let entries = tokio::task::spawn_blocking(move || cache.entries())
        .await
        .map_err(|e| crate::error::ForgeError::Internal(format!("cache scan failed: {}", e)))??;

    let entries: Vec<CacheEntryInfo> = entries
        .into_iter()
        .filter(|e| board.as_deref().map_or(true, |b| e.board == b))
        .collect();

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => print_entry_plain(&entries),
    }

    Ok(())
}

fn print_entry_table(entries: &[CacheEntryInfo]) {
    if entries.is_empty() {
        println!("No cache entries found.");
        return;
    }

    println!("{:<24} {:<32} {:<10}", "BOARD", "MODULE", "STATE");
    println!("{}", "-".repeat(66));

    for entry in entries {
        let state_display = match entry.state {
            CacheState::Complete => style("complete").green().to_string(),
            CacheState::Building => style("building").yellow().to_string(),
            CacheState::Miss => style("miss").dim().to_string(),
        };
        println!(
            "{:<24} {:<32} {:<10}",
            entry.board, entry.module, state_display
        );
    }

    let ready = entries.iter().filter(|e| e.state.is_usable()).count();
    println!();
    println!("Total: {} entr(ies), {} ready", entries.len(), ready);
}

fn print_entry_plain(entries: &[CacheEntryInfo]) {
    for entry in entries.iter().filter(|e| e.state.is_usable()) {
        println!("{}/{}", entry.board, entry.module);
    }
}
