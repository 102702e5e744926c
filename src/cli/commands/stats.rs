//! Stats command - report local stage usage

use console::style;

use crate::cli::args::StatsArgs;
use crate::config::Config;
use crate::error::{StratusError, StratusResult};
use crate::stage::Stage;

/// Format bytes as a human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Execute the stats command
pub async fn stats(args: StatsArgs, config: &Config) -> StratusResult<()> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config.cache.local_dir.clone());
    if dir.as_os_str().is_empty() {
        return Err(StratusError::ConfigMissing("cache.local_dir"));
    }

    let stage = Stage::new(&dir).await?;
    let usage = stage.usage().await?;

    if args.json {
        let report = serde_json::json!({
            "dir": dir.display().to_string(),
            "files": usage.files,
            "bytes": usage.bytes,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", style("Stage:").cyan().bold(), dir.display());
        println!("  files: {}", usage.files);
        println!("  size:  {}", format_bytes(usage.bytes));
    }
    Ok(())
}
