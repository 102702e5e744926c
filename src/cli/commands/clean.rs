//! Clean command - age-based sweep of the local stage

use std::time::Duration;

use console::style;

use crate::cli::args::CleanArgs;
use crate::config::Config;
use crate::error::{StratusError, StratusResult};
use crate::stage::Stage;

/// Execute the clean command
pub async fn clean(args: CleanArgs, config: &Config) -> StratusResult<()> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config.cache.local_dir.clone());
    if dir.as_os_str().is_empty() {
        return Err(StratusError::ConfigMissing("cache.local_dir"));
    }

    let days = args.max_age_days.unwrap_or(config.cache.expiration_days);
    if days == 0 {
        return Err(StratusError::ConfigMissing(
            "cache.expiration_days (or --max-age-days)",
        ));
    }

    let stage = Stage::new(&dir).await?;
    let removed = stage
        .cleanup(Duration::from_secs(u64::from(days) * 24 * 3600))
        .await?;

    println!(
        "{} removed {} file(s) older than {} day(s) from {}",
        style("Clean:").green().bold(),
        removed,
        days,
        dir.display()
    );
    Ok(())
}
