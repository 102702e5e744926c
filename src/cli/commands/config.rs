//! Config command - show or edit configuration

use console::style;

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::StratusResult;

/// Execute the config command
pub async fn config(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> StratusResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> StratusResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> StratusResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} config already exists at {} (use --force to overwrite)",
            style("Skipped:").yellow().bold(),
            path.display()
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} wrote {}",
        style("Initialized:").green().bold(),
        path.display()
    );
    Ok(())
}
