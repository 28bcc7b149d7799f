//! Module for writing a starter configuration.

use super::*;

/// Function for the [`Commands::Init`] in the CLI.
pub async fn init(cli: &Cli) -> Result<()> {
  let path = cli.config_path();

  if path.exists() {
    println!(
      "{} Configuration found at: {}",
      style(WARNING_PREFIX).yellow(),
      style(path.display()).yellow()
    );
    if !cli.accept_defaults
      && !dialoguer::Confirm::new()
        .with_prompt("Overwrite it with the starter configuration?")
        .default(false)
        .interact()?
    {
      println!("{} Operation cancelled", style(INFO_PREFIX).cyan());
      return Ok(());
    }
  }

  let config = Config::starter();
  if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(&path, config.to_toml_string()?).await?;
  info!("Wrote starter configuration to {}", path.display());

  println!(
    "{} Wrote configuration to {}",
    style(SUCCESS_PREFIX).green(),
    style(path.display()).yellow()
  );
  println!(
    "{} Export your analysis API key as {} before running",
    style(INFO_PREFIX).cyan(),
    style(&config.analysis.api_key_env).bold()
  );
  Ok(())
}
