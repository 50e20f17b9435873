// src/cli/init.rs — First-time setup

use crate::infra::config::Config;
use crate::infra::paths;
use crate::memory::Store;

/// Write a default config (unless one exists) and create the database.
pub async fn run_init() -> anyhow::Result<()> {
    println!("archer setup");
    println!();

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config: {} (already exists)", config_path.display());
    } else {
        eprint!("  Writing default config... ");
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&config_path, default_config_toml()?).await?;
        eprintln!("done");
        println!("  Config: {}", config_path.display());
    }

    let config = Config::load_from(&config_path)?;
    let db_path = config.storage.resolved_db_path();
    eprint!("  Initializing database... ");
    Store::open(&db_path)?;
    eprintln!("done");
    println!("  Database: {}", db_path.display());

    println!();
    println!("Setup complete!");
    println!();
    println!("  Set {} and run:", config.provider.api_key_env);
    println!("    archer train -p \"Summarize the text.\" -i \"...\"");
    Ok(())
}

pub fn default_config_toml() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&Config::default())?)
}
