// src/cli/config.rs — Show the effective configuration

use crate::infra::config::Config;

pub fn show_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
