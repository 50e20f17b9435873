// src/cli/mod.rs — CLI definition (clap derive)

pub mod config;
pub mod init;
pub mod train;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::types::ExpansionMode;

#[derive(Parser)]
#[command(name = "archer", about = "Evolutionary prompt optimization", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Debug-level logs with module targets
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evolve a prompt population against the given inputs
    Train(TrainArgs),
    /// Print the effective configuration as TOML
    Config,
    /// Write a default config file and create the database
    Init,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TrainArgs {
    /// Seed prompt (repeatable)
    #[arg(short, long = "prompt")]
    pub prompts: Vec<String>,

    /// File of seed prompts separated by blank lines
    #[arg(long)]
    pub prompts_file: Option<String>,

    /// Value for the `input` field (repeatable)
    #[arg(short, long = "input")]
    pub inputs: Vec<String>,

    /// Extra template field as name=value (repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// How multi-valued fields combine into rows
    #[arg(long, value_enum, default_value = "parallel")]
    pub mode: ModeArg,

    /// Forward/backward cycles to run
    #[arg(short = 'n', long, default_value = "3")]
    pub cycles: usize,

    /// Skip the SQLite store even if enabled in config
    #[arg(long)]
    pub no_store: bool,

    /// Write per-generation scores as JSON to this path
    #[arg(long)]
    pub history: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Parallel,
    Combinatorial,
}

impl From<ModeArg> for ExpansionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Parallel => ExpansionMode::Parallel,
            ModeArg::Combinatorial => ExpansionMode::Combinatorial,
        }
    }
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty field name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
