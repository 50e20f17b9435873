// src/lib.rs — Library root for Archer

pub mod cli;
pub mod core;
pub mod evaluator;
pub mod infra;
pub mod knowledge;
pub mod memory;
pub mod optimizer;
pub mod provider;
pub mod util;
