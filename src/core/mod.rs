// src/core/mod.rs — Training loop and the pieces it drives

pub mod archer;
pub mod circuit_breaker;
pub mod deadline;
pub mod generator;
pub mod model;
pub mod prompt;
pub mod tracker;
pub mod types;
pub mod validation;

pub use archer::Archer;
