pub mod autofix;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod evolution;
pub mod exoskeleton;
pub mod expr;
pub mod io;
pub mod paths;
pub mod report;
pub mod rule;
pub mod runner;
pub mod spec;
pub mod telemetry;
pub mod templates;
pub mod types;
pub mod value;

pub use error::{DodError, Result};
