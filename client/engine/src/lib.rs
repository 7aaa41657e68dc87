pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;
pub mod services;
pub mod store;
pub mod timer;

pub use commands::Command;
pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent};
pub use error::{EngineError, EngineResult};
