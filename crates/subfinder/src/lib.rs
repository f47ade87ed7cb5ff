pub mod aggregator;
pub mod config;
pub mod dns;
mod error;
pub mod http;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod sources;

pub use error::{Error, Result, SourceError};
