mod config;
pub use config::*;
mod pipeline;
pub use pipeline::*;
pub mod stats;
