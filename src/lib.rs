pub mod application;
pub mod database;
pub mod errors;
pub mod extras;
pub mod stages;
pub mod tasks;
pub mod traits;

pub use errors::{Error, Result, TaskError};
