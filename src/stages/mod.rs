pub mod analyze;
pub mod bootstrap;
pub mod indexes;
pub mod ingest;
pub mod preflight;
