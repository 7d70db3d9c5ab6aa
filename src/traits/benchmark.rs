use std::path::{Path, PathBuf};

use crate::{
    application::RunConfig, errors::Error, stages::preflight::SizeModel, tasks::Task,
};

/// What a benchmark has to provide to be prepared by the pipeline.
///
/// The base directory must contain `schemas/<variant>/schema.sql`, plus the
/// optional `primary-keys.sql`, `foreign-keys.sql` and `indexes.sql`.
pub trait Benchmark: Send + Sync {
    fn name(&self) -> &str;

    fn base_dir(&self) -> &Path;

    /// Every table the benchmark loads, ANALYZEd after ingestion.
    fn tables(&self) -> &[String];

    fn size_model(&self) -> &SizeModel;

    /// The ingestion tasks for a single table, possibly none.
    ///
    /// Tasks returned for different tables end up in the same batch, so they
    /// must not depend on one another.
    fn ingest_tasks(
        &self,
        table: &str,
        config: &RunConfig,
    ) -> Result<Vec<Task>, Error>;
}

/// Identifies the benchmark and schema variant being prepared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkDescriptor {
    pub name: String,
    pub base_dir: PathBuf,
    pub schema: String,
}

impl BenchmarkDescriptor {
    pub fn new(
        benchmark: &dyn Benchmark,
        schema: &str,
    ) -> Self {
        Self {
            name: benchmark.name().to_string(),
            base_dir: benchmark.base_dir().to_path_buf(),
            schema: schema.to_string(),
        }
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.base_dir.join("schemas").join(&self.schema)
    }
}
