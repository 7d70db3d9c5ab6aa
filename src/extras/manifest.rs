use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    application::RunConfig,
    errors::Error,
    stages::preflight::{KindAliases, SizeModel},
    tasks::Task,
    traits::Benchmark,
};

pub const MANIFEST_FILE: &str = "benchmark.json";

#[derive(Deserialize)]
struct Manifest {
    name: String,
    tables: Vec<String>,
    #[serde(default)]
    size_model: SizeModel,
    #[serde(default)]
    kind_aliases: Option<KindAliases>,
    /// Kept loose on purpose: a table whose entry isn't a list of strings is
    /// only rejected when its tasks are requested.
    #[serde(default)]
    ingest: HashMap<String, Value>,
}

/// A [Benchmark] described by a `benchmark.json` in its base directory.
///
/// ```json
/// {
///   "name": "htap",
///   "tables": ["warehouse", "orders"],
///   "size_model": { "postgres": { "10": 2.5 } },
///   "ingest": { "orders": ["./load.sh orders {scale_factor} '{dsn}'"] }
/// }
/// ```
///
/// Command templates may use `{dsn}`, `{scale_factor}`, `{table}` and `{max_jobs}`.
#[derive(Debug)]
pub struct ManifestBenchmark {
    base_dir: PathBuf,
    name: String,
    tables: Vec<String>,
    size_model: SizeModel,
    kind_aliases: Option<KindAliases>,
    ingest: HashMap<String, Value>,
}

impl ManifestBenchmark {
    pub fn load(base_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let base_dir = base_dir.into();
        let path = base_dir.join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?;
        Self::from_json(base_dir, &json)
    }

    pub fn from_json(
        base_dir: impl Into<PathBuf>,
        json: &str,
    ) -> Result<Self, Error> {
        let Manifest {
            name,
            tables,
            size_model,
            kind_aliases,
            ingest,
        } = serde_json::from_str(json)
            .map_err(|err| Error::config(format!("Invalid {MANIFEST_FILE}: {err}")))?;
        size_model.validate()?;
        Ok(Self {
            base_dir: base_dir.into(),
            name,
            tables,
            size_model,
            kind_aliases,
            ingest,
        })
    }

    /// The default aliases, extended with any the manifest declares.
    pub fn kind_aliases(&self) -> KindAliases {
        let mut aliases = KindAliases::default();
        if let Some(extra) = &self.kind_aliases {
            aliases.extend(extra.clone());
        }
        aliases
    }

    fn render(
        template: &str,
        table: &str,
        config: &RunConfig,
    ) -> String {
        template
            .replace("{dsn}", config.dsn().url())
            .replace("{scale_factor}", &config.scale_factor().to_string())
            .replace("{table}", table)
            .replace("{max_jobs}", &config.max_workers().to_string())
    }
}

impl Benchmark for ManifestBenchmark {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn tables(&self) -> &[String] {
        &self.tables
    }

    fn size_model(&self) -> &SizeModel {
        &self.size_model
    }

    fn ingest_tasks(
        &self,
        table: &str,
        config: &RunConfig,
    ) -> Result<Vec<Task>, Error> {
        let Some(entry) = self.ingest.get(table) else {
            return Ok(Vec::new());
        };
        let Value::Array(templates) = entry else {
            return Err(Error::config(format!(
                "Ingest entry for table `{table}` is not a list"
            )));
        };
        templates
            .iter()
            .map(|template| -> Result<Task, Error> {
                let template = template.as_str().ok_or_else(|| {
                    Error::config(format!("Ingest entry for table `{table}` contains a non-string"))
                })?;
                Ok(Task::new(Self::render(template, table, config), &self.base_dir))
            })
            .collect()
    }
}
