use std::{fmt::Display, path::PathBuf, sync::Arc, time::Instant};

use chrono::Utc;

use crate::{
    database::{Database, PostgresDatabase},
    errors::Error,
    stages::{
        analyze, bootstrap, indexes, ingest,
        preflight::{
            DiskSpacePreflight, DiskSpaceProbe, KindAliases, PreflightOutcome, StatvfsProbe,
        },
    },
    tasks::{
        launcher::{ShellLauncher, TaskLauncher},
        runner::ParallelTaskRunner,
    },
    traits::{Benchmark, BenchmarkDescriptor},
};

use super::{
    stats::{RunResult, StageOutcome, StageReport},
    RunConfig,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Preflight,
    Bootstrap,
    Ingest,
    Index,
    Analyze,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        Self::Preflight,
        Self::Bootstrap,
        Self::Ingest,
        Self::Index,
        Self::Analyze,
    ];

    /// The state the pipeline is in once this stage has passed.
    pub fn completed_state(self) -> PipelineState {
        match self {
            Self::Preflight => PipelineState::PreflightChecked,
            Self::Bootstrap => PipelineState::Bootstrapped,
            Self::Ingest => PipelineState::Ingested,
            Self::Index => PipelineState::Indexed,
            Self::Analyze => PipelineState::Analyzed,
        }
    }

    fn progress_message(self) -> &'static str {
        match self {
            Self::Preflight => "Checking disk space",
            Self::Bootstrap => "Preparing DB",
            Self::Ingest => "Ingesting data",
            Self::Index => "Adding indices",
            Self::Analyze => "VACUUM-ANALYZE",
        }
    }
}

impl Display for PipelineStage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// `Analyzed` and `Failed` are terminal. There is no resume: a failed run is
/// restarted from the top.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    NotStarted,
    PreflightChecked,
    Bootstrapped,
    Ingested,
    Indexed,
    Analyzed,
    Failed(PipelineStage),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed(_))
    }
}

/// Callbacks around each stage, for progress output or a live dashboard.
pub trait StageObserver: Send + Sync {
    fn stage_started(
        &self,
        _stage: PipelineStage,
    ) {
    }

    fn stage_finished(
        &self,
        _report: &StageReport,
    ) {
    }
}

/// Logs stage progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn stage_started(
        &self,
        stage: PipelineStage,
    ) {
        log::info!("{}", stage.progress_message());
    }

    fn stage_finished(
        &self,
        report: &StageReport,
    ) {
        match report.outcome {
            StageOutcome::Passed => {
                log::info!("{} finished in {:.2?}", report.stage, report.elapsed)
            },
            StageOutcome::Failed => {
                log::error!("{} failed after {:.2?}", report.stage, report.elapsed)
            },
        }
    }
}

pub struct PipelineBuilder {
    benchmark: Arc<dyn Benchmark>,
    config: RunConfig,
    schema: String,
    database: Option<Arc<dyn Database>>,
    launcher: Option<Arc<dyn TaskLauncher>>,
    probe: Option<Box<dyn DiskSpaceProbe>>,
    aliases: KindAliases,
    observer: Option<Box<dyn StageObserver>>,
}

impl PipelineBuilder {
    pub fn with_database(
        mut self,
        database: Arc<dyn Database>,
    ) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_launcher(
        mut self,
        launcher: Arc<dyn TaskLauncher>,
    ) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_disk_probe(
        mut self,
        probe: impl DiskSpaceProbe + 'static,
    ) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn with_kind_aliases(
        mut self,
        aliases: KindAliases,
    ) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_observer(
        mut self,
        observer: impl StageObserver + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Fails if the schema directory does not exist - that's a configuration
    /// problem, not a pipeline failure.
    pub fn build(self) -> Result<Pipeline, Error> {
        let descriptor = BenchmarkDescriptor::new(self.benchmark.as_ref(), &self.schema);
        let schema_dir = descriptor.schema_dir();
        if !schema_dir.is_dir() {
            return Err(Error::config(format!(
                "Schema `{}` does not exist ({})",
                descriptor.schema,
                schema_dir.display()
            )));
        }

        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(ShellLauncher::default()) as Arc<dyn TaskLauncher>);
        let runner = ParallelTaskRunner::new(self.config.max_workers(), launcher)?;
        let database = self.database.unwrap_or_else(|| {
            Arc::new(PostgresDatabase::new(self.config.dsn().clone())) as Arc<dyn Database>
        });

        Ok(Pipeline {
            descriptor,
            schema_dir,
            benchmark: self.benchmark,
            config: self.config,
            database,
            runner,
            probe: self.probe.unwrap_or_else(|| Box::new(StatvfsProbe) as Box<dyn DiskSpaceProbe>),
            aliases: self.aliases,
            observer: self
                .observer
                .unwrap_or_else(|| Box::new(LogObserver) as Box<dyn StageObserver>),
            state: PipelineState::NotStarted,
            reports: Vec::new(),
        })
    }
}

/// Drives the stages strictly in order, stopping at the first failure.
pub struct Pipeline {
    descriptor: BenchmarkDescriptor,
    schema_dir: PathBuf,
    benchmark: Arc<dyn Benchmark>,
    config: RunConfig,
    database: Arc<dyn Database>,
    runner: ParallelTaskRunner,
    probe: Box<dyn DiskSpaceProbe>,
    aliases: KindAliases,
    observer: Box<dyn StageObserver>,
    state: PipelineState,
    reports: Vec<StageReport>,
}

impl Pipeline {
    pub fn builder(
        benchmark: Arc<dyn Benchmark>,
        config: RunConfig,
        schema: &str,
    ) -> PipelineBuilder {
        PipelineBuilder {
            benchmark,
            config,
            schema: schema.to_string(),
            database: None,
            launcher: None,
            probe: None,
            aliases: KindAliases::default(),
            observer: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn descriptor(&self) -> &BenchmarkDescriptor {
        &self.descriptor
    }

    /// Reports for the stages that ran so far, including a failed one.
    pub fn stage_reports(&self) -> &[StageReport] {
        &self.reports
    }

    fn print_welcome_message(&self) {
        let BenchmarkDescriptor {
            name,
            schema,
            ..
        } = &self.descriptor;
        log::info!(
            r#"
=============================================
   Preparing benchmark {name} (schema {schema})
=============================================
"#,
        );
        log::debug!("RUN CONFIGURATION: {:?}", &self.config);
    }

    /// Runs every stage once. A pipeline cannot be run a second time; build a
    /// new one to start over.
    pub async fn run(&mut self) -> Result<RunResult, Error> {
        if self.state != PipelineState::NotStarted {
            return Err(Error::config(format!("Pipeline already ran (state: {:?})", self.state)));
        }
        self.print_welcome_message();

        for stage in PipelineStage::ALL {
            self.run_stage(stage).await?;
        }

        Ok(RunResult {
            stages: self.reports.clone(),
            final_state: self.state,
        })
    }

    async fn run_stage(
        &mut self,
        stage: PipelineStage,
    ) -> Result<(), Error> {
        self.observer.stage_started(stage);
        let started_at = Utc::now();
        let timer = Instant::now();

        let result = self.execute(stage).await;

        let report = StageReport {
            stage,
            started_at,
            elapsed: timer.elapsed(),
            outcome: if result.is_ok() {
                StageOutcome::Passed
            } else {
                StageOutcome::Failed
            },
        };
        self.observer.stage_finished(&report);
        self.reports.push(report);

        match result {
            Ok(()) => {
                self.state = stage.completed_state();
                Ok(())
            },
            Err(err) => {
                self.state = PipelineState::Failed(stage);
                let err = err.in_stage(stage);
                log::error!("{err}");
                Err(err)
            },
        }
    }

    async fn execute(
        &self,
        stage: PipelineStage,
    ) -> Result<(), Error> {
        match stage {
            PipelineStage::Preflight => self.check_diskspace(),
            PipelineStage::Bootstrap => {
                bootstrap::prepare_db(self.database.as_ref(), self.config.dsn(), &self.schema_dir)
                    .await
            },
            PipelineStage::Ingest => {
                ingest::ingest(self.benchmark.as_ref(), &self.config, &self.runner).await
            },
            PipelineStage::Index => {
                let applied = indexes::add_indexes(self.database.as_ref(), &self.schema_dir).await?;
                log::debug!("Applied {} index/constraint files", applied.len());
                Ok(())
            },
            PipelineStage::Analyze => {
                analyze::vacuum_analyze(
                    &self.runner,
                    self.config.dsn(),
                    self.benchmark.tables(),
                    &self.descriptor.base_dir,
                )
                .await
            },
        }
    }

    fn check_diskspace(&self) -> Result<(), Error> {
        let Some(check_dir) = self.config.diskspace_check_dir() else {
            log::debug!("[PREFLIGHT] No directory given, not checking disk space");
            return Ok(());
        };
        let preflight = DiskSpacePreflight {
            size_model: self.benchmark.size_model(),
            aliases: &self.aliases,
            probe: self.probe.as_ref(),
        };
        match preflight.check(
            &self.descriptor.name,
            &self.schema_dir,
            self.config.scale_factor(),
            check_dir,
        )? {
            PreflightOutcome::Passed {
                needed,
                free,
            } => log::info!("[PREFLIGHT] OK. Needed [Bytes]: {needed}, free: {free}"),
            PreflightOutcome::Skipped {
                kind,
            } => log::debug!("[PREFLIGHT] Skipped for database type {kind}"),
        }
        Ok(())
    }
}
