use crate::{
    application::RunConfig,
    errors::Error,
    tasks::{runner::ParallelTaskRunner, Task},
    traits::Benchmark,
};

/// Asks the benchmark for every table's tasks and flattens them into one
/// batch, so parallelism spans tables. Any error here happens before a single
/// task is dispatched.
pub fn collect_ingest_tasks(
    benchmark: &dyn Benchmark,
    config: &RunConfig,
) -> Result<Vec<Task>, Error> {
    let mut ingest_tasks = Vec::new();
    for table in benchmark.tables() {
        let tasks = benchmark.ingest_tasks(table, config)?;
        log::debug!("{} ingest tasks for table {table}", tasks.len());
        ingest_tasks.extend(tasks);
    }
    Ok(ingest_tasks)
}

pub async fn ingest(
    benchmark: &dyn Benchmark,
    config: &RunConfig,
    runner: &ParallelTaskRunner,
) -> Result<(), Error> {
    let tasks = collect_ingest_tasks(benchmark, config)?;
    log::info!("Dispatching {} ingest tasks across {} workers", tasks.len(), runner.max_workers());
    runner.run_batch(tasks).await.into_result()
}
