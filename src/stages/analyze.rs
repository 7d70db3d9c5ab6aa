use std::path::Path;

use crate::{
    application::{ConfigConstants, Dsn},
    errors::Error,
    tasks::{runner::ParallelTaskRunner, shell_quote, Task},
};

pub fn vacuum_task(
    dsn: &Dsn,
    working_dir: &Path,
) -> Task {
    Task::new(
        format!("{} {} -c \"VACUUM\"", ConfigConstants::psql(), shell_quote(dsn.url())),
        working_dir,
    )
}

pub fn analyze_tasks(
    dsn: &Dsn,
    tables: &[String],
    working_dir: &Path,
) -> Vec<Task> {
    tables
        .iter()
        .map(|table| {
            Task::new(
                format!(
                    "{} {} -c \"ANALYZE {table}\"",
                    ConfigConstants::psql(),
                    shell_quote(dsn.url())
                ),
                working_dir,
            )
        })
        .collect()
}

/// One database-wide VACUUM, then a parallel ANALYZE per table.
pub async fn vacuum_analyze(
    runner: &ParallelTaskRunner,
    dsn: &Dsn,
    tables: &[String],
    working_dir: &Path,
) -> Result<(), Error> {
    runner.run_task(&vacuum_task(dsn, working_dir)).await?;
    runner.run_batch(analyze_tasks(dsn, tables, working_dir)).await.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_analyze_per_table() {
        let dsn = Dsn::parse("postgres://localhost/bench").unwrap();
        let tables = vec!["warehouse".to_string(), "orders".to_string()];
        let tasks = analyze_tasks(&dsn, &tables, Path::new("/bench"));
        let commands: Vec<_> = tasks.iter().map(|t| t.command()).collect();
        assert_eq!(
            commands,
            vec![
                "psql 'postgres://localhost/bench' -c \"ANALYZE warehouse\"",
                "psql 'postgres://localhost/bench' -c \"ANALYZE orders\"",
            ]
        );
        assert!(tasks.iter().all(|t| t.working_dir() == Path::new("/bench")));
    }

    #[test]
    fn vacuum_is_database_wide() {
        let dsn = Dsn::parse("postgres://localhost/bench").unwrap();
        let task = vacuum_task(&dsn, Path::new("/bench"));
        assert_eq!(task.command(), "psql 'postgres://localhost/bench' -c \"VACUUM\"");
    }
}
