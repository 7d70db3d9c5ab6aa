use std::path::{Path, PathBuf};

use crate::{
    database::{ConnectionTarget, Database},
    errors::Error,
};

/// Applied in this order; each is optional.
pub const INDEX_FILES: [&str; 3] = ["primary-keys.sql", "foreign-keys.sql", "indexes.sql"];

/// Applies whichever of [INDEX_FILES] exist, one connection per file.
/// Returns the files that were actually applied.
pub async fn add_indexes(
    database: &dyn Database,
    schema_dir: &Path,
) -> Result<Vec<PathBuf>, Error> {
    let mut applied = Vec::new();
    for sql_file in INDEX_FILES {
        let path = schema_dir.join(sql_file);
        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            log::debug!("Skipping {}, not present", path.display());
            continue;
        }

        let sql = tokio::fs::read_to_string(&path).await.map_err(|err| Error::io(&path, err))?;
        if sql.trim().is_empty() {
            log::debug!("Skipping {}, empty", path.display());
            continue;
        }

        log::info!("Applying {}", path.display());
        database.execute(ConnectionTarget::Target, &[sql]).await?;
        applied.push(path);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        fail_on: Option<&'static str>,
        applied: Mutex<Vec<String>>,
    }

    impl Database for Recorder {
        fn execute<'a>(
            &'a self,
            _target: ConnectionTarget,
            statements: &'a [String],
        ) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async move {
                let sql = statements.join(";");
                if self.fail_on.is_some_and(|f| sql.contains(f)) {
                    return Err(Error::database("Failed executing", sqlx::Error::RowNotFound));
                }
                self.applied.lock().unwrap().push(sql);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("primary-keys.sql"), "ALTER TABLE a ADD PRIMARY KEY (id);")
            .unwrap();
        std::fs::write(dir.path().join("indexes.sql"), "CREATE INDEX ON a (x);").unwrap();
        let db = Recorder::default();

        let applied = add_indexes(&db, dir.path()).await.unwrap();
        assert_eq!(
            applied,
            vec![dir.path().join("primary-keys.sql"), dir.path().join("indexes.sql")]
        );
        assert_eq!(
            *db.applied.lock().unwrap(),
            vec!["ALTER TABLE a ADD PRIMARY KEY (id);", "CREATE INDEX ON a (x);"]
        );
    }

    #[tokio::test]
    async fn whitespace_only_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foreign-keys.sql"), "  \n\t\n").unwrap();
        let db = Recorder::default();
        assert!(add_indexes(&db, dir.path()).await.unwrap().is_empty());
        assert!(db.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sql_error_stops_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        for file in INDEX_FILES {
            std::fs::write(dir.path().join(file), format!("-- {file}")).unwrap();
        }
        let db = Recorder {
            fail_on: Some("foreign-keys"),
            ..Default::default()
        };
        let err = add_indexes(&db, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
        // indexes.sql never ran.
        assert_eq!(*db.applied.lock().unwrap(), vec!["-- primary-keys.sql"]);
    }
}
