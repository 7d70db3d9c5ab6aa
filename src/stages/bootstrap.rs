use std::path::Path;

use crate::{
    application::Dsn,
    database::{ConnectionTarget, Database},
    errors::Error,
};

pub const SCHEMA_FILE: &str = "schema.sql";

/// Drops and recreates the target database, then loads `schema.sql` into it.
///
/// The drop is guarded with `IF EXISTS`, so a failed earlier attempt can simply
/// be re-run. A half-created database is never repaired in place.
pub async fn prepare_db(
    database: &dyn Database,
    dsn: &Dsn,
    schema_dir: &Path,
) -> Result<(), Error> {
    // Read up front: a missing schema file should not cost the existing database.
    let schema_path = schema_dir.join(SCHEMA_FILE);
    let schema = tokio::fs::read_to_string(&schema_path)
        .await
        .map_err(|err| Error::io(&schema_path, err))?;

    let dbname = dsn.quoted_dbname();
    log::info!("[DATABASE] Deleting {}", dsn.dbname());
    log::info!("[DATABASE] Creating {}", dsn.dbname());
    database
        .execute(
            ConnectionTarget::Admin,
            &[
                format!("DROP DATABASE IF EXISTS {dbname}"),
                format!("CREATE DATABASE {dbname} TEMPLATE template0 ENCODING 'UTF-8'"),
            ],
        )
        .await?;

    log::info!("[DATABASE] Loading schema from {}", schema_path.display());
    database.execute(ConnectionTarget::Target, &[schema]).await
}
