use futures::future::BoxFuture;
use sqlx::{Connection, Executor, PgConnection};

use crate::{application::Dsn, errors::Error};

/// Which database on the server a statement group runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// The server's default administrative database.
    Admin,
    /// The database named in the DSN.
    Target,
}

/// Executes statement groups, each on its own short-lived connection.
///
/// A connection is acquired, used for exactly one group, and released -
/// never held across stages or shared between concurrent work.
pub trait Database: Send + Sync {
    fn execute<'a>(
        &'a self,
        target: ConnectionTarget,
        statements: &'a [String],
    ) -> BoxFuture<'a, Result<(), Error>>;
}

#[derive(Clone, Debug)]
pub struct PostgresDatabase {
    dsn: Dsn,
}

impl PostgresDatabase {
    pub fn new(dsn: Dsn) -> Self {
        Self {
            dsn,
        }
    }

    fn url_for(
        &self,
        target: ConnectionTarget,
    ) -> String {
        match target {
            ConnectionTarget::Admin => self.dsn.admin_url(),
            ConnectionTarget::Target => self.dsn.url().to_string(),
        }
    }

    async fn run(
        &self,
        target: ConnectionTarget,
        statements: &[String],
    ) -> Result<(), Error> {
        let url = self.url_for(target);
        let mut conn = PgConnection::connect(&url).await.map_err(|err| {
            Error::database(format!("Unable to obtain connection to {target:?} database"), err)
        })?;

        // Run the group before closing so a failed statement still releases the connection.
        let result = run_statements(&mut conn, statements).await;
        if let Err(err) = conn.close().await {
            log::warn!("[DATABASE] Failed to close connection cleanly: {err}");
        }
        result
    }
}

async fn run_statements(
    conn: &mut PgConnection,
    statements: &[String],
) -> Result<(), Error> {
    for sql in statements {
        log::debug!("[DATABASE] Executing: {}", preview(sql));
        // No bind arguments: sent over the simple query protocol, so a whole
        // file of statements goes through in one round trip.
        (&mut *conn)
            .execute(sql.as_str())
            .await
            .map_err(|err| Error::database(format!("Failed executing `{}`", preview(sql)), err))?;
    }
    Ok(())
}

fn preview(sql: &str) -> String {
    const MAX: usize = 80;
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX {
        format!("{}...", flat.chars().take(MAX).collect::<String>())
    } else {
        flat
    }
}

impl Database for PostgresDatabase {
    fn execute<'a>(
        &'a self,
        target: ConnectionTarget,
        statements: &'a [String],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.run(target, statements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_and_target_urls() {
        let db = PostgresDatabase::new(Dsn::parse("postgres://u:p@db:5432/bench").unwrap());
        assert_eq!(db.url_for(ConnectionTarget::Admin), "postgres://u:p@db:5432/postgres");
        assert_eq!(db.url_for(ConnectionTarget::Target), "postgres://u:p@db:5432/bench");
    }

    #[test]
    fn long_statements_are_shortened_for_logs() {
        let sql = format!("CREATE TABLE t (\n  {}\n)", "x int, ".repeat(40));
        let shown = preview(&sql);
        assert!(shown.ends_with("..."));
        assert!(!shown.contains('\n'));
        assert_eq!(preview("VACUUM"), "VACUUM");
    }
}
