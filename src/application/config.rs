use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

use crate::errors::Error;

macro_rules! const_from_env {
    ($fn_name:ident, $name:ident: $ty:ty = $val:expr) => {
        pub fn $fn_name() -> $ty {
            std::env::var(stringify!($name)).ok().and_then(|s| s.parse().ok()).unwrap_or_else(|| $val.into())
        }
    };
}

/// Constants that can be overridden by setting the corresponding ENV variable.
pub struct ConfigConstants;
impl ConfigConstants {
    const_from_env!(shell, PREPARE_SHELL: String = "/bin/bash");
    const_from_env!(admin_database, PREPARE_ADMIN_DATABASE: String = "postgres");
    const_from_env!(psql, PREPARE_PSQL: String = "psql");
}

/// A `scheme://host[:port]/dbname` connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dsn {
    url: String,
    scheme: String,
    netloc: String,
    dbname: String,
    query: String,
}

fn dsn_regex() -> &'static Regex {
    static DSN: OnceLock<Regex> = OnceLock::new();
    DSN.get_or_init(|| {
        Regex::new(
            r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<netloc>[^/?#]*)/(?P<dbname>[^/?#]+)(?P<query>[?#].*)?$",
        )
        .expect("DSN pattern should compile")
    })
}

impl Dsn {
    pub fn parse(url: &str) -> Result<Self, Error> {
        let caps = dsn_regex().captures(url.trim()).ok_or_else(|| {
            Error::config(format!("DSN `{url}` is not of the form scheme://host[:port]/dbname"))
        })?;
        let part = |name: &str| caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default();
        Ok(Self {
            url: url.trim().to_string(),
            scheme: part("scheme"),
            netloc: part("netloc"),
            dbname: part("dbname"),
            query: part("query"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    /// Same server, with the path swapped for the administrative database.
    pub fn admin_url(&self) -> String {
        format!(
            "{}://{}/{}{}",
            self.scheme,
            self.netloc,
            ConfigConstants::admin_database(),
            self.query
        )
    }

    /// The database name as a quoted SQL identifier.
    pub fn quoted_dbname(&self) -> String {
        format!("\"{}\"", self.dbname.replace('"', "\"\""))
    }
}

impl Display for Dsn {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Everything a run needs besides the benchmark itself. Immutable once built.
#[derive(Clone, Debug)]
pub struct RunConfig {
    scale_factor: u32,
    dsn: Dsn,
    max_workers: usize,
    diskspace_check_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(
        scale_factor: u32,
        dsn: Dsn,
        max_workers: usize,
    ) -> Result<Self, Error> {
        if scale_factor == 0 {
            return Err(Error::config("scale factor must be a positive integer"));
        }
        if max_workers == 0 {
            return Err(Error::config("max workers must be at least 1"));
        }
        Ok(Self {
            scale_factor,
            dsn,
            max_workers,
            diskspace_check_dir: None,
        })
    }

    pub fn with_diskspace_check(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.diskspace_check_dir = Some(dir.into());
        self
    }

    pub fn scale_factor(&self) -> u32 {
        self.scale_factor
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn diskspace_check_dir(&self) -> Option<&Path> {
        self.diskspace_check_dir.as_deref()
    }
}
