use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

const GIB: u64 = 1024 * 1024 * 1024;

/// Size multipliers (GB per scale-factor unit), keyed by database kind and
/// then by scale factor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeModel {
    factors: HashMap<String, HashMap<u32, f64>>,
}

impl SizeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factor(
        mut self,
        kind: &str,
        scale_factor: u32,
        multiplier: f64,
    ) -> Self {
        self.factors.entry(kind.to_string()).or_default().insert(scale_factor, multiplier);
        self
    }

    /// Multipliers must be finite and not negative.
    pub fn validate(&self) -> Result<(), Error> {
        for (kind, by_scale) in &self.factors {
            for (scale_factor, multiplier) in by_scale {
                if !multiplier.is_finite() || *multiplier < 0.0 {
                    return Err(Error::config(format!(
                        "Size factor for {kind} at scale factor {scale_factor} is invalid: {multiplier}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn multiplier(
        &self,
        kind: &str,
        scale_factor: u32,
    ) -> Option<f64> {
        self.factors.get(kind).and_then(|by_scale| by_scale.get(&scale_factor)).copied()
    }
}

/// Remaps schema-directory prefixes to the kind used in the [SizeModel].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindAliases {
    aliases: HashMap<String, String>,
}

impl Default for KindAliases {
    fn default() -> Self {
        Self {
            aliases: HashMap::from([("sdb".to_string(), "s64da".to_string())]),
        }
    }
}

impl KindAliases {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(
        mut self,
        prefix: &str,
        kind: &str,
    ) -> Self {
        self.aliases.insert(prefix.to_string(), kind.to_string());
        self
    }

    pub fn extend(
        &mut self,
        other: KindAliases,
    ) {
        self.aliases.extend(other.aliases);
    }

    /// The database kind for a schema directory: the part of its name before
    /// the first `_`, remapped through the alias table.
    pub fn kind_for(
        &self,
        schema_dir: &Path,
    ) -> String {
        let name = schema_dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let prefix = name.split('_').next().unwrap_or_default();
        self.aliases.get(prefix).cloned().unwrap_or_else(|| prefix.to_string())
    }
}

/// Reports free bytes available to unprivileged users at a path.
pub trait DiskSpaceProbe: Send + Sync {
    fn free_bytes(
        &self,
        path: &Path,
    ) -> Result<u64, Error>;
}

/// [DiskSpaceProbe] backed by `statvfs(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl DiskSpaceProbe for StatvfsProbe {
    #[allow(clippy::unnecessary_cast)]
    fn free_bytes(
        &self,
        path: &Path,
    ) -> Result<u64, Error> {
        use std::{ffi::CString, mem::MaybeUninit, os::unix::ffi::OsStrExt};

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::config(format!("{} contains a NUL byte", path.display())))?;
        let mut stat = MaybeUninit::<libc::statvfs>::zeroed();
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if rc != 0 {
            return Err(Error::io(path, std::io::Error::last_os_error()));
        }
        let stat = unsafe { stat.assume_init() };
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(not(unix))]
impl DiskSpaceProbe for StatvfsProbe {
    fn free_bytes(
        &self,
        path: &Path,
    ) -> Result<u64, Error> {
        Err(Error::config(format!(
            "Cannot check disk space of {} on this platform",
            path.display()
        )))
    }
}

/// Bytes needed for `scale_factor` units at `multiplier` GB each, rounded
/// down. Against a whole number of free bytes, `floor(x) >= free` holds
/// exactly when `x >= free`.
pub fn required_bytes(
    scale_factor: u32,
    multiplier: f64,
) -> u64 {
    (scale_factor as f64 * GIB as f64 * multiplier).floor() as u64
}

#[derive(Clone, Debug, PartialEq)]
pub enum PreflightOutcome {
    Passed {
        needed: u64,
        free: u64,
    },
    /// No multiplier registered for this kind and scale factor.
    Skipped {
        kind: String,
    },
}

pub struct DiskSpacePreflight<'a> {
    pub size_model: &'a SizeModel,
    pub aliases: &'a KindAliases,
    pub probe: &'a dyn DiskSpaceProbe,
}

impl DiskSpacePreflight<'_> {
    pub fn check(
        &self,
        benchmark: &str,
        schema_dir: &Path,
        scale_factor: u32,
        check_dir: &Path,
    ) -> Result<PreflightOutcome, Error> {
        let kind = self.aliases.kind_for(schema_dir);
        let Some(multiplier) = self.size_model.multiplier(&kind, scale_factor) else {
            log::warn!("[PREFLIGHT] Could not determine size factor. Not checking disk space.");
            return Ok(PreflightOutcome::Skipped {
                kind,
            });
        };

        log::info!(
            r#"[PREFLIGHT] Checking available disk space in {} with assumptions:
    Storage dir   : {}
    Database type : {kind}
    Benchmark     : {benchmark}
    Scale factor  : {scale_factor}
    Size factor   : {multiplier}"#,
            check_dir.display(),
            check_dir.display(),
        );

        let free = self.probe.free_bytes(check_dir)?;
        let needed = required_bytes(scale_factor, multiplier);
        if needed >= free {
            return Err(Error::InsufficientDiskSpace {
                needed,
                free,
                path: PathBuf::from(check_dir),
            });
        }
        Ok(PreflightOutcome::Passed {
            needed,
            free,
        })
    }
}
