use std::{collections::HashMap, path::{Path, PathBuf}, time::Duration};

use crate::{MAX_SLOTS, ModelError, ehex};

/// Name of the parameter file inside `DA00`.
pub const PARAMETER_FILE_NAME: &str = "TDD000004;";

/// Version names that are aliases for an installed version directory.
const VERSION_ALIASES: [&str; 3] = ["OLD", "NEW", "TST"];

/// Per-caller settings for running tasks.
///
/// Built once (usually with [`PopsConfig::from_env`]) and handed to every
/// session created from the same context. Sessions never read the process
/// environment themselves.
#[derive(Debug, Clone)]
pub struct PopsConfig {
    pub aips_root: PathBuf,
    pub arch: String,
    /// Version used when a task is run without naming one.
    pub version: String,
    /// `OLD`/`NEW`/`TST` to installed version paths.
    pub version_aliases: HashMap<String, PathBuf>,
    /// Directory holding the parameter file.
    pub da00: PathBuf,
    /// Directory holding the message store.
    pub da01: PathBuf,
    pub parameter_file: Option<PathBuf>,
    pub message_file: Option<PathBuf>,
    pub obit_exec: Option<PathBuf>,
    pub lock_dir: PathBuf,
    pub lock_prefix: String,
    pub max_slots: u32,
    pub userno: u32,
    pub msgkill: i32,
    pub isbatch: i32,
    /// System format revision letter used in shared file names.
    pub revision: char,
    /// Upper bound for one readiness wait on a task's terminal.
    pub poll_timeout: Duration,
    /// Time an aborted task gets to exit before it is killed outright.
    pub abort_grace: Duration,
}

impl Default for PopsConfig {
    fn default() -> Self {
        Self {
            aips_root: PathBuf::new(),
            arch: String::new(),
            version: "NEW".to_string(),
            version_aliases: HashMap::new(),
            da00: PathBuf::new(),
            da01: PathBuf::new(),
            parameter_file: None,
            message_file: None,
            obit_exec: None,
            lock_dir: PathBuf::from("/tmp"),
            lock_prefix: "AIPS".to_string(),
            max_slots: MAX_SLOTS,
            userno: 0,
            msgkill: 0,
            isbatch: 32000,
            revision: 'D',
            poll_timeout: Duration::from_millis(250),
            abort_grace: Duration::from_millis(100),
        }
    }
}

impl PopsConfig {
    /// Snapshot the relevant environment variables.
    ///
    /// Missing variables keep their [`Default`] values; `DA01` falls back
    /// to `DA00` when unset.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Like [`PopsConfig::from_env`] but over an explicit variable set.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        let mut cfg = Self::default();
        if let Some(v) = vars.get("AIPS_ROOT") {
            cfg.aips_root = PathBuf::from(v);
        }
        if let Some(v) = vars.get("ARCH") {
            cfg.arch = v.clone();
        }
        if let Some(v) = vars.get("VERSION") {
            cfg.version = v.clone();
        }
        for alias in VERSION_ALIASES {
            if let Some(v) = vars.get(alias) {
                cfg.version_aliases.insert(alias.to_string(), PathBuf::from(v));
            }
        }
        if let Some(v) = vars.get("DA00") {
            cfg.da00 = PathBuf::from(v);
        }
        cfg.da01 = vars
            .get("DA01")
            .map(PathBuf::from)
            .unwrap_or_else(|| cfg.da00.clone());
        if let Some(v) = vars.get("OBIT_EXEC") {
            cfg.obit_exec = Some(PathBuf::from(v));
        }
        cfg
    }

    pub fn with_userno(mut self, userno: u32) -> Self {
        self.userno = userno;
        self
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    pub fn with_aips_root(mut self, root: impl Into<PathBuf>, arch: impl Into<String>) -> Self {
        self.aips_root = root.into();
        self.arch = arch.into();
        self
    }

    pub fn with_data_dirs(mut self, da00: impl Into<PathBuf>, da01: impl Into<PathBuf>) -> Self {
        self.da00 = da00.into();
        self.da01 = da01.into();
        self
    }

    pub fn with_max_slots(mut self, n: u32) -> Self {
        self.max_slots = n;
        self
    }

    pub fn with_poll_timeout(mut self, t: Duration) -> Self {
        self.poll_timeout = t;
        self
    }

    pub fn with_abort_grace(mut self, t: Duration) -> Self {
        self.abort_grace = t;
        self
    }

    /// Check invariants that would otherwise surface deep inside a session.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_slots == 0 || self.max_slots > MAX_SLOTS {
            return Err(ModelError::InvalidConfig(format!(
                "max_slots {} outside 1..={MAX_SLOTS}",
                self.max_slots
            )));
        }
        if self.lock_prefix.is_empty() || self.lock_prefix.contains('/') {
            return Err(ModelError::InvalidConfig(format!(
                "bad lock prefix '{}'",
                self.lock_prefix
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(ModelError::InvalidConfig("poll_timeout must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve a version name; aliases map to the basename of their path.
    pub fn resolve_version(&self, version: &str) -> String {
        self.version_aliases
            .get(version)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| version.to_string())
    }

    /// Path of the shared parameter file.
    pub fn parameter_path(&self) -> PathBuf {
        self.parameter_file
            .clone()
            .unwrap_or_else(|| self.da00.join(PARAMETER_FILE_NAME))
    }

    /// Path of the message store belonging to `userno`.
    pub fn message_path(&self, userno: u32) -> PathBuf {
        match &self.message_file {
            Some(p) => p.clone(),
            None => self.da01.join(message_file_name(self.revision, userno)),
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}

/// `MS<rev><user>000.000;`, with the user number in 3-digit extended hex.
pub fn message_file_name(revision: char, userno: u32) -> String {
    format!("MS{revision}{}000.000;", ehex(userno, 3, '0'))
}
