use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Level directive used when nothing else is configured.
const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info,pops.core.slot=trace`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        // Logs go to stderr; task console output owns stdout.
        let use_color = cfg!(test) || std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: DEFAULT_LEVEL.to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by `POPS_LOG` (level) and `POPS_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_vars(
            std::env::var("POPS_LOG").ok().as_deref(),
            std::env::var("POPS_LOG_FORMAT").ok().as_deref(),
        )
    }

    pub fn from_vars(level: Option<&str>, format: Option<&str>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = level.filter(|l| !l.trim().is_empty()) {
            cfg.level = level.trim().to_string();
        }
        if let Some(format) = format {
            cfg.format = format.parse()?;
        }
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LoggerFormat) -> Self {
        self.format = format;
        self
    }
}
