use serde::{Deserialize, Serialize};

/// Closed set of task families that share the slot/parameter/message
/// protocol but differ in how executables are located and which defaults
/// apply.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskFamily {
    /// Classic tasks installed under `$AIPS_ROOT/<version>/<arch>/LOAD`.
    #[default]
    Aips,
    /// Obit tasks, installed under `$OBIT_EXEC/bin`.
    Obit,
}

impl TaskFamily {
    /// Short symbolic identifier, for logging and routing.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskFamily::Aips => "aips",
            TaskFamily::Obit => "obit",
        }
    }

    /// Package name used in user-facing diagnostics.
    pub fn package(&self) -> &'static str {
        match self {
            TaskFamily::Aips => "AIPS",
            TaskFamily::Obit => "Obit",
        }
    }

    /// Version used when the caller does not name one.
    ///
    /// `None` means "use the configured default".
    pub fn default_version(&self) -> Option<&'static str> {
        match self {
            TaskFamily::Aips => None,
            TaskFamily::Obit => Some("OBIT"),
        }
    }

    /// User number substituted when the configured one is 0.
    ///
    /// AIPS tasks refuse to run without an explicit user number.
    pub fn fallback_userno(&self) -> Option<u32> {
        match self {
            TaskFamily::Aips => None,
            TaskFamily::Obit => Some(1),
        }
    }
}
