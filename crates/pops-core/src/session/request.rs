use pops_model::{Inputs, PopsConfig, TaskEnv, TaskFamily, Value};
use serde::{Deserialize, Serialize};

use crate::family;

/// What to run: task name, family, optional version and input values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub name: String,
    #[serde(default)]
    pub family: TaskFamily,
    /// `None` picks the family or configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub inputs: Inputs,
    /// Extra environment for the task process.
    #[serde(default, skip_serializing_if = "TaskEnv::is_empty")]
    pub env: TaskEnv,
    /// Lists in `inputs` carry an ignored placeholder at index 0, and lists
    /// in the outputs are handed back with one.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub one_based: bool,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: TaskFamily::default(),
            version: None,
            inputs: Inputs::new(),
            env: TaskEnv::new(),
            one_based: false,
        }
    }

    pub fn family(mut self, family: TaskFamily) -> Self {
        self.family = family;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn input(mut self, adverb: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(adverb.into(), value.into());
        self
    }

    pub fn inputs(mut self, inputs: Inputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.set(key, value);
        self
    }

    /// Speak the one-based list convention at the boundary.
    pub fn one_based(mut self) -> Self {
        self.one_based = true;
        self
    }

    /// Installed version this request runs under `cfg`.
    pub fn resolved_version(&self, cfg: &PopsConfig) -> String {
        family::resolve_version(self.family, cfg, self.version.as_deref())
    }
}
