use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AdverbName, AdverbSpec, AdverbType, ModelError, Value, ValueRange};

/// Ordered, typed description of a task's adverbs.
///
/// Produced once per (name, version) by whatever parses the task's help
/// text, then treated as read-only. Input and output lists may overlap:
/// an adverb can be written before the run and read back after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSchema {
    pub name: String,
    pub version: String,
    pub inputs: Vec<AdverbName>,
    pub outputs: Vec<AdverbName>,
    pub adverbs: BTreeMap<AdverbName, AdverbSpec>,
}

impl TaskSchema {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> TaskSchemaBuilder {
        TaskSchemaBuilder {
            schema: TaskSchema {
                name: name.into(),
                version: version.into(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                adverbs: BTreeMap::new(),
            },
            error: None,
        }
    }

    pub fn adverb(&self, name: &str) -> Option<&AdverbSpec> {
        self.adverbs.get(name)
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|a| a == name)
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|a| a == name)
    }

    /// Total encoded size of the input adverbs.
    pub fn input_width(&self) -> usize {
        self.width_of(&self.inputs)
    }

    /// Total encoded size of the output adverbs.
    pub fn output_width(&self) -> usize {
        self.width_of(&self.outputs)
    }

    fn width_of(&self, names: &[AdverbName]) -> usize {
        names
            .iter()
            .filter_map(|n| self.adverbs.get(n))
            .map(|a| a.kind.wire_width())
            .sum()
    }
}

/// Incremental constructor for [`TaskSchema`]. The first error is kept and
/// reported by [`TaskSchemaBuilder::build`].
#[derive(Debug, Clone)]
pub struct TaskSchemaBuilder {
    schema: TaskSchema,
    error: Option<ModelError>,
}

impl TaskSchemaBuilder {
    /// Declare an adverb that is written before the task runs.
    pub fn input(self, name: impl Into<String>, kind: AdverbType) -> Self {
        self.declare(name.into(), kind, true, false)
    }

    /// Declare an adverb that is read back after the task finishes.
    pub fn output(self, name: impl Into<String>, kind: AdverbType) -> Self {
        self.declare(name.into(), kind, false, true)
    }

    /// Declare an adverb that is both written and read back.
    pub fn inout(self, name: impl Into<String>, kind: AdverbType) -> Self {
        self.declare(name.into(), kind, true, true)
    }

    pub fn default(mut self, name: &str, value: Value) -> Self {
        match self.schema.adverbs.get_mut(name) {
            Some(spec) if spec.kind.conforms(&value) => spec.default = value,
            Some(_) => self.fail(ModelError::DefaultShape {
                adverb: name.to_string(),
            }),
            None => self.fail(ModelError::UnknownAdverb(name.to_string())),
        }
        self
    }

    pub fn range(mut self, name: &str, min: f32, max: f32) -> Self {
        match self.schema.adverbs.get_mut(name) {
            Some(spec) => spec.range = Some(ValueRange::new(min, max)),
            None => self.fail(ModelError::UnknownAdverb(name.to_string())),
        }
        self
    }

    pub fn build(self) -> Result<TaskSchema, ModelError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.schema),
        }
    }

    fn declare(mut self, name: String, kind: AdverbType, input: bool, output: bool) -> Self {
        if self.schema.adverbs.contains_key(&name) {
            self.fail(ModelError::DuplicateAdverb(name));
            return self;
        }
        if input {
            self.schema.inputs.push(name.clone());
        }
        if output {
            self.schema.outputs.push(name.clone());
        }
        self.schema.adverbs.insert(name, AdverbSpec::new(kind));
        self
    }

    fn fail(&mut self, e: ModelError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }
}
