use serde::{Deserialize, Serialize};

/// Runtime value of an adverb.
///
/// Lists are plain zero-based sequences. Callers that speak the legacy
/// one-based convention (an ignored placeholder at index 0) convert at the
/// edge with [`Value::from_one_based`] / [`Value::to_one_based`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Float(f32),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Drop the index-0 placeholder of a one-based list.
    ///
    /// Non-list values and empty lists are returned unchanged. Nested lists
    /// are converted too.
    pub fn from_one_based(self) -> Value {
        match self {
            Value::List(mut items) if !items.is_empty() => {
                items.remove(0);
                Value::List(items.into_iter().map(Value::from_one_based).collect())
            }
            other => other,
        }
    }

    /// Prepend an index-0 placeholder shaped like the first element.
    pub fn to_one_based(self) -> Value {
        match self {
            Value::List(items) => {
                let items: Vec<Value> = items.into_iter().map(Value::to_one_based).collect();
                let placeholder = items.first().map(Value::placeholder).unwrap_or(Value::Float(0.0));
                let mut out = Vec::with_capacity(items.len() + 1);
                out.push(placeholder);
                out.extend(items);
                Value::List(out)
            }
            other => other,
        }
    }

    fn placeholder(&self) -> Value {
        match self {
            Value::Float(_) => Value::Float(0.0),
            Value::Str(_) => Value::Str(String::new()),
            Value::List(items) => Value::List(items.iter().map(Value::placeholder).collect()),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
