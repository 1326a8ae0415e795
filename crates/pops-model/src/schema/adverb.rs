use serde::{Deserialize, Serialize};

use crate::Value;

/// Wire shape of an adverb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AdverbType {
    /// 4-byte IEEE float.
    Float,
    /// Fixed-maximum-length string, space padded on the wire.
    Str { len: usize },
    /// Fixed-length list; elements may themselves be lists.
    List { len: usize, elem: Box<AdverbType> },
}

impl AdverbType {
    pub fn string(len: usize) -> Self {
        AdverbType::Str { len }
    }

    pub fn list(len: usize, elem: AdverbType) -> Self {
        AdverbType::List {
            len,
            elem: Box::new(elem),
        }
    }

    /// `rows` lists of `cols` elements each.
    pub fn matrix(rows: usize, cols: usize, elem: AdverbType) -> Self {
        AdverbType::list(rows, AdverbType::list(cols, elem))
    }

    /// Number of bytes this adverb occupies in a workspace record.
    pub fn wire_width(&self) -> usize {
        match self {
            AdverbType::Float => 4,
            AdverbType::Str { len } => len.div_ceil(4) * 4,
            AdverbType::List { len, elem } => len * elem.wire_width(),
        }
    }

    /// Zero / empty value of this shape.
    pub fn zero(&self) -> Value {
        match self {
            AdverbType::Float => Value::Float(0.0),
            AdverbType::Str { .. } => Value::Str(String::new()),
            AdverbType::List { len, elem } => Value::List(vec![elem.zero(); *len]),
        }
    }

    /// Whether `value` has this shape. String lengths are not checked.
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (AdverbType::Float, Value::Float(_)) => true,
            (AdverbType::Str { .. }, Value::Str(_)) => true,
            (AdverbType::List { len, elem }, Value::List(items)) => {
                items.len() == *len && items.iter().all(|v| elem.conforms(v))
            }
            _ => false,
        }
    }
}

/// Inclusive numeric bounds declared for an adverb.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f32) -> bool {
        self.min <= v && v <= self.max
    }
}

/// Declaration of one adverb inside a task schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdverbSpec {
    pub kind: AdverbType,
    /// Default value; also the shape template for decoding.
    pub default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
}

impl AdverbSpec {
    pub fn new(kind: AdverbType) -> Self {
        let default = kind.zero();
        Self {
            kind,
            default,
            range: None,
        }
    }

    /// Maximum string length, for string adverbs and lists of strings.
    pub fn strlen(&self) -> Option<usize> {
        let mut kind = &self.kind;
        loop {
            match kind {
                AdverbType::Str { len } => return Some(*len),
                AdverbType::List { elem, .. } => kind = elem,
                AdverbType::Float => return None,
            }
        }
    }
}
