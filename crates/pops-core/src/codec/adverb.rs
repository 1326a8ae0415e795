use std::io::{Read, Write};

use pops_model::{AdverbType, Inputs, Outputs, TaskSchema, Value};

use super::layout::ADVERB_CAPACITY;
use crate::error::{CoreError, CoreResult};

/// Write `schema`'s input adverbs to `sink` in declaration order.
///
/// Adverbs missing from `inputs` take their schema default. Names that are
/// not inputs of the task, values of the wrong shape, over-long strings and
/// inputs that do not fit one workspace are protocol violations; nothing is
/// written in that case.
pub fn encode<W: Write>(schema: &TaskSchema, inputs: &Inputs, sink: &mut W) -> CoreResult<()> {
    if let Some(unknown) = inputs.keys().find(|k| !schema.is_input(k)) {
        return Err(violation(format!(
            "'{unknown}' is not an input of {}",
            schema.name
        )));
    }
    let width = schema.input_width();
    if width > ADVERB_CAPACITY {
        return Err(violation(format!(
            "inputs of {} need {width} bytes, workspace holds {ADVERB_CAPACITY}",
            schema.name
        )));
    }

    let mut buf = Vec::with_capacity(width);
    for name in &schema.inputs {
        let spec = schema
            .adverb(name)
            .ok_or_else(|| violation(format!("input '{name}' has no declaration")))?;
        let value = inputs.get(name).unwrap_or(&spec.default);
        encode_value(name, &spec.kind, value, &mut buf)?;
    }
    sink.write_all(&buf)?;
    Ok(())
}

/// Read `schema`'s output adverbs from `source` in declaration order.
pub fn decode<R: Read>(schema: &TaskSchema, source: &mut R) -> CoreResult<Outputs> {
    let width = schema.output_width();
    if width > ADVERB_CAPACITY {
        return Err(violation(format!(
            "outputs of {} need {width} bytes, workspace holds {ADVERB_CAPACITY}",
            schema.name
        )));
    }

    let mut buf = vec![0u8; width];
    source.read_exact(&mut buf)?;

    let mut rest = buf.as_slice();
    let mut out = Outputs::new();
    for name in &schema.outputs {
        let spec = schema
            .adverb(name)
            .ok_or_else(|| violation(format!("output '{name}' has no declaration")))?;
        out.insert(name.clone(), decode_value(&spec.kind, &mut rest));
    }
    Ok(out)
}

/// Drop the index-0 placeholder of every list input; the wire and the
/// schema only know zero-based lists.
pub fn strip_placeholders(inputs: Inputs) -> Inputs {
    inputs
        .into_iter()
        .map(|(name, value)| (name, value.from_one_based()))
        .collect()
}

/// Give every list output an index-0 placeholder for one-based callers.
pub fn add_placeholders(outputs: Outputs) -> Outputs {
    outputs
        .into_iter()
        .map(|(name, value)| (name, value.to_one_based()))
        .collect()
}

fn encode_value(name: &str, kind: &AdverbType, value: &Value, out: &mut Vec<u8>) -> CoreResult<()> {
    match (kind, value) {
        (AdverbType::Float, Value::Float(v)) => out.extend_from_slice(&v.to_ne_bytes()),
        (AdverbType::Str { len }, Value::Str(s)) => {
            let width = kind.wire_width();
            if s.len() > *len {
                return Err(violation(format!(
                    "'{name}' holds {} bytes, at most {len} allowed",
                    s.len()
                )));
            }
            out.extend_from_slice(s.as_bytes());
            out.resize(out.len() + (width - s.len()), b' ');
        }
        (AdverbType::List { len, elem }, Value::List(items)) => {
            if items.len() != *len {
                return Err(violation(format!(
                    "'{name}' has {} elements, expected {len}",
                    items.len()
                )));
            }
            for item in items {
                encode_value(name, elem, item, out)?;
            }
        }
        (kind, value) => {
            return Err(violation(format!(
                "'{name}' is declared {}, got a {}",
                type_name(kind),
                value.kind()
            )));
        }
    }
    Ok(())
}

/// `bytes` is at least `kind.wire_width()` long; the caller sized it.
fn decode_value(kind: &AdverbType, bytes: &mut &[u8]) -> Value {
    match kind {
        AdverbType::Float => {
            let (head, tail) = bytes.split_at(4);
            *bytes = tail;
            let mut word = [0u8; 4];
            word.copy_from_slice(head);
            Value::Float(f32::from_ne_bytes(word))
        }
        AdverbType::Str { .. } => {
            let (head, tail) = bytes.split_at(kind.wire_width());
            *bytes = tail;
            let text = String::from_utf8_lossy(head);
            Value::Str(text.trim_end_matches([' ', '\0']).to_string())
        }
        AdverbType::List { len, elem } => {
            Value::List((0..*len).map(|_| decode_value(elem, bytes)).collect())
        }
    }
}

fn type_name(kind: &AdverbType) -> &'static str {
    match kind {
        AdverbType::Float => "float",
        AdverbType::Str { .. } => "string",
        AdverbType::List { .. } => "list",
    }
}

fn violation(msg: String) -> CoreError {
    CoreError::ProtocolViolation(msg)
}
