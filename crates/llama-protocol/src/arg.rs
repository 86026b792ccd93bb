//! Encoded command-line arguments.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use llama_store::Blob;

/// One encoded positional argument.
///
/// On the wire, literals and raw strings are plain JSON values; references
/// are objects with an `in` blob, an `out` name, or both.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// An ordinary JSON value.
    Literal(Value),
    /// A string passed through verbatim.
    Raw(String),
    /// Local file content, delivered through the store.
    Input(Blob),
    /// Placeholder for a named result the backend should produce.
    Output(String),
    /// Content delivered in, and a result expected back under `output`.
    InputOutput { input: Blob, output: String },
}

impl Arg {
    /// Literal string argument.
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(Value::String(s.into()))
    }

    /// The input blob, if this argument carries one.
    pub fn input(&self) -> Option<&Blob> {
        match self {
            Arg::Input(blob) | Arg::InputOutput { input: blob, .. } => Some(blob),
            Arg::Literal(_) | Arg::Raw(_) | Arg::Output(_) => None,
        }
    }

    /// The output name, if this argument registers one.
    pub fn output(&self) -> Option<&str> {
        match self {
            Arg::Output(name) | Arg::InputOutput { output: name, .. } => Some(name),
            Arg::Literal(_) | Arg::Raw(_) | Arg::Input(_) => None,
        }
    }
}

impl Serialize for Arg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Arg::Literal(value) => value.serialize(serializer),
            Arg::Raw(s) => serializer.serialize_str(s),
            Arg::Input(blob) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("in", blob)?;
                map.end()
            }
            Arg::Output(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("out", name)?;
                map.end()
            }
            Arg::InputOutput { input, output } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("in", input)?;
                map.serialize_entry("out", output)?;
                map.end()
            }
        }
    }
}

/// Reference shape: an object with only `in` and/or `out`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RefWire {
    #[serde(rename = "in")]
    input: Option<Blob>,
    #[serde(rename = "out")]
    output: Option<String>,
}

impl<'de> Deserialize<'de> for Arg {
    /// Strings decode as literals; raw-ness is a client-side notion and is
    /// not recoverable from the wire.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_object()
            && let Ok(wire) = serde_json::from_value::<RefWire>(value.clone())
        {
            match (wire.input, wire.output) {
                (Some(input), Some(output)) => return Ok(Arg::InputOutput { input, output }),
                (Some(input), None) => return Ok(Arg::Input(input)),
                (None, Some(output)) => return Ok(Arg::Output(output)),
                (None, None) => {}
            }
        }
        Ok(Arg::Literal(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_and_raw_are_plain_strings() {
        assert_eq!(serde_json::to_value(Arg::literal("plain")).unwrap(), json!("plain"));
        assert_eq!(serde_json::to_value(Arg::Raw("123".into())).unwrap(), json!("123"));
        assert_eq!(serde_json::to_value(Arg::Raw("a@b".into())).unwrap(), json!("a@b"));
    }

    #[test]
    fn test_reference_shapes() {
        let blob = Blob::describe(b"data");
        let io = Arg::InputOutput {
            input: blob,
            output: "out.txt".into(),
        };
        let json = serde_json::to_value(&io).unwrap();
        assert_eq!(json["out"], "out.txt");
        assert_eq!(json["in"]["size"], 4);

        let out = serde_json::to_value(Arg::Output("x".into())).unwrap();
        assert_eq!(out, json!({"out": "x"}));
    }

    #[test]
    fn test_decode_distinguishes_refs_from_objects() {
        let blob = Blob::describe(b"data");
        let decoded: Arg =
            serde_json::from_value(serde_json::to_value(Arg::Input(blob)).unwrap()).unwrap();
        assert_eq!(decoded, Arg::Input(blob));

        let other: Arg = serde_json::from_value(json!({"key": 1})).unwrap();
        assert_eq!(other, Arg::Literal(json!({"key": 1})));
    }

    #[test]
    fn test_accessors() {
        let blob = Blob::describe(b"x");
        let io = Arg::InputOutput {
            input: blob,
            output: "o".into(),
        };
        assert_eq!(io.input(), Some(&blob));
        assert_eq!(io.output(), Some("o"));
        assert_eq!(Arg::literal("l").input(), None);
    }
}
