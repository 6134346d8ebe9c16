//! The single JSON object written to stdout for every command.

use ryvie_core::{Disk, Proposal, StorageError};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};
use std::io::Write;

const NOT_IMPLEMENTED_NOTE: &str = "Reserved command. No disk operations are performed.";

/// Argument payload as received, kept verbatim so it echoes back unchanged.
#[derive(Debug)]
pub struct Payload {
    pub raw: Box<RawValue>,
    pub fields: Map<String, Value>,
}

impl Payload {
    /// Blank input is an empty object. Anything other than a JSON object is
    /// rejected.
    pub fn parse(text: &str) -> Result<Self, StorageError> {
        let text = text.trim();
        let text = if text.is_empty() { "{}" } else { text };
        let fields: Map<String, Value> =
            serde_json::from_str(text).map_err(|e| StorageError::ArgsParse(e.to_string()))?;
        let raw = RawValue::from_string(text.to_string())
            .map_err(|e| StorageError::ArgsParse(e.to_string()))?;
        Ok(Self { raw, fields })
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Args {
    Verbatim(Box<RawValue>),
    Annotated(Value),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Body {
    Scan { disks: Vec<Disk> },
    Proposal(Proposal),
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub ok: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub body: Option<Body>,
}

impl Envelope {
    fn new(ok: bool, command: &str, args: Option<Args>) -> Self {
        Self {
            ok,
            command: command.to_string(),
            args,
            error: None,
            detail: None,
            note: None,
            body: None,
        }
    }

    pub fn success(command: &str, payload: Payload, body: Body) -> Self {
        Self {
            body: Some(body),
            ..Self::new(true, command, Some(Args::Verbatim(payload.raw)))
        }
    }

    pub fn failure(command: &str, payload: Payload, err: &StorageError) -> Self {
        Self {
            error: Some(err.tag().to_string()),
            detail: err.detail(),
            ..Self::new(false, command, Some(Args::Verbatim(payload.raw)))
        }
    }

    pub fn not_implemented(command: &str, payload: Payload) -> Self {
        let err = StorageError::NotImplemented(command.to_string());
        Self {
            note: Some(NOT_IMPLEMENTED_NOTE.to_string()),
            ..Self::failure(command, payload, &err)
        }
    }

    pub fn unknown_command(command: &str, payload: Payload, known: &[&str]) -> Self {
        let err = StorageError::UnknownCommand(command.to_string());
        Self {
            note: Some(format!("Known commands: {}", known.join(", "))),
            ..Self::failure(command, payload, &err)
        }
    }

    /// The payload could not be parsed; the parser message replaces it.
    pub fn parse_error(command: &str, err: &StorageError) -> Self {
        let message = err.detail().unwrap_or_else(|| err.to_string());
        Self {
            error: Some(err.tag().to_string()),
            ..Self::new(false, command, Some(Args::Annotated(json!({ "parse_error": message }))))
        }
    }

    /// Write as one line of JSON. HTML-significant characters are not escaped.
    pub fn emit<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        serde_json::to_writer(&mut out, self)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(envelope: &Envelope) -> String {
        let mut buf = Vec::new();
        envelope.emit(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_blank_payload_is_empty_object() {
        let payload = Payload::parse("  ").unwrap();
        assert_eq!(payload.raw.get(), "{}");
        assert!(payload.fields.is_empty());
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        for text in ["[1, 2]", "\"scan\"", "{\"a\":", "null"] {
            let err = Payload::parse(text).unwrap_err();
            assert_eq!(err.tag(), "parse_error", "payload {}", text);
        }
    }

    #[test]
    fn test_payload_echo_is_verbatim() {
        let text = r#"{"z": 1.50, "a": ["<b>", "&"],  "n": null}"#;
        let envelope = Envelope::not_implemented("lvm", Payload::parse(text).unwrap());
        let out = render(&envelope);
        assert!(out.contains(text), "{}", out);
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn test_failure_fields() {
        let err = StorageError::query("lsblk", "exit status 32");
        let envelope = Envelope::failure("scan", Payload::parse("{}").unwrap(), &err);
        let value: Value = serde_json::from_str(&render(&envelope)).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["command"], "scan");
        assert_eq!(value["error"], "lsblk_failed");
        assert_eq!(value["detail"], "lsblk: exit status 32");
        assert!(value.get("note").is_none());
        assert!(value.get("disks").is_none());
    }

    #[test]
    fn test_parse_error_envelope() {
        let err = Payload::parse("{oops").unwrap_err();
        let envelope = Envelope::parse_error("proposal", &err);
        let value: Value = serde_json::from_str(&render(&envelope)).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["command"], "proposal");
        assert_eq!(value["error"], "parse_error");
        assert!(value["args"]["parse_error"].as_str().unwrap().contains("key must be a string"));
    }
}
