use std::collections::BTreeMap;
use std::fmt::Display;

use bytes::Bytes;

/// Attribute carrying the zero-based index of the producer worker that sent the message.
pub const ATTR_WORKER: &str = "Worker";

/// Attribute carrying the per-worker send sequence (zero-based).
pub const ATTR_SEQUENCE: &str = "Sequence";

const DEFAULT_BODY: &str = r#"[
  {
    "id": "c1f6a4d2-5d1e-4a5e-9a63-0f3c2b7e9d10",
    "active": true,
    "balance": "$2,451.19",
    "name": "Sample Record",
    "email": "sample@example.com",
    "tags": ["load", "drill", "queue"],
    "friends": [
      { "id": 0, "name": "First Friend" },
      { "id": 1, "name": "Second Friend" }
    ],
    "greeting": "Hello! You have 8 unread messages."
  }
]"#;

/// Typed message attribute. Numbers keep their decimal text form, the way managed queues
/// carry them on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Number(String),
}

impl AttributeValue {
    pub fn string(v: impl Into<String>) -> Self {
        Self::String(v.into())
    }

    pub fn number(v: impl Display) -> Self {
        Self::Number(v.to_string())
    }

    #[must_use]
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Number(_) => "Number",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String(v) | Self::Number(v) => v,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(v) => v.parse().ok(),
            Self::String(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: Bytes,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn worker(&self) -> Option<u64> {
        self.attribute(ATTR_WORKER).and_then(AttributeValue::as_u64)
    }

    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.attribute(ATTR_SEQUENCE).and_then(AttributeValue::as_u64)
    }
}

/// Body and static attributes shared by every message of a run.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    body: Bytes,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(Bytes::from_static(DEFAULT_BODY.as_bytes()))
            .with_attribute("Title", AttributeValue::string("The Whistler"))
            .with_attribute("Author", AttributeValue::string("John Grisham"))
    }
}

impl MessageTemplate {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Replaces the body and keeps the attributes.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds the message a worker sends at `sequence`. Sequence markers win over template
    /// attributes with the same name.
    #[must_use]
    pub fn render(&self, worker: u64, sequence: u64) -> Message {
        let mut attributes = self.attributes.clone();
        attributes.insert(ATTR_WORKER.to_string(), AttributeValue::number(worker));
        attributes.insert(ATTR_SEQUENCE.to_string(), AttributeValue::number(sequence));

        Message {
            body: self.body.clone(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_adds_sequence_markers() {
        let msg = MessageTemplate::default().render(3, 7);
        assert_eq!(msg.worker(), Some(3));
        assert_eq!(msg.sequence(), Some(7));
        assert_eq!(
            msg.attribute("Author"),
            Some(&AttributeValue::string("John Grisham"))
        );
        assert!(!msg.body.is_empty());
    }

    #[test]
    fn sequence_markers_override_template_attributes() {
        let template =
            MessageTemplate::new("x").with_attribute(ATTR_WORKER, AttributeValue::string("nope"));
        let msg = template.render(1, 0);
        assert_eq!(msg.attribute(ATTR_WORKER), Some(&AttributeValue::number(1)));
    }

    #[test]
    fn with_body_keeps_template_attributes() {
        let msg = MessageTemplate::default().with_body("{}").render(0, 0);
        assert_eq!(msg.body.as_ref(), b"{}");
        assert_eq!(
            msg.attribute("Title"),
            Some(&AttributeValue::string("The Whistler"))
        );
    }

    #[test]
    fn attribute_data_types() {
        assert_eq!(AttributeValue::string("a").data_type(), "String");
        assert_eq!(AttributeValue::number(12).data_type(), "Number");
        assert_eq!(AttributeValue::number(12).as_u64(), Some(12));
        assert_eq!(AttributeValue::string("12").as_u64(), None);
    }
}
