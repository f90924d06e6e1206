use bytes::Bytes;

use crate::error::{FrameError, Result};

/// A payload addressed to a named stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    name: String,
    body: Bytes,
}

impl Message {
    /// Create a message. The name must be non-empty.
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        Ok(Self {
            name,
            body: body.into(),
        })
    }

    /// The stream this message is addressed to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split into name and body.
    pub fn into_parts(self) -> (String, Bytes) {
        (self.name, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            Message::new("", "body"),
            Err(FrameError::EmptyName)
        ));
    }

    #[test]
    fn accessors() {
        let msg = Message::new("logs", &b"hello\n"[..]).unwrap();
        assert_eq!(msg.name(), "logs");
        assert_eq!(msg.body().as_ref(), b"hello\n");

        let (name, body) = msg.into_parts();
        assert_eq!(name, "logs");
        assert_eq!(body.as_ref(), b"hello\n");
    }
}
