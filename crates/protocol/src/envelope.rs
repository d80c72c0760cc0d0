use serde::{Deserialize, Serialize};

use crate::constants::MessageType;

/// Error details carried by an `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// Errors raised while decoding an envelope payload.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("{0:?} message has no payload")]
    MissingPayload(MessageType),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Envelope for every JSON text frame.
///
/// `payload` stays raw until the receiver knows which type to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Message {
    /// Creates a new message with the given type and payload.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = payload
            .map(serde_json::value::to_raw_value)
            .transpose()?;
        Ok(Self {
            id: id.into(),
            msg_type,
            payload: raw,
            error: None,
        })
    }

    /// Creates an error message.
    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            msg_type: MessageType::Error,
            payload: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    /// Returns `true` for `error` messages or any message carrying an error body.
    pub fn is_error(&self) -> bool {
        self.msg_type == MessageType::Error || self.error.is_some()
    }

    /// Deserializes the payload if one is present.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        self.payload
            .as_ref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }

    /// Deserializes a payload the message type requires.
    pub fn expect_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EnvelopeError> {
        let raw = self
            .payload
            .as_ref()
            .ok_or(EnvelopeError::MissingPayload(self.msg_type))?;
        Ok(serde_json::from_str(raw.get())?)
    }

    /// Creates a response message for this request.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Message::new(&self.id, msg_type, payload)
    }

    /// Creates an error response for this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Message::error(&self.id, code, message)
    }
}
