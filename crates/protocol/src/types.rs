use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol revision, selected in configuration on both peers.
///
/// The revisions disagree on where the upload filename travels and on how
/// often constraints are negotiated, so peers must agree on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ProtocolVersion {
    /// v1: filename rides on the first chunk frame.
    InlineFilename,
    /// v2: filename is a stream header on `upload_open`.
    #[default]
    HeaderFilename,
}

impl ProtocolVersion {
    /// Numeric wire value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::InlineFilename => 1,
            Self::HeaderFilename => 2,
        }
    }
}

impl From<ProtocolVersion> for u32 {
    fn from(v: ProtocolVersion) -> Self {
        v.as_u32()
    }
}

impl TryFrom<u32> for ProtocolVersion {
    type Error = String;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::InlineFilename),
            2 => Ok(Self::HeaderFilename),
            other => Err(format!("unsupported protocol version {other}")),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_serializes_as_number() {
        assert_eq!(
            serde_json::to_string(&ProtocolVersion::InlineFilename).unwrap(),
            "1"
        );
        let v: ProtocolVersion = serde_json::from_str("2").unwrap();
        assert_eq!(v, ProtocolVersion::HeaderFilename);
    }

    #[test]
    fn unknown_version_rejected() {
        let err = serde_json::from_str::<ProtocolVersion>("7").unwrap_err();
        assert!(err.to_string().contains("unsupported protocol version 7"));
    }

    #[test]
    fn header_convention_is_default() {
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::HeaderFilename);
        assert_eq!(ProtocolVersion::default().to_string(), "v2");
    }
}
