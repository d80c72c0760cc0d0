//! Upload filename carriage: inline on the first chunk, or as a stream header.

use std::collections::HashMap;

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::{FILENAME_HEADER, MAX_FILENAME_LEN};
use tracing::trace;

use crate::TransferError;
use crate::types::ChunkMessage;

/// Where the upload filename travels. Fixed per protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameConvention {
    /// On the first chunk message only.
    Inline,
    /// As the `filename` stream header, before any chunk.
    Header,
}

impl From<ProtocolVersion> for FilenameConvention {
    fn from(v: ProtocolVersion) -> Self {
        match v {
            ProtocolVersion::InlineFilename => Self::Inline,
            ProtocolVersion::HeaderFilename => Self::Header,
        }
    }
}

/// Rejects filenames that cannot be carried.
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty() {
        return Err(TransferError::Validation("filename is required".into()));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(TransferError::Validation(format!(
            "filename is {} bytes, limit is {MAX_FILENAME_LEN}",
            filename.len()
        )));
    }
    Ok(())
}

/// Sending side: holds the filename and attaches it per convention.
#[derive(Debug, Clone)]
pub struct MetadataCarrier {
    convention: FilenameConvention,
    filename: String,
}

impl MetadataCarrier {
    /// Validates `filename` and prepares it for carriage.
    pub fn attach(convention: FilenameConvention, filename: &str) -> Result<Self, TransferError> {
        validate_filename(filename)?;
        Ok(Self {
            convention,
            filename: filename.to_string(),
        })
    }

    pub fn convention(&self) -> FilenameConvention {
        self.convention
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Stream headers to send when the stream is opened.
    pub fn headers(&self) -> HashMap<String, String> {
        match self.convention {
            FilenameConvention::Header => {
                HashMap::from([(FILENAME_HEADER.to_string(), self.filename.clone())])
            }
            FilenameConvention::Inline => HashMap::new(),
        }
    }

    /// Filename for the first chunk message, if carried inline.
    pub fn inline_filename(&self) -> Option<String> {
        match self.convention {
            FilenameConvention::Inline => Some(self.filename.clone()),
            FilenameConvention::Header => None,
        }
    }
}

/// Receiving side: resolves the filename exactly once.
#[derive(Debug, Clone)]
pub struct FilenameResolver {
    convention: FilenameConvention,
    filename: Option<String>,
}

impl FilenameResolver {
    /// Starts resolution from the stream headers received at open.
    pub fn new(convention: FilenameConvention, headers: &HashMap<String, String>) -> Self {
        let filename = match convention {
            FilenameConvention::Header => headers
                .get(FILENAME_HEADER)
                .filter(|name| !name.is_empty())
                .cloned(),
            FilenameConvention::Inline => None,
        };
        Self {
            convention,
            filename,
        }
    }

    /// Fails early when the header convention is in effect and the header
    /// was absent, before any chunk is read.
    pub fn precheck(&self) -> Result<(), TransferError> {
        if self.convention == FilenameConvention::Header && self.filename.is_none() {
            return Err(TransferError::MissingMetadata(format!(
                "stream header `{FILENAME_HEADER}` is absent"
            )));
        }
        Ok(())
    }

    /// Observes a received chunk. Under the inline convention the first
    /// non-empty filename wins; later ones are ignored.
    pub fn observe(&mut self, chunk: &ChunkMessage) {
        let Some(name) = chunk.filename.as_deref().filter(|n| !n.is_empty()) else {
            return;
        };
        if self.convention == FilenameConvention::Inline && self.filename.is_none() {
            self.filename = Some(name.to_string());
        } else {
            trace!(filename = name, "ignoring repeated or out-of-band filename");
        }
    }

    /// The resolved filename.
    pub fn extract(&self) -> Result<String, TransferError> {
        self.filename.clone().ok_or_else(|| {
            TransferError::MissingMetadata("no chunk carried a filename".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, payload: &[u8]) -> ChunkMessage {
        ChunkMessage {
            filename: Some(name.into()),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn empty_filename_rejected() {
        let err = MetadataCarrier::attach(FilenameConvention::Header, "").unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[test]
    fn long_filename_rejected() {
        let name = "a".repeat(MAX_FILENAME_LEN + 1);
        assert!(validate_filename(&name).is_err());
        assert!(validate_filename(&name[..MAX_FILENAME_LEN]).is_ok());
    }

    #[test]
    fn header_carrier_uses_headers_only() {
        let carrier = MetadataCarrier::attach(FilenameConvention::Header, "report.pdf").unwrap();
        assert_eq!(carrier.headers()["filename"], "report.pdf");
        assert!(carrier.inline_filename().is_none());
    }

    #[test]
    fn inline_carrier_uses_chunks_only() {
        let carrier = MetadataCarrier::attach(FilenameConvention::Inline, "report.pdf").unwrap();
        assert!(carrier.headers().is_empty());
        assert_eq!(carrier.inline_filename().as_deref(), Some("report.pdf"));
    }

    #[test]
    fn header_resolution() {
        let headers = HashMap::from([("filename".to_string(), "a.txt".to_string())]);
        let mut resolver = FilenameResolver::new(FilenameConvention::Header, &headers);
        resolver.precheck().unwrap();
        // Inline names are not mixed in under the header convention.
        resolver.observe(&named("b.txt", b"x"));
        assert_eq!(resolver.extract().unwrap(), "a.txt");
    }

    #[test]
    fn missing_header_fails_precheck() {
        let headers = HashMap::from([("filename".to_string(), String::new())]);
        let resolver = FilenameResolver::new(FilenameConvention::Header, &headers);
        assert!(matches!(
            resolver.precheck(),
            Err(TransferError::MissingMetadata(_))
        ));
    }

    #[test]
    fn inline_first_non_empty_wins() {
        let mut resolver = FilenameResolver::new(FilenameConvention::Inline, &HashMap::new());
        resolver.precheck().unwrap();
        resolver.observe(&ChunkMessage::new(b"0".to_vec()));
        resolver.observe(&named("", b"1"));
        resolver.observe(&named("first.bin", b"2"));
        resolver.observe(&named("second.bin", b"3"));
        assert_eq!(resolver.extract().unwrap(), "first.bin");
    }

    #[test]
    fn inline_ignores_headers() {
        let headers = HashMap::from([("filename".to_string(), "header.txt".to_string())]);
        let resolver = FilenameResolver::new(FilenameConvention::Inline, &headers);
        assert!(matches!(
            resolver.extract(),
            Err(TransferError::MissingMetadata(_))
        ));
    }
}
