fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use filesvc_protocol::constants::{MessageType, WS_ERR_CODE_TOO_LARGE};
    use filesvc_protocol::messages::{
        ConstraintsResponse, DownloadEndResponse, DownloadRequest, FileInfoResponse,
        ListFilesResponse, OperationResult, UploadOpenRequest, UploadResultResponse,
    };
    use filesvc_protocol::{ChunkHeader, Message, ProtocolVersion, encode_chunk_frame, parse_chunk_frame};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    ///
    /// Parses from text rather than from a `Value` so raw payloads work.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Envelope ---

    #[test]
    fn fixture_message_envelope() {
        let msg = roundtrip_test::<Message>("message_envelope.json");
        assert_eq!(msg.msg_type, MessageType::UploadOpen);
        assert!(!msg.is_error());

        let open: UploadOpenRequest = msg.expect_payload().unwrap();
        assert_eq!(open.protocol_version, ProtocolVersion::HeaderFilename);
        assert_eq!(open.headers["filename"], "report.pdf");
    }

    #[test]
    fn fixture_error_envelope() {
        let msg = roundtrip_test::<Message>("error_envelope.json");
        assert!(msg.is_error());
        assert!(msg.payload.is_none());
        assert_eq!(msg.error.unwrap().code, WS_ERR_CODE_TOO_LARGE);
    }

    #[test]
    fn fixture_message_types() {
        let types = roundtrip_test::<Vec<MessageType>>("message_types.json");
        assert_eq!(types.len(), 18);
        assert!(!types.contains(&MessageType::Unknown));
    }

    #[test]
    fn unknown_message_type_is_tolerated() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"x","type":"resume_upload","payload":{"offset":4}}"#)
                .unwrap();
        assert_eq!(msg.msg_type, MessageType::Unknown);
    }

    // --- Payloads ---

    #[test]
    fn fixture_upload_open_inline() {
        let open = roundtrip_test::<UploadOpenRequest>("upload_open_inline.json");
        assert_eq!(open.protocol_version, ProtocolVersion::InlineFilename);
        assert!(open.headers.is_empty());
    }

    #[test]
    fn unsupported_protocol_version_rejected() {
        let err = serde_json::from_str::<UploadOpenRequest>(r#"{"protocolVersion":3}"#);
        assert!(err.is_err());
    }

    #[test]
    fn fixture_download_request() {
        let req = roundtrip_test::<DownloadRequest>("download_request.json");
        assert_eq!(req.chunk_size, 1_048_576);

        // chunkSize may be omitted; 0 means server default.
        let bare: DownloadRequest = serde_json::from_str(r#"{"id":"f"}"#).unwrap();
        assert_eq!(bare.chunk_size, 0);
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"id":"f"}"#);
    }

    #[test]
    fn fixture_constraints_response() {
        let c = roundtrip_test::<ConstraintsResponse>("constraints_response.json");
        assert_eq!(c.max_batch_size, 1_048_576);
        assert_eq!(c.max_file_size, 104_857_600);
    }

    #[test]
    fn fixture_upload_result_response() {
        let r = roundtrip_test::<UploadResultResponse>("upload_result_response.json");
        assert_eq!(r.size, 10_485_760);
    }

    #[test]
    fn fixture_download_end_response() {
        let end = roundtrip_test::<DownloadEndResponse>("download_end_response.json");
        assert_eq!((end.size, end.chunks), (10_485_760, 10));
    }

    #[test]
    fn fixture_file_info_response() {
        let info = roundtrip_test::<FileInfoResponse>("file_info_response.json");
        assert_eq!(info.filename, "report.pdf");
    }

    #[test]
    fn fixture_list_files_response() {
        let list = roundtrip_test::<ListFilesResponse>("list_files_response.json");
        assert_eq!(list.total as usize, list.files.len());
    }

    #[test]
    fn fixture_operation_result() {
        let r = roundtrip_test::<OperationResult>("operation_result.json");
        assert!(r.success);
        assert!(r.message.is_empty());
    }

    // --- Binary frames ---

    #[test]
    fn fixture_chunk_header() {
        let header = roundtrip_test::<ChunkHeader>("chunk_header_inline.json");
        assert_eq!(header.msg_type, MessageType::UploadChunk);
        assert_eq!(header.filename.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn chunk_frame_layout() {
        let header: ChunkHeader = serde_json::from_str(&read_fixture("chunk_header_inline.json")).unwrap();
        let payload = [0xde, 0xad, 0xbe, 0xef];
        let frame = encode_chunk_frame(&header, &payload).unwrap();

        // [4-byte big-endian header length][JSON header][payload]
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        let header_json: serde_json::Value = serde_json::from_slice(&frame[4..4 + len]).unwrap();
        assert_eq!(header_json, load_fixture("chunk_header_inline.json"));
        assert_eq!(&frame[4 + len..], &payload);
        assert_eq!(frame.len(), 4 + len + payload.len());

        let parsed = parse_chunk_frame(&frame).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.data, payload);
    }

    #[test]
    fn chunk_frame_from_foreign_encoder() {
        // Frame assembled by hand the way a non-Rust peer would.
        let header = br#"{"id":"d-1","type":"download_chunk"}"#;
        let mut frame = (header.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(header);
        frame.extend_from_slice(b"hello");

        let parsed = parse_chunk_frame(&frame).unwrap();
        assert_eq!(parsed.header.id, "d-1");
        assert_eq!(parsed.header.msg_type, MessageType::DownloadChunk);
        assert!(parsed.header.filename.is_none());
        assert_eq!(parsed.data, b"hello");
    }
}
