use bytes::Bytes;
use kwire_protocol::messages::{apiversions, createpartitions, deletetopics};
use kwire_protocol::{
    read_request, read_request_with, read_response, write_request, write_response, ApiKey, CodecConfig,
    FrameDecoder, ProtocolError, TaggedFields, UnknownTagPolicy,
};
use kwire_prototest::{
    hex_dump, init_test_logging, test_request, test_request_versions, test_response, test_response_versions, HarnessError,
};

fn delete_request() -> deletetopics::Request {
    deletetopics::Request {
        topic_names: vec!["orders".to_string(), "payments".to_string()],
        timeout_ms: 15_000,
        ..Default::default()
    }
}

#[test]
fn test_delete_topics_all_versions() {
    init_test_logging();
    test_request_versions(&delete_request()).unwrap();
    test_response_versions(&deletetopics::Response {
        throttle_time_ms: 0,
        responses: vec![deletetopics::ResponseTopic {
            name: "orders".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    })
    .unwrap();
}

#[test]
fn test_api_versions_all_versions() {
    init_test_logging();
    test_request(0, &apiversions::Request::default()).unwrap();
    test_request(
        3,
        &apiversions::Request {
            client_software_name: "kwire".to_string(),
            client_software_version: "0.1.0".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    test_response_versions(&apiversions::Response::from_registry(kwire_protocol::registry())).unwrap();
}

#[test]
fn test_version_gated_fields_fail_instead_of_dropping() {
    let req = apiversions::Request {
        client_software_name: "x".to_string(),
        ..Default::default()
    };
    let err = test_request(0, &req).unwrap_err();
    assert!(matches!(err, HarnessError::Protocol(ProtocolError::Encode(_))));

    let resp = deletetopics::Response {
        throttle_time_ms: 1,
        ..Default::default()
    };
    let mut out = Vec::new();
    let err = write_response(&mut out, 0, 1, &resp).unwrap_err();
    assert!(matches!(err, ProtocolError::Encode(_)));
    assert!(out.is_empty());
    test_response(1, &resp).unwrap();
}

#[test]
fn test_header_fields_preserved() {
    for (version, correlation_id, client_id) in [(0, 0, None), (1, -1, Some("")), (5, i32::MAX, Some("producer-7"))] {
        let mut out = Vec::new();
        write_request(&mut out, version, correlation_id, client_id, &delete_request()).unwrap();
        let frame = read_request(&mut out.as_slice()).unwrap();
        assert_eq!(frame.api_key(), ApiKey::DeleteTopics);
        assert_eq!(frame.api_version(), version);
        assert_eq!(frame.correlation_id(), correlation_id);
        assert_eq!(frame.client_id(), client_id);
    }
}

#[test]
fn test_every_truncation_is_short_frame() {
    let mut out = Vec::new();
    write_request(&mut out, 4, 1234, Some("me"), &delete_request()).unwrap();

    for cut in 0..out.len() {
        match read_request(&mut &out[..cut]) {
            Err(ProtocolError::ShortFrame { .. }) => {}
            other => panic!("cut at {} of {}: expected ShortFrame, got {:?}\n{}", cut, out.len(), other, hex_dump(&out)),
        }
    }
}

#[test]
fn test_garbage_body_is_decode_error() {
    // Declares 6 bytes: DeleteTopics v0, correlation id cut short.
    let input: &[u8] = &[0, 0, 0, 6, 0, 20, 0, 0, 0, 1];
    let err = read_request(&mut &input[..]).unwrap_err();
    assert!(matches!(err, ProtocolError::Decode(_)));
    assert!(err.is_decode_failure());
}

fn tagged_request() -> createpartitions::Request {
    createpartitions::Request {
        topics: vec![createpartitions::RequestTopic {
            name: "t".to_string(),
            count: 4,
            assignments: None,
            tagged_fields: TaggedFields::new().with(7, Bytes::from_static(b"topic-extra")),
        }],
        timeout_ms: 100,
        validate_only: true,
        tagged_fields: TaggedFields::new()
            .with(0, Bytes::from_static(b"\x01"))
            .with(300, Bytes::from_static(b"wide tag")),
    }
}

#[test]
fn test_unknown_tags_preserved() {
    let mut first = Vec::new();
    write_request(&mut first, 3, 1, Some("me"), &tagged_request()).unwrap();

    let frame = read_request(&mut first.as_slice()).unwrap();
    assert_eq!(frame.downcast::<createpartitions::Request>(), Some(&tagged_request()));

    let mut second = Vec::new();
    write_request(&mut second, 3, 1, Some("me"), frame.message()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unknown_tags_discarded() {
    let mut out = Vec::new();
    write_request(&mut out, 2, 1, Some("me"), &tagged_request()).unwrap();

    let config = CodecConfig::default().with_unknown_tags(UnknownTagPolicy::Discard);
    let frame = read_request_with(&mut out.as_slice(), &config).unwrap();
    let decoded = frame.downcast::<createpartitions::Request>().unwrap();
    assert!(decoded.tagged_fields.is_empty());
    assert!(decoded.topics[0].tagged_fields.is_empty());
    assert_eq!(decoded.topics[0].count, 4);
    assert!(decoded.validate_only);
}

#[test]
fn test_tags_rejected_in_legacy_versions() {
    let mut out = Vec::new();
    let err = write_request(&mut out, 1, 1, Some("me"), &tagged_request()).unwrap_err();
    assert!(matches!(err, ProtocolError::Encode(_)));
    assert!(out.is_empty());
}

#[test]
fn test_response_read_with_wrong_role() {
    let mut out = Vec::new();
    let err = write_response(&mut out, 0, 1, &delete_request()).unwrap_err();
    assert!(matches!(err, ProtocolError::Encode(_)));

    let resp = deletetopics::Response::default();
    write_response(&mut out, 0, 1, &resp).unwrap();
    let err = read_response(&mut out.as_slice(), ApiKey::DeleteTopics, 6).unwrap_err();
    assert!(matches!(err, ProtocolError::UnsupportedVersion { version: 6, .. }));
}

#[test]
fn test_decoder_fed_byte_by_byte() {
    let mut out = Vec::new();
    write_request(&mut out, 0, 10, Some("me"), &delete_request()).unwrap();
    write_request(&mut out, 5, 11, Some("me"), &delete_request()).unwrap();

    let mut decoder = FrameDecoder::new();
    let mut ids = Vec::new();
    for byte in &out {
        decoder.extend(std::slice::from_ref(byte));
        if let Some(frame) = decoder.decode_request().unwrap() {
            ids.push(frame.correlation_id());
        }
    }
    assert_eq!(ids, vec![10, 11]);
    assert_eq!(decoder.buffered(), 0);
}
