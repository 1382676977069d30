//! Validation and deserialization tests for [`TransportOptions`].

use std::time::Duration;

use rstest::rstest;

use super::*;

#[rstest]
#[case::tcp(TransportKind::Tcp)]
#[case::udp(TransportKind::Udp)]
fn network_kinds_require_a_port(#[case] kind: TransportKind) {
    let err = TransportOptions::builder(kind)
        .build()
        .expect_err("port must be required");
    assert!(matches!(err, ConfigError::MissingPort(k) if k == kind));
}

#[test]
fn unix_kind_needs_no_port() {
    let options = TransportOptions::builder(TransportKind::Unix)
        .build()
        .expect("unix options without port");
    assert_eq!(options.port(), None);
    assert_eq!(options.read_chunk_size(), DEFAULT_STREAM_CHUNK_SIZE);
}

#[test]
fn defaults_follow_the_stream_profile() {
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(389)
        .build()
        .expect("tcp options");
    assert_eq!(options.timeout_connect(), Duration::from_secs(3));
    assert_eq!(options.timeout_read(), Duration::from_secs(15));
    assert_eq!(options.idle_timeout(), Duration::from_secs(600));
    assert_eq!(options.read_chunk_size(), 8192);
    assert!(!options.tls().enabled());
    assert!(options.tls().validate_cert());
    assert!(!options.tls().allow_self_signed());
    assert_eq!(options.tls().method(), TlsMethod::Any);
}

#[test]
fn datagram_chunk_size_defaults_to_max_payload() {
    let options = TransportOptions::builder(TransportKind::Udp)
        .port(53)
        .build()
        .expect("udp options");
    assert_eq!(options.read_chunk_size(), MAX_DATAGRAM_SIZE);
}

#[rstest]
#[case::udp(TransportKind::Udp, Some(53))]
#[case::unix(TransportKind::Unix, None)]
fn tls_is_rejected_off_tcp(#[case] kind: TransportKind, #[case] port: Option<u16>) {
    let mut builder = TransportOptions::builder(kind).use_tls(true);
    if let Some(port) = port {
        builder = builder.port(port);
    }
    let err = builder.build().expect_err("tls must be rejected");
    assert!(matches!(err, ConfigError::TlsUnsupported(k) if k == kind));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let err = TransportOptions::builder(TransportKind::Unix)
        .read_chunk_size(0)
        .build()
        .expect_err("zero chunk size");
    assert!(matches!(err, ConfigError::ZeroChunkSize));
}

#[test]
fn read_timeout_override_keeps_other_fields() {
    let options = TransportOptions::builder(TransportKind::Tcp)
        .port(10389)
        .idle_timeout(Duration::from_secs(42))
        .build()
        .expect("tcp options");
    let idle = options.with_read_timeout(options.idle_timeout());
    assert_eq!(idle.timeout_read(), Duration::from_secs(42));
    assert_eq!(idle.port(), Some(10389));
    assert_eq!(idle.idle_timeout(), options.idle_timeout());
}

#[rstest]
#[case("tcp", TransportKind::Tcp)]
#[case("udp", TransportKind::Udp)]
#[case("unix", TransportKind::Unix)]
fn transport_names_parse(#[case] name: &str, #[case] expected: TransportKind) {
    assert_eq!(name.parse::<TransportKind>().expect("known kind"), expected);
    assert_eq!(expected.to_string(), name);
}

#[test]
fn unknown_transport_name_is_a_config_error() {
    let err = "sctp".parse::<TransportKind>().expect_err("unknown kind");
    assert!(matches!(err, ConfigError::InvalidTransport(ref name) if name == "sctp"));
    assert_eq!(
        err.to_string(),
        "the transport \"sctp\" is not valid; it must be one of: tcp,udp,unix"
    );
}

#[test]
fn deserializes_flat_option_names() {
    let options: TransportOptions = serde_json::from_value(serde_json::json!({
        "transport": "tcp",
        "port": 636,
        "use_tls": true,
        "tls_validate_cert": false,
        "tls_peer_name": "ldap.example.com",
        "tls_method": "tls1.3",
        "timeout_connect": 1,
        "timeout_read": 30,
        "read_chunk_size": 4096
    }))
    .expect("valid options");

    assert_eq!(options.kind(), TransportKind::Tcp);
    assert_eq!(options.port(), Some(636));
    assert!(options.tls().enabled());
    assert!(!options.tls().validate_cert());
    assert_eq!(options.tls().peer_name(), Some("ldap.example.com"));
    assert_eq!(options.tls().method(), TlsMethod::Tls13);
    assert_eq!(options.timeout_connect(), Duration::from_secs(1));
    assert_eq!(options.timeout_read(), Duration::from_secs(30));
    assert_eq!(options.read_chunk_size(), 4096);
}

#[rstest]
#[case::bad_kind(serde_json::json!({"transport": "pipe", "port": 1}), "not valid")]
#[case::missing_port(serde_json::json!({"transport": "udp"}), "port is required")]
#[case::bad_method(
    serde_json::json!({"transport": "tcp", "port": 1, "tls_method": "ssl3"}),
    "unknown TLS method"
)]
#[case::unknown_key(serde_json::json!({"transport": "tcp", "port": 1, "buffer": 3}), "unknown field")]
fn invalid_documents_fail_to_deserialize(
    #[case] document: serde_json::Value,
    #[case] expected: &str,
) {
    let err = serde_json::from_value::<TransportOptions>(document).expect_err("invalid options");
    assert!(
        err.to_string().contains(expected),
        "unexpected error message: {err}"
    );
}
