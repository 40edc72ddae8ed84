// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    string_port = { serde_json::json!({ "ip": "10.0.0.4", "port": "9001" }), "10.0.0.4:9001" },
    numeric_port = { serde_json::json!({ "ip": "10.0.0.4", "port": 9001 }), "10.0.0.4:9001" },
    padded = { serde_json::json!({ "ip": " 10.0.0.4 ", "port": " 9001 " }), "10.0.0.4:9001" },
    hostname = { serde_json::json!({ "ip": "agent-7.lan", "port": 80 }), "agent-7.lan:80" },
    ipv6 = { serde_json::json!({ "ip": "fe80::1", "port": 9001 }), "[fe80::1]:9001" },
)]
fn register_request_builds_address(body: serde_json::Value, expected: &str) {
    let address =
        serde_json::from_value::<RegisterRequest>(body).ok().and_then(|req| req.address().ok());
    assert_eq!(address.as_deref(), Some(expected));
}

#[yare::parameterized(
    empty = { serde_json::json!({}) },
    missing_port = { serde_json::json!({ "ip": "10.0.0.4" }) },
    missing_ip = { serde_json::json!({ "port": "9001" }) },
    blank_ip = { serde_json::json!({ "ip": "  ", "port": "9001" }) },
    blank_port = { serde_json::json!({ "ip": "10.0.0.4", "port": "" }) },
    zero_port = { serde_json::json!({ "ip": "10.0.0.4", "port": 0 }) },
    huge_port = { serde_json::json!({ "ip": "10.0.0.4", "port": 70000 }) },
    word_port = { serde_json::json!({ "ip": "10.0.0.4", "port": "http" }) },
)]
fn register_request_rejects(body: serde_json::Value) {
    let result = serde_json::from_value::<RegisterRequest>(body).map(|req| req.address());
    assert!(matches!(result, Ok(Err(RelayError::Validation(_)))), "{result:?}");
}

#[test]
fn parse_id_accepts_positive_integers_only() {
    assert_eq!(parse_id("12", "client").ok(), Some(12));
    for raw in ["0", "-3", "abc", "", "1.5"] {
        assert!(matches!(parse_id(raw, "client"), Err(RelayError::Validation(_))), "{raw}");
    }
}
