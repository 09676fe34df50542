//! Versioned scan payload decoding.
//!
//! The wire format is a flat (non-internally-tagged) JSON object selected by
//! an integer `data_version`: version 1 carries its response body as base64
//! (mirroring Go's implicit `[]byte` JSON marshaling), version 2 carries it
//! as plain text. Both variants' keys may be present on the same object; only
//! `data_version` decides which one is read.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::DataError;

#[derive(Debug, Deserialize)]
struct ScanWire {
    ip: String,
    port: u32,
    service: String,
    timestamp: i64,
    data_version: i64,
    #[serde(default)]
    response_bytes_utf8: Option<String>,
    #[serde(default)]
    response_str: Option<String>,
}

/// A decoded, canonical host-scan record ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scan {
    pub ip: IpAddr,
    pub port: u32,
    pub service: String,
    pub timestamp: i64,
    pub response: String,
}

/// Decodes one bus message body into a [`Scan`].
pub fn decode(bytes: &[u8]) -> Result<Scan, DataError> {
    let wire: ScanWire = serde_json::from_slice(bytes)?;

    let response = match wire.data_version {
        1 => {
            let encoded = wire
                .response_bytes_utf8
                .as_deref()
                .ok_or(DataError::MissingField(1, "response_bytes_utf8"))?;
            let raw = BASE64.decode(encoded)?;
            String::from_utf8(raw)?
        }
        2 => wire
            .response_str
            .ok_or(DataError::MissingField(2, "response_str"))?,
        other => return Err(DataError::UnsupportedVersion(other)),
    };

    let ip: IpAddr = wire.ip.parse()?;

    Ok(Scan {
        ip,
        port: wire.port,
        service: wire.service,
        timestamp: wire.timestamp,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_version_one_base64_body() {
        let body = serde_json::json!({
            "ip": "10.0.0.1",
            "port": 443,
            "service": "https",
            "timestamp": 1_700_000_000,
            "data_version": 1,
            "response_bytes_utf8": BASE64.encode("hello"),
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.response, "hello");
        assert_eq!(scan.port, 443);
        assert_eq!(scan.timestamp, 1_700_000_000);
        assert_eq!(scan.ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn decodes_version_two_plain_body() {
        let body = serde_json::json!({
            "ip": "::1",
            "port": 22,
            "service": "ssh",
            "timestamp": 0,
            "data_version": 2,
            "response_str": "SSH-2.0-OpenSSH",
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.response, "SSH-2.0-OpenSSH");
        assert_eq!(scan.timestamp, 0);
        assert!(scan.ip.is_ipv6());
    }

    #[test]
    fn ignores_stale_sibling_fields() {
        // Both fields present; data_version still decides.
        let body = serde_json::json!({
            "ip": "127.0.0.1",
            "port": 80,
            "service": "http",
            "timestamp": 1_700_000_000,
            "data_version": 2,
            "response_bytes_utf8": BASE64.encode("wrong"),
            "response_str": "right",
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.response, "right");
    }

    #[test]
    fn rejects_unsupported_version() {
        let body = serde_json::json!({
            "ip": "127.0.0.1",
            "port": 80,
            "service": "http",
            "timestamp": 0,
            "data_version": 3,
        });
        let err = decode(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedVersion(3)));
    }

    #[test]
    fn rejects_missing_version_one_field() {
        let body = serde_json::json!({
            "ip": "127.0.0.1",
            "port": 80,
            "service": "http",
            "timestamp": 0,
            "data_version": 1,
        });
        let err = decode(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::MissingField(1, "response_bytes_utf8")));
    }

    #[test]
    fn rejects_invalid_base64() {
        let body = serde_json::json!({
            "ip": "127.0.0.1",
            "port": 80,
            "service": "http",
            "timestamp": 0,
            "data_version": 1,
            "response_bytes_utf8": "not-base64!!",
        });
        let err = decode(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::InvalidBase64(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, DataError::Malformed(_)));
    }

    #[test]
    fn accepts_boundary_ports_and_empty_service() {
        let body = serde_json::json!({
            "ip": "0.0.0.0",
            "port": 0,
            "service": "",
            "timestamp": 0,
            "data_version": 2,
            "response_str": "",
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.port, 0);
        assert_eq!(scan.service, "");
        assert_eq!(scan.response, "");

        let body = serde_json::json!({
            "ip": "255.255.255.255",
            "port": 65535,
            "service": "x",
            "timestamp": 0,
            "data_version": 2,
            "response_str": "y",
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.port, 65535);
    }

    #[test]
    fn timestamp_zero_round_trips_to_unix_epoch() {
        let body = serde_json::json!({
            "ip": "127.0.0.1",
            "port": 80,
            "service": "http",
            "timestamp": 0,
            "data_version": 2,
            "response_str": "",
        });
        let scan = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(scan.timestamp, 0);
    }
}
