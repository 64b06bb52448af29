//! Query-string request signing (signature version 2, HMAC-SHA256).

use crate::config::Credentials;
use crate::utils::error::{DataSourceError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

pub const SIGNATURE_METHOD: &str = "HmacSHA256";
pub const SIGNATURE_VERSION: &str = "2";
pub const API_VERSION: &str = "2012-11-05";

type HmacSha256 = Hmac<Sha256>;

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - _ . ~` is escaped.
pub fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Parameters sorted by key bytes, encoded and joined with `&`.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, host: &str, path: &str, canonical_query: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!("{}\n{}\n{}\n{}", method, host.to_ascii_lowercase(), path, canonical_query)
}

pub fn sign(secret_key: &str, string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| DataSourceError::config(format!("unusable secret key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Adds the authentication parameters to `params` and returns the signed
/// query string for a `GET` to `host` + `path`.
pub fn signed_query(
    mut params: BTreeMap<String, String>,
    credentials: &Credentials,
    host: &str,
    path: &str,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    params.remove("Signature");
    params.insert("AWSAccessKeyId".to_string(), credentials.access_key.clone());
    params.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
    params.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
    params.insert(
        "Timestamp".to_string(),
        timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    params
        .entry("Version".to_string())
        .or_insert_with(|| API_VERSION.to_string());

    let canonical = canonical_query(&params);
    let signature = sign(
        &credentials.secret_key,
        &string_to_sign("GET", host, path, &canonical),
    )?;

    Ok(format!("{}&Signature={}", canonical, encode(&signature)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn credentials() -> Credentials {
        Credentials {
            access_key: "test.access.key".to_string(),
            secret_key: "test.secret.key".to_string(),
        }
    }

    #[test]
    fn test_list_queues_signature() {
        let canonical = canonical_query(&params(&[("Action", "ListQueues")]));
        assert_eq!(canonical, "Action=ListQueues");

        let sts = string_to_sign("GET", "sqs.test.amazonaws.com", "/", &canonical);
        assert_eq!(sts, "GET\nsqs.test.amazonaws.com\n/\nAction=ListQueues");
        assert_eq!(
            sign("test.secret.key", &sts).unwrap(),
            "kbuD3tYcrSt90EBp6LbCGEzwW5yYg9i0VkwA1EsjFQA="
        );
    }

    #[test]
    fn test_canonical_query_sorts_by_byte_order_and_encodes() {
        let canonical = canonical_query(&params(&[
            ("MessageBody", "hello world & more"),
            ("Action", "SendMessage"),
            ("AWSAccessKeyId", "key"),
        ]));
        assert_eq!(
            canonical,
            "AWSAccessKeyId=key&Action=SendMessage&MessageBody=hello%20world%20%26%20more"
        );
    }

    #[test]
    fn test_signed_query_adds_auth_parameters() {
        let timestamp = Utc.with_ymd_and_hms(2012, 5, 1, 12, 0, 0).unwrap();
        let query = signed_query(
            params(&[("Action", "ListQueues")]),
            &credentials(),
            "sqs.test.amazonaws.com",
            "/",
            timestamp,
        )
        .unwrap();

        assert_eq!(
            query,
            "AWSAccessKeyId=test.access.key&Action=ListQueues&SignatureMethod=HmacSHA256\
             &SignatureVersion=2&Timestamp=2012-05-01T12%3A00%3A00Z&Version=2012-11-05\
             &Signature=r6krA23yZYkDjyyF4gVcI3tg5kwJya3hvXG%2BUXpvWVw%3D"
        );
    }

    #[test]
    fn test_signed_query_on_queue_path() {
        let timestamp = Utc.with_ymd_and_hms(2012, 5, 1, 12, 0, 0).unwrap();
        let query = signed_query(
            params(&[("Action", "SendMessage"), ("MessageBody", "hello world & more")]),
            &credentials(),
            "sqs.test.amazonaws.com",
            "/123456789012/orders",
            timestamp,
        )
        .unwrap();

        assert!(query.ends_with(&format!(
            "Signature={}",
            encode("Ooo8K8OqoEEDXMcU9utkflgb5qUTNlBX5inPBr8nAdY=")
        )));
    }
}
