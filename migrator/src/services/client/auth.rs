//! MAC request signing for identity server calls
//!
//! The normalized request string is
//! `ts\nnonce\nMETHOD\nrequest-uri\nhost\nport\n\n` (empty ext), signed with the
//! descriptor's shared key and sent as a `MAC` authorization header.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

use super::errors::{ClientError, ClientResult};
use super::types::AuthSecret;

type HmacSha256 = Hmac<Sha256>;

pub const MAC_ALGORITHM_SHA256: &str = "hmac-sha-256";

/// Random nonce for one request
pub fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; 6]>())
}

pub fn normalized_request_string(
    ts: i64,
    nonce: &str,
    method: &str,
    request_uri: &str,
    host: &str,
    port: u16,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n\n",
        ts, nonce, method, request_uri, host, port
    )
}

/// Build the `Authorization` header value for a request
pub fn authorization_header(
    secret: &AuthSecret,
    method: &str,
    url: &Url,
    ts: i64,
    nonce: &str,
) -> ClientResult<String> {
    if secret.mac_algorithm != MAC_ALGORITHM_SHA256 {
        return Err(ClientError::Signing {
            message: format!("unsupported MAC algorithm '{}'", secret.mac_algorithm),
        });
    }

    let host = url.host_str().ok_or_else(|| ClientError::Signing {
        message: format!("URL has no host: {}", url),
    })?;
    let port = url.port_or_known_default().ok_or_else(|| ClientError::Signing {
        message: format!("URL has no port: {}", url),
    })?;

    let mut request_uri = url.path().to_string();
    if let Some(query) = url.query() {
        request_uri.push('?');
        request_uri.push_str(query);
    }

    let normalized = normalized_request_string(ts, nonce, method, &request_uri, host, port);

    let mut mac =
        HmacSha256::new_from_slice(secret.mac_key.as_bytes()).map_err(|e| ClientError::Signing {
            message: format!("invalid MAC key: {}", e),
        })?;
    mac.update(normalized.as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        r#"MAC id="{}", ts="{}", nonce="{}", mac="{}""#,
        secret.mac_key_id, ts, nonce, digest
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> AuthSecret {
        AuthSecret {
            mac_key_id: "u:d9b1".to_string(),
            mac_key: "2b5b1b9a5e1f".to_string(),
            mac_algorithm: MAC_ALGORITHM_SHA256.to_string(),
        }
    }

    #[test]
    fn test_normalized_request_string_layout() {
        let normalized =
            normalized_request_string(1_355_000_000, "abc123", "GET", "/posts?limit=2", "example.com", 443);
        assert_eq!(
            normalized,
            "1355000000\nabc123\nGET\n/posts?limit=2\nexample.com\n443\n\n"
        );
    }

    #[test]
    fn test_header_is_deterministic_for_same_inputs() {
        let url = Url::parse("https://example.com/tent/posts?limit=2").unwrap();
        let first = authorization_header(&secret(), "GET", &url, 1_355_000_000, "abc123").unwrap();
        let second = authorization_header(&secret(), "GET", &url, 1_355_000_000, "abc123").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(r#"MAC id="u:d9b1", ts="1355000000", nonce="abc123", mac=""#));
    }

    #[test]
    fn test_header_changes_with_query() {
        let a = Url::parse("https://example.com/posts?limit=2").unwrap();
        let b = Url::parse("https://example.com/posts?limit=3").unwrap();
        let first = authorization_header(&secret(), "GET", &a, 1, "n").unwrap();
        let second = authorization_header(&secret(), "GET", &b, 1, "n").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_unsupported_algorithm_is_rejected() {
        let mut secret = secret();
        secret.mac_algorithm = "hmac-sha-1".to_string();
        let url = Url::parse("https://example.com/posts").unwrap();
        let result = authorization_header(&secret, "GET", &url, 1, "n");
        assert!(matches!(result, Err(ClientError::Signing { .. })));
    }

    #[test]
    fn test_nonce_is_hex() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 12);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
