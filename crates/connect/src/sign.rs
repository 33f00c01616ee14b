//! Request signing: nonce generation, canonical strings, keyed hashing.
//!
//! The HMAC variant, output encoding and header names are venue
//! configuration, not code - one `RequestSigner` per venue instance.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use hermes_clock::Clock;

use crate::credentials::Credentials;
use crate::error::ConnectError;
use crate::request::{AuthKind, RequestDescriptor, SignedRequest};

/// HMAC variant used by a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HmacAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

/// Signature output encoding used by a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

/// Venue signing convention: algorithm, encoding and header names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureScheme {
    pub algorithm: HmacAlgorithm,
    pub encoding: SignatureEncoding,
    pub api_key_header: String,
    pub signature_header: String,
    pub nonce_header: String,
    #[serde(default)]
    pub passphrase_header: Option<String>,
}

impl Default for SignatureScheme {
    fn default() -> Self {
        SignatureScheme {
            algorithm: HmacAlgorithm::Sha256,
            encoding: SignatureEncoding::Hex,
            api_key_header: "X-API-KEY".to_string(),
            signature_header: "X-SIGNATURE".to_string(),
            nonce_header: "X-NONCE".to_string(),
            passphrase_header: None,
        }
    }
}

/// Compute an encoded HMAC over `message` with the given venue convention.
///
/// Also used by `WireProtocol` implementations that sign login frames.
pub fn compute_hmac(
    algorithm: HmacAlgorithm,
    encoding: SignatureEncoding,
    secret: &[u8],
    message: &str,
) -> Result<String, ConnectError> {
    let bytes = match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|e| ConnectError::Protocol(format!("invalid HMAC key: {e}")))?;
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                .map_err(|e| ConnectError::Protocol(format!("invalid HMAC key: {e}")))?;
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|e| ConnectError::Protocol(format!("invalid HMAC key: {e}")))?;
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(match encoding {
        SignatureEncoding::Hex => hex::encode(bytes),
        SignatureEncoding::Base64 => BASE64.encode(bytes),
    })
}

/// Signs requests for one venue.
///
/// Stateless apart from the nonce guard: an atomic keeps nonces strictly
/// increasing even when concurrent calls land on the same clock
/// millisecond.
pub struct RequestSigner {
    base_url: String,
    scheme: SignatureScheme,
    credentials: Option<Credentials>,
    clock: Arc<dyn Clock>,
    last_nonce: AtomicI64,
}

impl RequestSigner {
    pub fn new(
        base_url: impl Into<String>,
        scheme: SignatureScheme,
        credentials: Option<Credentials>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RequestSigner {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scheme,
            credentials,
            clock,
            last_nonce: AtomicI64::new(0),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Produce a signed request for one dispatch attempt.
    ///
    /// Public endpoints pass through unsigned. Private endpoints get a
    /// fresh nonce, so each retry attempt must re-sign.
    pub fn sign(&self, descriptor: &RequestDescriptor) -> Result<SignedRequest, ConnectError> {
        let query = sorted_query(&descriptor.query);
        let url = self.build_url(&descriptor.path, &query);

        match descriptor.auth {
            AuthKind::Public => Ok(SignedRequest {
                method: descriptor.method,
                url,
                headers: Vec::new(),
                body: descriptor.body.clone(),
            }),
            AuthKind::Private => {
                let creds = self
                    .credentials
                    .as_ref()
                    .ok_or(ConnectError::MissingCredentials)?;

                let nonce = self.next_nonce();
                let canonical = canonical_string(descriptor, &query);
                let signature = compute_hmac(
                    self.scheme.algorithm,
                    self.scheme.encoding,
                    creds.secret(),
                    &canonical,
                )?;

                let mut headers = vec![
                    (self.scheme.api_key_header.clone(), creds.api_key().to_string()),
                    (self.scheme.nonce_header.clone(), nonce.to_string()),
                    (self.scheme.signature_header.clone(), signature),
                ];
                if let (Some(header), Some(passphrase)) =
                    (&self.scheme.passphrase_header, creds.passphrase())
                {
                    headers.push((header.clone(), passphrase.to_string()));
                }

                Ok(SignedRequest {
                    method: descriptor.method,
                    url,
                    headers,
                    body: descriptor.body.clone(),
                })
            }
        }
    }

    /// Next nonce: clock milliseconds, bumped past the previous value when
    /// the clock has not moved. Never repeats, never decreases.
    pub fn next_nonce(&self) -> i64 {
        let now = self.clock.now_millis();
        let mut prev = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_nonce.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn build_url(&self, path: &str, encoded_query: &str) -> String {
        if encoded_query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, encoded_query)
        }
    }
}

/// Urlencode query pairs in sorted key order for a canonical representation
fn sorted_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<_> = query.iter().collect();
    pairs.sort();

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Canonical string: method + path + sorted query + body, newline-joined
fn canonical_string(descriptor: &RequestDescriptor, encoded_query: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        descriptor.method.as_str(),
        descriptor.path,
        encoded_query,
        descriptor.body.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HttpMethod;
    use hermes_clock::ManualClock;

    fn signer(credentials: Option<Credentials>) -> RequestSigner {
        RequestSigner::new(
            "https://api.example.com",
            SignatureScheme::default(),
            credentials,
            Arc::new(ManualClock::at_millis(1_700_000_000_000)),
        )
    }

    fn private_descriptor() -> RequestDescriptor {
        RequestDescriptor::private("testvenue", HttpMethod::Post, "/v1/order")
            .with_query("symbol", "BTCUSDT")
            .with_body(r#"{"qty":"1"}"#)
    }

    #[test]
    fn test_public_request_passes_through_unsigned() {
        let signer = signer(None);
        let desc = RequestDescriptor::public("testvenue", HttpMethod::Get, "/v1/depth")
            .with_query("limit", "100")
            .with_query("symbol", "BTCUSDT");

        let signed = signer.sign(&desc).unwrap();
        assert!(signed.headers.is_empty());
        assert_eq!(
            signed.url,
            "https://api.example.com/v1/depth?limit=100&symbol=BTCUSDT"
        );
    }

    #[test]
    fn test_private_without_credentials_fails() {
        let signer = signer(None);
        let err = signer.sign(&private_descriptor()).unwrap_err();
        assert!(matches!(err, ConnectError::MissingCredentials));
    }

    #[test]
    fn test_private_request_carries_auth_headers() {
        let signer = signer(Some(Credentials::new("key", "secret")));
        let signed = signer.sign(&private_descriptor()).unwrap();

        let names: Vec<_> = signed.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["X-API-KEY", "X-NONCE", "X-SIGNATURE"]);

        // HMAC-SHA256 hex output is 64 characters
        let signature = &signed.headers[2].1;
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_nonce_monotonic_with_frozen_clock() {
        let signer = signer(Some(Credentials::new("key", "secret")));
        let nonces: Vec<i64> = (0..5).map(|_| signer.next_nonce()).collect();
        for pair in nonces.windows(2) {
            assert!(pair[1] > pair[0], "nonce must strictly increase");
        }
        assert_eq!(nonces[0], 1_700_000_000_000);
    }

    #[test]
    fn test_nonce_monotonic_across_threads() {
        let signer = Arc::new(signer(Some(Credentials::new("key", "secret"))));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let signer = Arc::clone(&signer);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| signer.next_nonce()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "nonces must never repeat");
    }

    #[test]
    fn test_canonical_string_is_sorted_and_stable() {
        let desc = private_descriptor().with_query("alpha", "1");
        let encoded = sorted_query(&desc.query);
        let canonical = canonical_string(&desc, &encoded);
        assert_eq!(
            canonical,
            "POST\n/v1/order\nalpha=1&symbol=BTCUSDT\n{\"qty\":\"1\"}"
        );
    }

    #[test]
    fn test_base64_encoding_scheme() {
        let scheme = SignatureScheme {
            algorithm: HmacAlgorithm::Sha512,
            encoding: SignatureEncoding::Base64,
            ..SignatureScheme::default()
        };
        let signer = RequestSigner::new(
            "https://api.example.com",
            scheme,
            Some(Credentials::new("key", "secret")),
            Arc::new(ManualClock::at_millis(1_700_000_000_000)),
        );
        let signed = signer.sign(&private_descriptor()).unwrap();

        let signature = &signed.headers[2].1;
        let decoded = BASE64.decode(signature).unwrap();
        assert_eq!(decoded.len(), 64); // SHA-512 digest size
    }
}
