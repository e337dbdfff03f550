//! HMAC request signing for authenticated CLOB endpoints.
//!
//! The signature scheme: the shared secret is URL-safe base64; the signed
//! message is `timestamp || method || path` where `path` excludes query
//! parameters; the signature is HMAC-SHA-256, emitted as URL-safe base64.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// CLOB API credentials. Absence of any component disables authenticated
/// endpoints rather than failing requests.
#[derive(Debug, Clone)]
pub struct ClobAuth {
    pub api_key: String,
    /// URL-safe base64-encoded shared secret.
    pub secret: String,
    pub passphrase: String,
    /// Wallet address associated with the API key.
    pub address: String,
}

impl ClobAuth {
    /// Sign `timestamp || method || path`.
    ///
    /// `path` must not include query parameters.
    pub fn sign(&self, timestamp: i64, method: &str, path: &str) -> Result<String> {
        debug_assert!(!path.contains('?'), "sign path must exclude the query");
        let key = URL_SAFE
            .decode(&self.secret)
            .map_err(|e| Error::Config(format!("API secret is not valid base64: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| Error::Config(format!("API secret rejected by HMAC: {e}")))?;
        mac.update(format!("{timestamp}{method}{path}").as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    /// Build the five auth headers for a request.
    pub fn headers(&self, timestamp: i64, method: &str, path: &str) -> Result<HeaderMap> {
        let signature = self.sign(timestamp, method, path)?;
        let mut headers = HeaderMap::new();
        let put = |headers: &mut HeaderMap, name: &'static str, value: &str| -> Result<()> {
            headers.insert(
                name,
                HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("invalid header value for {name}: {e}")))?,
            );
            Ok(())
        };
        put(&mut headers, "POLY_ADDRESS", &self.address)?;
        put(&mut headers, "POLY_SIGNATURE", &signature)?;
        put(&mut headers, "POLY_TIMESTAMP", &timestamp.to_string())?;
        put(&mut headers, "POLY_API_KEY", &self.api_key)?;
        put(&mut headers, "POLY_PASSPHRASE", &self.passphrase)?;
        Ok(headers)
    }
}
