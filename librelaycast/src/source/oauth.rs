//! OAuth 1.0a request signing (HMAC-SHA1, user context)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha1::Sha1;

use crate::config::XCredentials;
use crate::error::SourceError;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";

/// RFC 3986 percent-encoding, as OAuth requires (space is `%20`, `~` is kept)
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Signs requests with the four user-context credentials
#[derive(Debug)]
pub struct OAuth1Signer {
    credentials: XCredentials,
}

impl OAuth1Signer {
    pub fn new(credentials: XCredentials) -> Self {
        Self { credentials }
    }

    /// `Authorization` header value for a request
    ///
    /// `params` are the query (or form body) parameters sent with the
    /// request; they are part of the signature. `url` must not carry a query
    /// string.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, SourceError> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_with(method, url, params, &nonce, &timestamp)
    }

    /// Same as [`OAuth1Signer::authorization`] with a fixed nonce and timestamp
    pub fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, SourceError> {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.api_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.credentials.access_token.as_str()),
            ("oauth_version", VERSION),
        ];

        let mut all_params: Vec<(&str, &str)> = oauth_params.clone();
        all_params.extend_from_slice(params);

        let base = signature_base_string(method, url, &all_params);
        let signature = self.sign(&base)?;

        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort();

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }

    fn sign(&self, base: &str) -> Result<String, SourceError> {
        let key = format!(
            "{}&{}",
            encode(self.credentials.api_secret.expose_secret()),
            encode(self.credentials.access_secret.expose_secret())
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .map_err(|e| SourceError::Authentication(format!("Invalid signing key: {}", e)))?;
        mac.update(base.as_bytes());

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// `METHOD&url&params`, each part percent-encoded, params sorted after encoding
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base_url = url.split('?').next().unwrap_or(url);

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(base_url),
        encode(&param_string)
    )
}
