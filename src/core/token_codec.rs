//! Reversible SynData token encoding.
//!
//! A token is `b64(b64(md5hex(SALT)) ":" b64(b64(json)) ":" b64(md5hex(SECRET)))`.
//! The embedded salt and secret only make tampering evident; they are part
//! of the token format and must stay byte-identical so existing tokens keep
//! decoding. This is an encoding, not encryption.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

const SALT: &str = "0UgQLJiESKyELbVqsgrLJsFXSIF";
const SECRET: &str = "parangaricutirimirruaro";

/// Host/database pair carried inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynData {
    #[serde(rename = "SynDb")]
    pub database: String,
    #[serde(rename = "SynHost")]
    pub host: String,
}

impl SynData {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(encode_str(&json))
    }

    pub fn decode(token: &str) -> Option<Self> {
        let json = decode_str(token)?;
        serde_json::from_str(&json).ok()
    }
}

impl fmt::Display for SynData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SynData {{ Host: {}, Database: {} }}", self.host, self.database)
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn b64(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

fn unb64(input: &str) -> Option<String> {
    let bytes = STANDARD.decode(input.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Wrap an arbitrary string in the token format
pub fn encode_str(input: &str) -> String {
    let salt_hash = b64(&md5_hex(SALT));
    let payload = b64(&b64(input));
    let secret_hash = b64(&md5_hex(SECRET));

    b64(&format!("{}:{}:{}", salt_hash, payload, secret_hash))
}

/// Unwrap a token, or `None` when it is malformed or its hashes do not
/// match the embedded salt and secret
pub fn decode_str(token: &str) -> Option<String> {
    let decoded = unb64(token.trim())?;
    let parts: Vec<&str> = decoded.split(':').collect();
    let [salt_part, payload_part, secret_part] = parts.as_slice() else {
        return None;
    };

    let salt_hash = unb64(salt_part)?;
    let payload = unb64(&unb64(payload_part)?)?;
    let secret_hash = unb64(secret_part)?;

    let trusted = salt_hash.eq_ignore_ascii_case(&md5_hex(SALT))
        && secret_hash.eq_ignore_ascii_case(&md5_hex(SECRET));

    trusted.then_some(payload)
}
