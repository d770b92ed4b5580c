//! Credential hashing for both FRITZ!Box protocols.
//! HTTP Digest (TR-064) and the MD5 challenge-response of the session login.

use crate::error::{FritzError, Result};
use md5::{Digest, Md5};

const DIGEST_SCHEME: &str = "Digest";

/// A parsed `WWW-Authenticate` challenge. Only held long enough to answer
/// the next request; replaced by the next 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub scheme: String,
    pub realm: String,
    pub nonce: String,
}

impl DigestChallenge {
    /// Parse a header such as
    /// `Digest realm="F!Box SOAP-Auth", nonce="55B5...", algorithm=MD5, qop="auth"`.
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
        if scheme != DIGEST_SCHEME {
            return Err(FritzError::Authentication(format!(
                "unexpected auth scheme: {}",
                scheme
            )));
        }

        let mut realm = None;
        let mut nonce = None;
        for (key, value) in split_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                _ => {}
            }
        }

        match (realm, nonce) {
            (Some(realm), Some(nonce)) => Ok(Self {
                scheme: scheme.to_string(),
                realm,
                nonce,
            }),
            _ => Err(FritzError::Authentication(
                "challenge without realm or nonce".to_string(),
            )),
        }
    }

    /// Compute `MD5( MD5(user:realm:pass) : nonce : MD5(METHOD:uri) )`.
    pub fn response(&self, username: &str, password: &str, method: &str, uri: &str) -> String {
        let ha1 = md5_hex(format!("{}:{}:{}", username, self.realm, password).as_bytes());
        let ha2 = md5_hex(format!("{}:{}", method, uri).as_bytes());
        md5_hex(format!("{}:{}:{}", ha1, self.nonce, ha2).as_bytes())
    }

    /// Assemble the minimal `Authorization` value, without qop or cnonce.
    pub fn authorization(&self, username: &str, password: &str, method: &str, uri: &str) -> String {
        format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            urlencoding::encode(username),
            self.realm,
            self.nonce,
            uri,
            self.response(username, password, method, uri)
        )
    }
}

/// Answer a session-login challenge: `challenge-MD5(UTF-16LE(challenge-password))`.
pub fn session_response(challenge: &str, password: &str) -> String {
    let plain = format!("{}-{}", challenge, password);
    let utf16: Vec<u8> = plain.encode_utf16().flat_map(u16::to_le_bytes).collect();
    format!("{}-{}", challenge, md5_hex(&utf16))
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Split `key="value", key=value` pairs, honouring commas inside quotes.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in params.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}
