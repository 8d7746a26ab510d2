use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST, HeaderName, HeaderValue};
use reqwest::{Method, Request, Url};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use sha2::{Digest, Sha256};

use super::SignatureScheme;
use crate::error::SignError;

/// File name of the private key inside the signing secret directory.
pub const KEY_FILE: &str = "http-signing-private-key";

/// `keyId` advertised in every signature.
pub const KEY_ID: &str = "callback";

/// Ordered header list covered by the signature.
pub const SIGNED_HEADERS: &str = "(request-target) host date content-type digest content-length";

const DIGEST: HeaderName = HeaderName::from_static("digest");
const OPAQUE_CONTENT_TYPE: &str = "application/octet-stream";
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Callback request signer.
#[derive(Clone, Debug, Default)]
pub enum Signer {
    /// No key mounted; requests are sent unsigned.
    #[default]
    Disabled,
    /// RSA PKCS#1 v1.5 with SHA-256.
    Rsa(RsaSigner),
}

impl Signer {
    /// Loads the signing key from `dir/http-signing-private-key`.
    ///
    /// A missing file yields [`Signer::Disabled`]; an unreadable or malformed file is an error.
    pub fn from_secrets(dir: &Path, scheme: SignatureScheme, debug: bool) -> Result<Self, SignError> {
        let path = dir.join(KEY_FILE);
        match std::fs::read_to_string(&path) {
            Ok(pem) => {
                let signer = Self::from_pem(&pem, scheme, debug)?;
                tracing::info!(path = %path.display(), "http signatures enabled");
                Ok(signer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "http signatures disabled, callback messages will not be signed"
                );
                Ok(Signer::Disabled)
            }
            Err(e) => Err(SignError::ReadKey {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Builds an active signer from a PEM encoded RSA private key (PKCS#1 or PKCS#8).
    pub fn from_pem(pem: &str, scheme: SignatureScheme, debug: bool) -> Result<Self, SignError> {
        let key = match RsaPrivateKey::from_pkcs1_pem(pem) {
            Ok(key) => key,
            Err(pkcs1) => RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|_| SignError::ParseKey(pkcs1.to_string()))?,
        };
        Ok(Signer::Rsa(RsaSigner {
            key: Arc::new(SigningKey::<Sha256>::new(key)),
            scheme,
            debug,
        }))
    }

    /// True when requests will actually be signed.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Signer::Rsa(_))
    }

    /// Signs `req` in place. No-op for [`Signer::Disabled`].
    pub fn sign(&self, req: &mut Request) -> Result<(), SignError> {
        match self {
            Signer::Disabled => Ok(()),
            Signer::Rsa(rsa) => rsa.sign(req),
        }
    }
}

/// Active RSA signer.
#[derive(Clone)]
pub struct RsaSigner {
    key: Arc<SigningKey<Sha256>>,
    scheme: SignatureScheme,
    debug: bool,
}

impl fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigner")
            .field("scheme", &self.scheme)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl RsaSigner {
    fn sign(&self, req: &mut Request) -> Result<(), SignError> {
        let host = host_of(req.url());
        let (digest, len) = {
            let body = match req.body() {
                None => &[][..],
                Some(b) => b
                    .as_bytes()
                    .ok_or_else(|| SignError::Sign("streaming body cannot be digested".into()))?,
            };
            (content_digest(body), body.len())
        };

        let headers = req.headers_mut();
        if !headers.contains_key(HOST) {
            headers.insert(HOST, value(&host, "host")?);
        }
        if !headers.contains_key(DATE) {
            let now = chrono::Utc::now().format(HTTP_DATE).to_string();
            headers.insert(DATE, value(&now, "date")?);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(OPAQUE_CONTENT_TYPE));
        }
        if !headers.contains_key(DIGEST) {
            headers.insert(DIGEST, value(&digest, "digest")?);
        }
        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }

        let plain = signing_string(req)?;
        let sig = self
            .key
            .try_sign(plain.as_bytes())
            .map_err(|e| SignError::Sign(e.to_string()))?;
        let params = format!(
            "keyId=\"{KEY_ID}\",algorithm=\"rsa-sha256\",headers=\"{SIGNED_HEADERS}\",signature=\"{}\"",
            BASE64.encode(sig.to_bytes())
        );
        let header = match self.scheme {
            SignatureScheme::Authorization => format!("Signature {params}"),
            SignatureScheme::Signature => params,
        };

        if self.debug {
            tracing::debug!(signing_string = %plain, signature = %header, "request signed");
        }

        req.headers_mut()
            .insert(self.scheme.header_name(), value(&header, "signature")?);
        Ok(())
    }
}

/// Canonical string covered by the signature, one `name: value` line per signed header.
pub(crate) fn signing_string(req: &Request) -> Result<String, SignError> {
    let mut lines = vec![format!(
        "(request-target): {}",
        request_target(req.method(), req.url())
    )];
    for name in ["host", "date", "content-type", "digest", "content-length"] {
        let v = req
            .headers()
            .get(name)
            .ok_or(SignError::Header(name))?
            .to_str()
            .map_err(|_| SignError::Header(name))?;
        lines.push(format!("{name}: {v}"));
    }
    Ok(lines.join("\n"))
}

fn request_target(method: &Method, url: &Url) -> String {
    let mut target = format!("{} {}", method.as_str().to_lowercase(), url.path());
    if let Some(q) = url.query().filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }
    target
}

fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn content_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

fn value(v: &str, name: &'static str) -> Result<HeaderValue, SignError> {
    HeaderValue::from_str(v).map_err(|_| SignError::Header(name))
}
