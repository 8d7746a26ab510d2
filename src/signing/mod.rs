//! # Outbound request signing.
//!
//! [`Signer`] is selected once at startup: [`Signer::Disabled`] when no private key
//! is mounted, [`Signer::Rsa`] otherwise. Callers sign unconditionally; the
//! disabled variant leaves the request untouched.
//!
//! Signatures follow the HTTP-signatures draft (`rsa-sha256`) over
//! `(request-target) host date content-type digest content-length`.

mod signer;

pub use signer::{KEY_FILE, KEY_ID, RsaSigner, SIGNED_HEADERS, Signer};

use std::str::FromStr;

/// Header that carries the signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `Authorization: Signature keyId=...`
    #[default]
    Authorization,
    /// `Signature: keyId=...`
    Signature,
}

impl SignatureScheme {
    /// Header name written by this scheme.
    pub fn header_name(self) -> reqwest::header::HeaderName {
        match self {
            SignatureScheme::Authorization => reqwest::header::AUTHORIZATION,
            SignatureScheme::Signature => reqwest::header::HeaderName::from_static("signature"),
        }
    }
}

impl FromStr for SignatureScheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("authorization") {
            Ok(SignatureScheme::Authorization)
        } else if s.eq_ignore_ascii_case("signature") {
            Ok(SignatureScheme::Signature)
        } else {
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_parses_case_insensitively() {
        assert_eq!("Signature".parse(), Ok(SignatureScheme::Signature));
        assert_eq!("authorization".parse(), Ok(SignatureScheme::Authorization));
        assert_eq!("bearer".parse::<SignatureScheme>(), Err(()));
    }
}
