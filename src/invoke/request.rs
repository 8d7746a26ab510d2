//! Inbound queue request.
//!
//! Field names follow the producer's JSON: `Function`, `Body` (base64),
//! `Path`, `QueryString`, `Header` (map of value lists) and `CallbackUrl`.
//! Lower-camel spellings are accepted too. The callback URL may arrive either as
//! a plain string or as a structured object (`Scheme`, `Host`, `Path`, `RawQuery`).

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;

/// Header carrying the correlation id.
pub const CALL_ID_HEADER: &str = "X-Call-Id";

/// Decoded invocation request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueRequest {
    /// Target function name (never blank).
    pub function: String,
    /// Request body forwarded to the function.
    pub body: Bytes,
    /// Path appended to the function URL.
    pub path: String,
    /// Raw query string, with or without a leading `?`.
    pub query_string: String,
    /// Headers forwarded to the function.
    pub header: BTreeMap<String, Vec<String>>,
    /// Where to post the function result.
    pub callback_url: Option<Url>,
}

#[derive(Deserialize)]
struct Wire {
    #[serde(rename = "Function", alias = "function", default)]
    function: String,
    #[serde(rename = "Body", alias = "body", default, deserialize_with = "base64_body")]
    body: Bytes,
    #[serde(rename = "Path", alias = "path", default, deserialize_with = "null_default")]
    path: String,
    #[serde(
        rename = "QueryString",
        alias = "queryString",
        default,
        deserialize_with = "null_default"
    )]
    query_string: String,
    #[serde(rename = "Header", alias = "header", default, deserialize_with = "null_default")]
    header: BTreeMap<String, Vec<String>>,
    #[serde(
        rename = "CallbackUrl",
        alias = "callbackURL",
        alias = "callbackUrl",
        alias = "CallbackURL",
        default
    )]
    callback_url: Option<RawUrl>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUrl {
    Text(String),
    Parts(UrlParts),
}

#[derive(Deserialize)]
struct UrlParts {
    #[serde(rename = "Scheme", default)]
    scheme: String,
    #[serde(rename = "Host", default)]
    host: String,
    #[serde(rename = "Path", default)]
    path: String,
    #[serde(rename = "RawQuery", default)]
    raw_query: String,
    #[serde(rename = "Fragment", default)]
    fragment: String,
}

impl RawUrl {
    fn into_string(self) -> String {
        match self {
            RawUrl::Text(s) => s,
            RawUrl::Parts(p) if p.host.is_empty() => String::new(),
            RawUrl::Parts(p) => {
                let mut s = format!("{}://{}{}", p.scheme, p.host, p.path);
                if !p.raw_query.is_empty() {
                    s.push('?');
                    s.push_str(&p.raw_query);
                }
                if !p.fragment.is_empty() {
                    s.push('#');
                    s.push_str(&p.fragment);
                }
                s
            }
        }
    }
}

impl QueueRequest {
    /// Decodes a broker payload.
    ///
    /// Rejects malformed JSON, a blank function name and an unparsable callback URL.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: Wire = serde_json::from_slice(payload)?;
        if wire.function.trim().is_empty() {
            return Err(DecodeError::EmptyFunction);
        }

        let callback_url = match wire.callback_url.map(RawUrl::into_string) {
            Some(raw) if !raw.is_empty() => {
                Some(Url::parse(&raw).map_err(|e| DecodeError::CallbackUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(Self {
            function: wire.function,
            body: wire.body,
            path: wire.path,
            query_string: wire.query_string,
            header: wire.header,
            callback_url,
        })
    }

    /// Correlation id from the `X-Call-Id` header (case-insensitive).
    pub fn call_id(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(CALL_ID_HEADER))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn base64_body<'de, D>(d: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)? {
        None => Ok(Bytes::new()),
        Some(s) => BASE64
            .decode(s.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_producer_payload() {
        let payload = br#"{
            "Function": "echo",
            "Body": "aGk=",
            "Path": "/",
            "QueryString": "",
            "Header": {"X-Call-Id": ["abc"], "Content-Type": ["text/plain"]},
            "CallbackUrl": "http://cb.local/done"
        }"#;
        let req = QueueRequest::decode(payload).unwrap();
        assert_eq!(req.function, "echo");
        assert_eq!(req.body, Bytes::from_static(b"hi"));
        assert_eq!(req.call_id(), Some("abc"));
        assert_eq!(req.callback_url.unwrap().as_str(), "http://cb.local/done");
    }

    #[test]
    fn accepts_lower_camel_and_nulls() {
        let payload = br#"{"function":"f","body":null,"header":null,"queryString":"a=1","callbackURL":""}"#;
        let req = QueueRequest::decode(payload).unwrap();
        assert!(req.body.is_empty());
        assert!(req.header.is_empty());
        assert_eq!(req.query_string, "a=1");
        assert!(req.callback_url.is_none());
        assert_eq!(req.call_id(), None);
    }

    #[test]
    fn accepts_structured_callback_url() {
        let payload = br#"{"Function":"f","CallbackUrl":{"Scheme":"https","Host":"cb:9000","Path":"/hook","RawQuery":"x=1","User":null}}"#;
        let req = QueueRequest::decode(payload).unwrap();
        assert_eq!(req.callback_url.unwrap().as_str(), "https://cb:9000/hook?x=1");
    }

    #[test]
    fn call_id_lookup_ignores_case() {
        let payload = br#"{"Function":"f","Header":{"x-call-id":["42"]}}"#;
        assert_eq!(QueueRequest::decode(payload).unwrap().call_id(), Some("42"));
    }

    #[test]
    fn rejects_bad_payloads() {
        let err = QueueRequest::decode(b"not json").unwrap_err();
        assert_eq!(err.as_label(), "decode_json");

        let err = QueueRequest::decode(br#"{"Function":"  "}"#).unwrap_err();
        assert_eq!(err.as_label(), "decode_empty_function");

        let err = QueueRequest::decode(br#"{"Function":"f","CallbackUrl":"not a url"}"#).unwrap_err();
        assert_eq!(err.as_label(), "decode_callback_url");

        let err = QueueRequest::decode(br#"{"Function":"f","Body":"%%%"}"#).unwrap_err();
        assert_eq!(err.as_label(), "decode_json");
    }
}
