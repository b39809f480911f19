//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::{Headers, Method};
use crate::database::Value;

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A fully parsed HTTP/1.1 request.
///
/// Query-string and `application/x-www-form-urlencoded` body parameters are
/// percent-decoded at parse time. JSON bodies are decoded on demand.
///
/// # Examples
///
/// ```
/// use captacion::http::request::Request;
///
/// let raw = b"GET /api/atletas?nombre=Jos%C3%A9+Luis HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.route_path(), "api/atletas");
/// assert_eq!(request.query_param("nombre"), Some("José Luis"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    query_params: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf`. The body holds at most `Content-Length` bytes of what follows.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the headers.
    /// - [`RequestError::Parse`]: the data is malformed.
    /// - [`RequestError::MissingField`]: method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap_or_else(|never| match never {});

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let declared = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body_end = buf.len().min(body_offset + declared);
        let body = Bytes::copy_from_slice(&buf[body_offset..body_end]);

        let query_params = query.as_deref().map(parse_urlencoded).unwrap_or_default();
        let is_form = header_map
            .get("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let form = if is_form {
            parse_urlencoded(&String::from_utf8_lossy(&body))
        } else {
            HashMap::new()
        };

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body,
                query_params,
                form,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path as sent, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The percent-decoded path with leading and trailing `/` trimmed, the form
    /// routes are matched against. The root path is the empty string.
    pub fn route_path(&self) -> String {
        percent_decode_str(&self.path)
            .decode_utf8_lossy()
            .trim_matches('/')
            .to_owned()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw query string without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn form_param(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_json(&self) -> bool {
        self.headers
            .get("content-type")
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    /// Decodes the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Named input from the JSON body, the form body or the query string, in
    /// that order of precedence.
    pub fn input(&self, key: &str) -> Option<String> {
        if self.is_json() {
            if let Ok(serde_json::Value::Object(map)) = self.json::<serde_json::Value>() {
                if let Some(value) = map.get(key) {
                    return match value {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Null => None,
                        other => Some(other.to_string()),
                    };
                }
            }
        }
        self.form_param(key)
            .or_else(|| self.query_param(key))
            .map(str::to_owned)
    }

    /// Every body field as a column value: JSON scalars keep their type, form
    /// fields are text.
    pub fn inputs(&self) -> Vec<(String, Value)> {
        if self.is_json() {
            return match self.json::<serde_json::Value>() {
                Ok(serde_json::Value::Object(map)) => map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
                _ => Vec::new(),
            };
        }
        self.form
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect()
    }

    /// `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

/// Parses `key=value&key2=value2`, decoding `+` as a space and then
/// percent-escapes. A repeated key keeps its last value.
fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
