//! Request descriptors and URL construction
//!
//! A [`RequestDescriptor`] is the transport-neutral description of one
//! logical request. It is built fresh for every call and turned into a wire
//! request only inside the connection. Replays never mutate it; they go
//! through [`RequestDescriptor::rebuild`].

use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::Method;
use std::collections::BTreeMap;
use url::Url;

/// Body of a request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document (`application/json`)
    Json(JsonValue),
    /// URL-encoded form fields, sent in insertion order
    Form(Vec<(String, String)>),
    /// Raw text with an explicit media type
    Text {
        /// Media type sent as `Content-Type`
        content_type: String,
        /// Body content
        content: String,
    },
}

/// Description of a single logical request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Absolute URL overriding the connection's base URL
    pub url: Option<String>,
    /// Path segments appended to the base (or override) URL
    pub segments: Vec<String>,
    /// Query parameters; keys are unique and the last write wins
    pub query: BTreeMap<String, String>,
    /// Per-request headers, applied over the connection's common headers
    pub headers: Vec<(String, String)>,
    /// Optional body
    pub body: Option<RequestBody>,
}

impl RequestDescriptor {
    /// Create a request for the given method
    pub fn new(method: Method) -> Self {
        Self {
            method,
            url: None,
            segments: Vec::new(),
            query: BTreeMap::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request accepting JSON
    pub fn get() -> Self {
        Self::new(Method::GET).header("Accept", "application/json")
    }

    /// POST request
    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    /// PUT request
    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    /// DELETE request
    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Target an absolute URL instead of the connection's base URL
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append one path segment
    #[must_use]
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append several path segments
    #[must_use]
    pub fn segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments.extend(segments.into_iter().map(Into::into));
        self
    }

    /// Add a query parameter (replaces an earlier value for the same key)
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set a header (replaces an earlier value, names compared without case)
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name.into(), value.into());
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Set a form body
    #[must_use]
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Set a raw text body with the given media type
    #[must_use]
    pub fn text(mut self, content_type: impl Into<String>, content: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type: content_type.into(),
            content: content.into(),
        });
        self
    }

    /// Look up a header value (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Copy of this request with `headers` applied over its own headers
    ///
    /// Pure: the original descriptor is left untouched, which is what makes
    /// replaying a request after re-authentication safe.
    #[must_use]
    pub fn rebuild(&self, headers: &[(String, String)]) -> Self {
        let mut rebuilt = self.clone();
        for (name, value) in headers {
            set_header(&mut rebuilt.headers, name.clone(), value.clone());
        }
        rebuilt
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::get()
    }
}

pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
    headers.push((name, value));
}

/// Merge header sets; later sets win over earlier ones
pub fn merge_headers<'a, I>(sets: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a [(String, String)]>,
{
    let mut merged = Vec::new();
    for set in sets {
        for (name, value) in set {
            set_header(&mut merged, name.clone(), value.clone());
        }
    }
    merged
}

/// Build a URL from a base, extra path segments and query parameters
///
/// Segments are appended to the base path (a trailing slash on the base does
/// not produce an empty segment). Query keys and values are percent-encoded,
/// so a space becomes `%20`. Existing query parameters of the base survive.
pub fn build_url<S: AsRef<str>>(
    base: &str,
    segments: &[S],
    query: &BTreeMap<String, String>,
) -> Result<Url> {
    let mut url = Url::parse(base)?;

    if !segments.is_empty() {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| Error::invalid_value("url", format!("'{base}' cannot be a base URL")))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment.as_ref());
        }
    }

    if !query.is_empty() {
        let encoded = query
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        let combined = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
            _ => encoded,
        };
        url.set_query(Some(&combined));
    }

    Ok(url)
}
