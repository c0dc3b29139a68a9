//! Request description as submitted by the caller.

use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use bytes::Bytes;
use http::Method;
use url::Url;

/// Ordered key/value parameters.
///
/// Appended to the query string for GET/DELETE/HEAD, or sent as an
/// `application/x-www-form-urlencoded` body for POST/PUT when no explicit
/// body is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an earlier value for the same key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some((_, v)) = self.pairs.iter_mut().find(|(k, _)| *k == key) {
            *v = value;
        } else {
            self.pairs.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `a=1&b=two+words`
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }

    pub fn to_form_body(&self) -> Bytes {
        Bytes::from(self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = RequestParams::new();
        for (k, v) in iter {
            params.put(k, v);
        }
        params
    }
}

/// A request waiting to be scheduled.
///
/// Shared with the worker as `Arc<Request>` once submitted; nothing mutates
/// it after that point.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    params: RequestParams,
    headers: OrderedHeaderMap,
    body: RequestBody,
    content_type: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            params: RequestParams::new(),
            headers: OrderedHeaderMap::new(),
            body: RequestBody::Empty,
            content_type: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut RequestParams {
        &mut self.params
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Whether parameters travel in the query string rather than the body.
    pub fn params_in_query(&self) -> bool {
        matches!(self.method, Method::GET | Method::DELETE | Method::HEAD)
    }
}
