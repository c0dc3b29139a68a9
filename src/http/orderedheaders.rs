use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Request headers in first-seen order.
///
/// Requests are assembled in layers (built-in defaults, client-wide headers,
/// per-request headers). A later layer replaces an earlier value in place,
/// so the wire order is the order in which names first appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedHeaderMap {
    entries: Vec<(HeaderName, HeaderValue)>,
}

fn parse(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), NetError> {
    let name = HeaderName::try_from(name).map_err(|_| NetError::InvalidHeader)?;
    let value = HeaderValue::try_from(value).map_err(|_| NetError::InvalidHeader)?;
    Ok((name, value))
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &HeaderName) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let (name, value) = parse(name, value)?;
        self.set(name, value);
        Ok(())
    }

    /// Set a header only when the name is not present yet.
    pub fn insert_if_absent(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let (name, value) = parse(name, value)?;
        if self.position(&name).is_none() {
            self.entries.push((name, value));
        }
        Ok(())
    }

    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let name = HeaderName::try_from(name).ok()?;
        self.position(&name).map(|i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overlay `other` on top of this map.
    pub fn extend(&mut self, other: &OrderedHeaderMap) {
        for (name, value) in &other.entries {
            self.set(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        map.extend(self.entries.into_iter().map(|(n, v)| (Some(n), v)));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(map: &OrderedHeaderMap) -> Vec<&str> {
        map.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn test_lookup_ignores_case() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("ACCEPT", "text/html").unwrap();
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert!(headers.contains("Accept"));
        assert!(!headers.contains("Bad Name"));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Accept", "*/*").unwrap();
        headers.insert("Connection", "Keep-Alive").unwrap();
        headers.insert("accept", "application/json").unwrap();
        assert_eq!(names(&headers), vec!["accept", "connection"]);
        assert_eq!(headers.get("Accept").unwrap(), "application/json");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_insert_if_absent() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Accept-Encoding", "identity").unwrap();
        headers.insert_if_absent("accept-encoding", "gzip").unwrap();
        headers.insert_if_absent("X-New", "1").unwrap();
        assert_eq!(headers.get("Accept-Encoding").unwrap(), "identity");
        assert_eq!(headers.get("x-new").unwrap(), "1");
    }

    #[test]
    fn test_extend_layers() {
        let mut base = OrderedHeaderMap::new();
        base.insert("Accept", "*/*").unwrap();
        base.insert("User-Agent", "asyncnet").unwrap();

        let mut overlay = OrderedHeaderMap::new();
        overlay.insert("user-agent", "custom").unwrap();
        overlay.insert("X-Token", "abc").unwrap();

        base.extend(&overlay);
        assert_eq!(names(&base), vec!["accept", "user-agent", "x-token"]);
        assert_eq!(base.get("User-Agent").unwrap(), "custom");
    }

    #[test]
    fn test_header_map_keeps_order() {
        let mut headers = OrderedHeaderMap::new();
        for name in ["Host", "Accept", "User-Agent"] {
            headers.insert(name, "v").unwrap();
        }
        let map = headers.to_header_map();
        let keys: Vec<_> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["host", "accept", "user-agent"]);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let mut headers = OrderedHeaderMap::new();
        assert_eq!(headers.insert("Invalid Header", "v"), Err(NetError::InvalidHeader));
        assert_eq!(headers.insert("Valid", "bad\nvalue"), Err(NetError::InvalidHeader));
        assert_eq!(headers.insert_if_absent("", "v"), Err(NetError::InvalidHeader));
        assert!(headers.is_empty());
    }
}
