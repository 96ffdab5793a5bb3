//! Case-insensitive, multi-valued HTTP header map.

use std::fmt;

/// `Host`
pub const HOST: &str = "Host";
/// `Upgrade`
pub const UPGRADE: &str = "Upgrade";
/// `Connection`
pub const CONNECTION: &str = "Connection";
/// `Origin`
pub const ORIGIN: &str = "Origin";
/// `Sec-WebSocket-Origin` (hybi drafts)
pub const SEC_WEBSOCKET_ORIGIN: &str = "Sec-WebSocket-Origin";
/// `Sec-WebSocket-Key`
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
/// `Sec-WebSocket-Accept`
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
/// `Sec-WebSocket-Version`
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";
/// `Sec-WebSocket-Protocol`
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
/// `Sec-WebSocket-Extensions`
pub const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";

/// Header names compare case-insensitively; each name keeps its values in
/// the order they were added, and names keep their first-insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// All values for `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// First value for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace all values of `name` with a single value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_all(name, vec![value.into()]);
    }

    /// Replace all values of `name`.
    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Add a value after any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Remove `name`, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Comma-separated list items across every value of `name`, trimmed,
    /// empty items dropped.
    pub fn list(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .into_iter()
            .flatten()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Some list item of `name` equals `token`, ignoring ASCII case.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.list(name)
            .iter()
            .any(|item| item.eq_ignore_ascii_case(token))
    }

    /// Iterate `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-websocket-key", "abc");
        assert_eq!(headers.first(SEC_WEBSOCKET_KEY), Some("abc"));
        assert!(headers.contains("SEC-WEBSOCKET-KEY"));
    }

    #[test]
    fn test_values_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append(SEC_WEBSOCKET_PROTOCOL, "chat");
        headers.append("sec-websocket-protocol", "superchat, v2");
        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers.list(SEC_WEBSOCKET_PROTOCOL),
            ["chat", "superchat", "v2"]
        );
        headers.insert(SEC_WEBSOCKET_PROTOCOL, "only");
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap(), ["only"]);
    }

    #[test]
    fn test_contains_token() {
        let headers: HeaderMap = [(CONNECTION, "keep-alive, Upgrade")].into_iter().collect();
        assert!(headers.contains_token(CONNECTION, "upgrade"));
        assert!(!headers.contains_token(CONNECTION, "close"));
        assert!(!headers.contains_token(UPGRADE, "websocket"));
    }

    #[test]
    fn test_remove() {
        let mut headers: HeaderMap = [(HOST, "a"), (ORIGIN, "b")].into_iter().collect();
        assert_eq!(headers.remove("host"), Some(vec!["a".to_string()]));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove(HOST), None);
    }
}
