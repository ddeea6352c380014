// Order-preserving HTTP header list. A plain `Vec` rather than a map:
// headers may repeat (Set-Cookie) and wire order matters for the writer.

/// Header name/value pairs in the order they were parsed or inserted.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> HttpHeaders {
        HttpHeaders { entries: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every existing header with this name (case-insensitive),
    /// then appends it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any value for `name` contains `token` as a
    /// comma-separated, case-insensitive entry (e.g. `Connection: keep-alive, Upgrade`).
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .any(|(_, v)| v.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let mut h = HttpHeaders::new();
        h.push("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut h = HttpHeaders::new();
        h.push("X-Foo", "1");
        h.set("x-foo", "2");
        assert_eq!(h.get("X-Foo"), Some("2"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_contains_token() {
        let mut h = HttpHeaders::new();
        h.push("Connection", "keep-alive, Upgrade");
        assert!(h.contains_token("Connection", "upgrade"));
        assert!(!h.contains_token("Connection", "close"));
    }
}
