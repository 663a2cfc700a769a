//! Ordered HTTP header list.
//!
//! Headers are kept as a `Vec` of `(name, value)` string pairs instead of a map:
//! repeated fields and the order they arrived in are both preserved, and names
//! keep whatever capitalisation the peer (or the caller) used. All lookups are
//! case-insensitive.

use std::fmt;

const SET_COOKIE: &str = "Set-Cookie";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of the first header named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter(move |(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether a header `name` exists whose value equals `value`, both compared
    /// case-insensitively.
    pub fn contains_value(&self, name: &str, value: &str) -> bool {
        self.get_all(name).any(|v| v.trim().eq_ignore_ascii_case(value))
    }

    /// Whether any comma separated token of any `name` header equals `token`.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).flat_map(|v| v.split(',')).any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// The last `Transfer-Encoding` ends with `chunked`; RFC 7230 allows
    /// chunked only as the final coding.
    pub fn is_chunked(&self) -> bool {
        self.get_all("Transfer-Encoding")
            .last()
            .and_then(|v| v.rsplit(',').next())
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Replaces the value of the first `name` header, or appends it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Sets `name` only when no such header exists yet.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    /// Appends a new pair, keeping any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Appends a pair, merging it into the previous header where HTTP allows.
    ///
    /// - an empty `name` is an obs-fold continuation line: its value is
    ///   appended to the previous header's value, separated by a space;
    /// - a `name` equal to the previous header's name is comma-combined into it,
    ///   except `Set-Cookie` whose values routinely contain commas.
    pub fn append_combined(&mut self, name: &str, value: &str) {
        if let Some((last_name, last_value)) = self.entries.last_mut() {
            if name.is_empty() {
                if !last_value.is_empty() {
                    last_value.push(' ');
                }
                last_value.push_str(value.trim());
                return;
            }

            if last_name.eq_ignore_ascii_case(name) && !name.eq_ignore_ascii_case(SET_COOKIE) {
                last_value.push_str(", ");
                last_value.push_str(value);
                return;
            }
        }

        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Removes every `name` header, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Rewrites every name into `Canonical-Dash-Format`.
    pub fn canonicalize(&mut self) {
        for (name, _) in &mut self.entries {
            *name = canonical_name(name);
        }
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// `content-TYPE` → `Content-Type`: first letter and every letter after a dash
/// upper-cased, the rest lower-cased.
pub fn canonical_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            mapped
        })
        .collect()
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Headers {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (String, String)>, fn(&'a (String, String)) -> (&'a str, &'a str)>;

    fn into_iter(self) -> Self::IntoIter {
        fn as_pair((k, v): &(String, String)) -> (&str, &str) {
            (k.as_str(), v.as_str())
        }
        self.entries.iter().map(as_pair as fn(&'a (String, String)) -> (&'a str, &'a str))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}
