//! Deterministic cache keys.
//!
//! A key is the run prefix followed by one segment per stage in the stage's
//! ancestry, in canonical topological order:
//!
//! ```text
//! run1-qc.x~5EMT~2D.h3f9a01c2-filter.g200.m0p2.c3-coord-norm-bin.m3
//! ```
//!
//! Each segment is a fixed stage token plus every key-relevant parameter
//! value. Because the ancestry is part of the key, changing any upstream
//! parameter changes every downstream key.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// A key-relevant parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// An integer parameter.
    Int(i64),
    /// An unsigned integer parameter.
    UInt(u64),
    /// A floating point parameter.
    Float(f64),
    /// A free-text parameter.
    Text(String),
}

impl KeyValue {
    fn render(&self, out: &mut String) {
        match self {
            Self::Int(v) => {
                if *v < 0 {
                    out.push('m');
                }
                let _ = write!(out, "{}", v.unsigned_abs());
            }
            Self::UInt(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Float(v) => {
                if v.is_sign_negative() && *v != 0.0 {
                    out.push('m');
                }
                // Display never uses exponent notation for f64
                let text = v.abs().to_string();
                out.push_str(&text.replace('.', "p"));
            }
            Self::Text(v) => escape_into(v, out, |c| c.is_ascii_alphanumeric() || c == '_'),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for KeyValue {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<u64> for KeyValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

fn escape_into(text: &str, out: &mut String, keep: impl Fn(char) -> bool) {
    for c in text.chars() {
        if keep(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "~{byte:02X}");
            }
        }
    }
}

/// One stage's contribution to a cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySegment {
    token: &'static str,
    params: Vec<(&'static str, KeyValue)>,
}

impl KeySegment {
    /// Creates a segment with no parameters.
    #[must_use]
    pub fn new(token: &'static str) -> Self {
        Self {
            token,
            params: Vec::new(),
        }
    }

    /// Adds a key-relevant parameter under a short code.
    #[must_use]
    pub fn param(mut self, code: &'static str, value: impl Into<KeyValue>) -> Self {
        self.params.push((code, value.into()));
        self
    }

    /// Returns the stage token.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token
    }

    /// Renders the segment.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from(self.token);
        for (code, value) in &self.params {
            out.push('.');
            out.push_str(code);
            value.render(&mut out);
        }
        out
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// The identity of one stage output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a file-system-safe name for the key.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        escape_into(&self.0, &mut out, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
        });
        out
    }

    /// Returns true if `self` extends `ancestor` textually.
    #[must_use]
    pub fn extends(&self, ancestor: &Self) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builds keys for one run prefix.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    /// Creates a builder for a run prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let mut escaped = String::with_capacity(prefix.len());
        escape_into(prefix, &mut escaped, |c| c.is_ascii_alphanumeric() || c == '_');
        Self { prefix: escaped }
    }

    /// Returns the escaped prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Builds the key for a stage from its ancestry segments, itself last.
    #[must_use]
    pub fn build<'a>(&self, ancestry: impl IntoIterator<Item = &'a KeySegment>) -> CacheKey {
        let mut key = self.prefix.clone();
        for segment in ancestry {
            key.push('-');
            key.push_str(&segment.render());
        }
        CacheKey(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_rendering() {
        let seg = KeySegment::new("filter")
            .param("g", 200_usize)
            .param("m", 0.2)
            .param("c", 3_usize);
        assert_eq!(seg.render(), "filter.g200.m0p2.c3");
    }

    #[test]
    fn test_negative_and_text_values() {
        assert_eq!(KeySegment::new("t").param("v", -1.5).render(), "t.vm1p5");
        assert_eq!(KeySegment::new("t").param("v", -3_i64).render(), "t.vm3");
        assert_eq!(KeySegment::new("qc").param("x", "^MT-").render(), "qc.x~5EMT~2D");
    }

    #[test]
    fn test_key_is_deterministic() {
        let builder = CacheKeyBuilder::new("run1");
        let segs = [KeySegment::new("qc"), KeySegment::new("smooth").param("w", 3_usize)];
        assert_eq!(builder.build(&segs), builder.build(&segs));
        assert_eq!(builder.build(&segs).as_str(), "run1-qc-smooth.w3");
    }

    #[test]
    fn test_parameter_change_changes_key() {
        let builder = CacheKeyBuilder::new("run1");
        let a = builder.build(&[KeySegment::new("smooth").param("w", 3_usize)]);
        let b = builder.build(&[KeySegment::new("smooth").param("w", 5_usize)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_large_seeds_stay_distinct() {
        let a = KeySegment::new("tsne").param("s", u64::MAX);
        let b = KeySegment::new("tsne").param("s", u64::MAX - 1);
        assert_eq!(a.render(), "tsne.s18446744073709551615");
        assert_ne!(a.render(), b.render());
    }

    #[test]
    fn test_child_key_extends_parent() {
        let builder = CacheKeyBuilder::new("run1");
        let qc = KeySegment::new("qc");
        let norm = KeySegment::new("norm");
        let parent = builder.build([&qc]);
        let child = builder.build([&qc, &norm]);
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn test_prefix_is_escaped() {
        let key = CacheKeyBuilder::new("my run").build(&[KeySegment::new("qc")]);
        assert_eq!(key.as_str(), "my~20run-qc");
    }

    #[test]
    fn test_file_name_escapes_tilde() {
        let key = CacheKeyBuilder::new("a/b").build(&[KeySegment::new("qc")]);
        assert_eq!(key.file_name(), "a~7E2Fb-qc");
        assert!(!key.file_name().contains('/'));
    }
}
