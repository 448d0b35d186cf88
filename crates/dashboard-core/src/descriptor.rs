//! Cache keys for backend queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One segment of a [`RequestDescriptor`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    /// A string segment, typically the endpoint name or a filter value.
    Str(String),
    /// An integer segment such as a page number.
    Int(i64),
    /// A boolean flag.
    Bool(bool),
    /// An instant, compared at full precision.
    Instant(DateTime<Utc>),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Instant(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeySegment {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for KeySegment {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for KeySegment {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for KeySegment {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Instant(t)
    }
}

/// Identity of a cacheable query: an endpoint plus its parameter values.
///
/// Equality is structural and segment order is significant, so callers must
/// build descriptors for the same query in the same order. The first segment is
/// conventionally the endpoint, which makes `["calls"]` a prefix of every call
/// query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestDescriptor(Vec<KeySegment>);

impl RequestDescriptor {
    /// Creates a descriptor whose first segment is `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(vec![KeySegment::Str(endpoint.into())])
    }

    /// Creates a descriptor from explicit segments.
    #[must_use]
    pub const fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    /// Appends a segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Appends a segment when present, or an explicit empty marker otherwise.
    ///
    /// Keeping a placeholder for absent filters stops `["calls", "open"]`
    /// (status only) from colliding with a campaign-only query.
    #[must_use]
    pub fn with_opt<S: Into<KeySegment>>(self, segment: Option<S>) -> Self {
        match segment {
            Some(s) => self.with(s),
            None => self.with(KeySegment::Str(String::new())),
        }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Returns the endpoint segment, if the first segment is a string.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeySegment::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns true if `prefix` matches the leading segments of this descriptor.
    ///
    /// Every descriptor starts with itself and with the empty descriptor.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

impl<S: Into<KeySegment>> FromIterator<S> for RequestDescriptor {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality() {
        let a = RequestDescriptor::new("calls").with("campaign-7").with(2_i64);
        let b = RequestDescriptor::new("calls").with("campaign-7").with(2_i64);
        let swapped = RequestDescriptor::new("calls").with(2_i64).with("campaign-7");

        assert_eq!(a, b);
        assert_ne!(a, swapped);

        let set: HashSet<_> = [a, b, swapped].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_prefix_matching() {
        let calls = RequestDescriptor::new("calls");
        let page = RequestDescriptor::new("calls").with("open").with(1_i64);
        let customers = RequestDescriptor::new("customers");

        assert!(page.starts_with(&calls));
        assert!(page.starts_with(&page));
        assert!(!calls.starts_with(&page));
        assert!(!customers.starts_with(&calls));
        assert!(customers.starts_with(&RequestDescriptor::default()));
    }

    #[test]
    fn test_optional_segments_keep_positions() {
        let status_only = RequestDescriptor::new("calls")
            .with_opt(None::<&str>)
            .with_opt(Some("open"));
        let campaign_only = RequestDescriptor::new("calls")
            .with_opt(Some("open"))
            .with_opt(None::<&str>);
        assert_ne!(status_only, campaign_only);
    }

    #[test]
    fn test_display() {
        let d: RequestDescriptor = ["inquiries", "pending"].into_iter().collect();
        assert_eq!(d.to_string(), "[inquiries, pending]");
        assert_eq!(d.endpoint(), Some("inquiries"));
    }
}
