//! Label-set canonicalization.
//!
//! Two recordings with the same labels in different insertion order must map
//! to the same tracked identity, so cardinality accounting sorts the pairs
//! by key and joins them into a single deterministic string.

use std::fmt;

use crate::error::{GuardError, GuardResult};

/// A validated, key-sorted set of label key/value pairs.
///
/// Construction performs all input validation eagerly: empty keys, dangling
/// keys in flat input, and one key bound to two different values are all
/// rejected with [`GuardError::InvalidLabelSet`]. Exact duplicates of the
/// same pair collapse silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    /// Build a label set from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::normalize(pairs)
    }

    /// Build a label set from a flat alternating `key, value, key, value, …`
    /// sequence, the shape varargs-style instrumentation APIs produce.
    pub fn from_flat<S: AsRef<str>>(items: &[S]) -> GuardResult<Self> {
        if items.len() % 2 != 0 {
            let key = items[items.len() - 1].as_ref();
            return Err(GuardError::invalid_label_set(format!(
                "dangling key '{key}' with no value"
            )));
        }

        let pairs = items
            .chunks_exact(2)
            .map(|pair| (pair[0].as_ref().to_string(), pair[1].as_ref().to_string()))
            .collect();
        Self::normalize(pairs)
    }

    fn normalize(mut pairs: Vec<(String, String)>) -> GuardResult<Self> {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut normalized: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            if key.is_empty() {
                return Err(GuardError::invalid_label_set("label keys must be non-empty"));
            }
            match normalized.last() {
                Some((prev_key, prev_value)) if *prev_key == key => {
                    if *prev_value != value {
                        return Err(GuardError::invalid_label_set(format!(
                            "label '{key}' bound to conflicting values '{prev_value}' and '{value}'"
                        )));
                    }
                    // Exact duplicate pair, collapse.
                }
                _ => normalized.push((key, value)),
            }
        }

        Ok(Self { pairs: normalized })
    }

    /// The pairs in canonical (key-sorted) order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Number of distinct label keys.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Derive the order-independent identity key, `k1=v1,k2=v2,…`.
    ///
    /// Deterministic and allocation-light: one exact-capacity string, no
    /// truncation of values.
    pub fn canonical_key(&self) -> CanonicalKey {
        let mut capacity = 0;
        for (key, value) in &self.pairs {
            capacity += key.len() + value.len() + 2;
        }

        let mut joined = String::with_capacity(capacity);
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                joined.push(',');
            }
            joined.push_str(key);
            joined.push('=');
            joined.push_str(value);
        }
        CanonicalKey(joined)
    }
}

/// Order-independent identity of one label combination, used for set
/// membership and de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates that insertion order does not affect the identity key.
    #[test]
    fn test_canonical_key_order_independent() {
        let a = LabelSet::from_pairs([("a", "1"), ("b", "2")]).expect("valid labels");
        let b = LabelSet::from_pairs([("b", "2"), ("a", "1")]).expect("valid labels");

        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key().as_str(), "a=1,b=2");
    }

    /// Validates the flat varargs-style constructor.
    #[test]
    fn test_from_flat() {
        let set = LabelSet::from_flat(&["method", "GET", "endpoint", "/api"]).expect("valid");
        assert_eq!(set.canonical_key().as_str(), "endpoint=/api,method=GET");
    }

    /// Validates rejection of a dangling key with no value.
    #[test]
    fn test_from_flat_odd_length_rejected() {
        let err = LabelSet::from_flat(&["method", "GET", "endpoint"])
            .expect_err("odd-length input must fail");
        assert!(err.to_string().contains("endpoint"));
    }

    /// Validates rejection of one key bound to two different values.
    #[test]
    fn test_conflicting_duplicate_key_rejected() {
        let err = LabelSet::from_pairs([("gateway", "G1"), ("gateway", "G2")])
            .expect_err("conflicting values must fail");
        assert!(err.to_string().contains("gateway"));
    }

    /// Validates that an exact duplicate pair collapses silently.
    #[test]
    fn test_identical_duplicate_pair_collapses() {
        let set = LabelSet::from_pairs([("gateway", "G1"), ("gateway", "G1")]).expect("valid");
        assert_eq!(set.len(), 1);
        assert_eq!(set.canonical_key().as_str(), "gateway=G1");
    }

    /// Validates rejection of empty label keys.
    #[test]
    fn test_empty_key_rejected() {
        assert!(LabelSet::from_pairs([("", "value")]).is_err());
    }

    /// Validates that empty values and empty sets are legal.
    #[test]
    fn test_empty_values_and_empty_set() {
        let set = LabelSet::from_pairs([("key", "")]).expect("empty value is legal");
        assert_eq!(set.canonical_key().as_str(), "key=");

        let empty = LabelSet::from_pairs(Vec::<(String, String)>::new()).expect("empty set");
        assert!(empty.is_empty());
        assert_eq!(empty.canonical_key().as_str(), "");
    }

    /// Validates display formatting of the canonical key.
    #[test]
    fn test_canonical_key_display() {
        let set = LabelSet::from_pairs([("a", "1")]).expect("valid");
        assert_eq!(set.canonical_key().to_string(), "a=1");
    }
}
