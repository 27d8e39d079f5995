//! Capability identifiers: tag-structured keys with a canonical string form,
//! wildcard-aware matching, and specificity ranking.
//!
//! A [`CapKey`] is an immutable mapping from tag name to tag value. Two keys
//! compare equal iff their tag maps are equal; the canonical string form
//! sorts tags by key so equal keys always print identically.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

/// The literal tag value that matches any value on either side of a match test.
pub const WILDCARD: &str = "*";

/// Errors raised while parsing or constructing a [`CapKey`].
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum CapKeyError {
    #[snafu(display("capability string must contain at least one tag"))]
    InvalidFormat,

    #[snafu(display("tag '{token}' is not in the form key=value"))]
    InvalidTagFormat { token: String },

    #[snafu(display("tag key or value is empty in '{token}'"))]
    EmptyTag { token: String },

    #[snafu(display(
        "tag '{key}={value}' contains a character outside [A-Za-z0-9_-*]"
    ))]
    InvalidCharacter { key: String, value: String },
}

fn validate_alphabet(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '*')
}

fn validate_tag(key: &str, value: &str) -> Result<(), CapKeyError> {
    if key.is_empty() || value.is_empty() {
        return EmptyTagSnafu {
            token: format!("{key}={value}"),
        }
        .fail();
    }
    if !validate_alphabet(key) || !validate_alphabet(value) {
        return InvalidCharacterSnafu {
            key: key.to_string(),
            value: value.to_string(),
        }
        .fail();
    }
    Ok(())
}

/// An immutable, tag-structured capability identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapKey {
    tags: BTreeMap<String, String>,
}

impl CapKey {
    /// Builds a key from an already-assembled tag map.
    ///
    /// Fails with [`CapKeyError::InvalidFormat`] if `tags` is empty; each
    /// entry is validated against the same alphabet rules as [`CapKey::parse`].
    pub fn from_tags(tags: BTreeMap<String, String>) -> Result<Self, CapKeyError> {
        if tags.is_empty() {
            return InvalidFormatSnafu.fail();
        }
        for (k, v) in &tags {
            validate_tag(k, v)?;
        }
        Ok(Self { tags })
    }

    /// Parses the `k1=v1;k2=v2` string form.
    ///
    /// A trailing `;` is accepted but never emitted by [`CapKey::canonical`].
    /// Errors are reported in the precedence order documented on
    /// [`CapKeyError`]: a malformed token wins over an empty tag, which wins
    /// over a bad character, which wins over the string having no tags at all.
    pub fn parse(s: &str) -> Result<Self, CapKeyError> {
        let mut tags = BTreeMap::new();
        for token in s.split(';') {
            if token.is_empty() {
                continue;
            }
            if token.matches('=').count() != 1 {
                return InvalidTagFormatSnafu {
                    token: token.to_string(),
                }
                .fail();
            }
            let (key, value) = token.split_once('=').expect("exactly one '=' checked above");
            let key = key.trim();
            let value = value.trim();
            validate_tag(key, value)?;
            tags.insert(key.to_string(), value.to_string());
        }
        if tags.is_empty() {
            return InvalidFormatSnafu.fail();
        }
        Ok(Self { tags })
    }

    /// The canonical `k1=v1;k2=v2` string: keys sorted ascending, no trailing `;`.
    pub fn canonical(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Looks up a single tag's value.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn r#type(&self) -> Option<&str> {
        self.tag("type")
    }

    pub fn action(&self) -> Option<&str> {
        self.tag("action")
    }

    pub fn target(&self) -> Option<&str> {
        self.tag("target")
    }

    pub fn format(&self) -> Option<&str> {
        self.tag("format")
    }

    pub fn output(&self) -> Option<&str> {
        self.tag("output")
    }

    pub fn is_binary(&self) -> bool {
        self.output() == Some("binary")
    }

    /// Iterates over the tag map in canonical (key-ascending) order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// `true` iff `self` can handle `request`: every tag present in
    /// `request` is either absent from `self`, wildcarded on either side, or
    /// equal. Tags present only in `self` never block a match.
    pub fn can_handle(&self, request: &CapKey) -> bool {
        request.tags.iter().all(|(k, v_req)| match self.tags.get(k) {
            None => true,
            Some(v_cap) => v_cap == WILDCARD || v_req == WILDCARD || v_cap == v_req,
        })
    }

    /// Alias for [`CapKey::can_handle`] kept for readability at call sites
    /// that read as "does this capability match that request".
    pub fn matches(&self, request: &CapKey) -> bool {
        self.can_handle(request)
    }

    /// Symmetric compatibility: for every tag present on both sides, either
    /// value is a wildcard or the values are equal.
    pub fn compatible(&self, other: &CapKey) -> bool {
        self.tags.iter().all(|(k, v_a)| match other.tags.get(k) {
            None => true,
            Some(v_b) => v_a == WILDCARD || v_b == WILDCARD || v_a == v_b,
        })
    }

    /// Count of tags whose value is not the wildcard.
    pub fn specificity(&self) -> usize {
        self.tags.values().filter(|v| v.as_str() != WILDCARD).count()
    }

    /// `true` iff `self` and `other` are compatible and `self` is strictly
    /// more specific (more non-wildcard tags) than `other`.
    pub fn more_specific_than(&self, other: &CapKey) -> bool {
        self.compatible(other) && self.specificity() > other.specificity()
    }

    pub fn with_tag(&self, key: &str, value: &str) -> Result<Self, CapKeyError> {
        validate_tag(key, value)?;
        let mut tags = self.tags.clone();
        tags.insert(key.to_string(), value.to_string());
        Ok(Self { tags })
    }

    /// Removes a tag if present. May yield a key with zero tags; callers that
    /// need a well-formed result should follow up with [`CapKey::from_tags`]
    /// validation if that matters for their use case.
    pub fn without_tag(&self, key: &str) -> Self {
        let mut tags = self.tags.clone();
        tags.remove(key);
        Self { tags }
    }

    /// Sets (adding or replacing) a tag to the wildcard value.
    pub fn with_wildcard_tag(&self, key: &str) -> Self {
        let mut tags = self.tags.clone();
        tags.insert(key.to_string(), WILDCARD.to_string());
        Self { tags }
    }

    /// Restricts the key to only the named tags.
    pub fn subset(&self, keys: &[&str]) -> Self {
        let tags = self
            .tags
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { tags }
    }

    /// Merges two keys, taking `other`'s value on conflict.
    pub fn merge(&self, other: &CapKey) -> Self {
        let mut tags = self.tags.clone();
        for (k, v) in &other.tags {
            tags.insert(k.clone(), v.clone());
        }
        Self { tags }
    }
}

impl fmt::Display for CapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for CapKey {
    type Err = CapKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CapKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CapKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CapKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Fluent construction and targeted mutation of a [`CapKey`] before it is
/// finalized with [`CapKeyBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct CapKeyBuilder {
    tags: BTreeMap<String, String>,
}

impl CapKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing key so individual tags can be added,
    /// replaced, or wildcarded.
    pub fn from_key(key: &CapKey) -> Self {
        Self {
            tags: key.tags.clone(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn wildcard(mut self, key: impl Into<String>) -> Self {
        self.tags.insert(key.into(), WILDCARD.to_string());
        self
    }

    /// Alias for [`CapKeyBuilder::wildcard`]: generalizes an existing tag.
    pub fn generalize(self, key: impl Into<String>) -> Self {
        self.wildcard(key)
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.tags.remove(key);
        self
    }

    pub fn build(self) -> Result<CapKey, CapKeyError> {
        CapKey::from_tags(self.tags)
    }
}

impl From<&CapKey> for CapKeyBuilder {
    fn from(key: &CapKey) -> Self {
        Self::from_key(key)
    }
}

/// Implemented by anything carrying a [`CapKey`], so the ranking algorithm in
/// [`find_all`]/[`find_best`] can operate directly over capability records
/// instead of requiring callers to extract keys first.
pub trait HasCapKey {
    fn cap_key(&self) -> &CapKey;
}

impl HasCapKey for CapKey {
    fn cap_key(&self) -> &CapKey {
        self
    }
}

/// Ranks every candidate that can handle `request`, most specific first.
///
/// Tie-break order: specificity descending, then tag count descending, then
/// canonical string ascending (for determinism regardless of input order).
pub fn find_all<'a, T: HasCapKey>(request: &CapKey, candidates: &'a [T]) -> Vec<&'a T> {
    let mut matched: Vec<&'a T> = candidates
        .iter()
        .filter(|c| c.cap_key().can_handle(request))
        .collect();
    matched.sort_by(|a, b| {
        let ak = a.cap_key();
        let bk = b.cap_key();
        bk.specificity()
            .cmp(&ak.specificity())
            .then_with(|| bk.tag_count().cmp(&ak.tag_count()))
            .then_with(|| ak.canonical().cmp(&bk.canonical()))
    });
    matched
}

/// The head of [`find_all`], or `None` if nothing matches.
pub fn find_best<'a, T: HasCapKey>(request: &CapKey, candidates: &'a [T]) -> Option<&'a T> {
    find_all(request, candidates).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CapKey {
        CapKey::parse(s).unwrap()
    }

    #[test]
    fn parse_canonical_roundtrip() {
        let k = key("format=json;action=transform;type=data_processing");
        assert_eq!(k.canonical(), "action=transform;format=json;type=data_processing");
        assert_eq!(CapKey::parse(&k.canonical()).unwrap(), k);
    }

    #[test]
    fn trailing_semicolon_accepted_on_input_only() {
        let k = key("action=transform;");
        assert_eq!(k.canonical(), "action=transform");
    }

    #[test]
    fn parse_errors_precedence() {
        assert_eq!(CapKey::parse("").unwrap_err(), CapKeyError::InvalidFormat);
        assert!(matches!(
            CapKey::parse("key==value").unwrap_err(),
            CapKeyError::InvalidTagFormat { .. }
        ));
        assert!(matches!(
            CapKey::parse("key=").unwrap_err(),
            CapKeyError::EmptyTag { .. }
        ));
        assert!(matches!(
            CapKey::parse("=value").unwrap_err(),
            CapKeyError::EmptyTag { .. }
        ));
        assert!(matches!(
            CapKey::parse("key@=value").unwrap_err(),
            CapKeyError::InvalidCharacter { .. }
        ));
    }

    #[test]
    fn wildcard_matching() {
        let cap = CapKeyBuilder::new()
            .tag("type", "data_processing")
            .wildcard("action")
            .build()
            .unwrap();

        let req_ok = key("type=data_processing;action=transform;format=json");
        assert!(cap.can_handle(&req_ok));

        let req_bad = key("type=compute");
        assert!(!cap.can_handle(&req_bad));
    }

    #[test]
    fn can_handle_is_reflexive() {
        let a = key("action=generate;type=document");
        assert!(a.can_handle(&a));
    }

    #[test]
    fn wildcard_tag_never_increases_specificity() {
        let a = key("action=generate;type=document");
        let generalized = a.with_wildcard_tag("action");
        assert!(generalized.specificity() <= a.specificity());
    }

    #[test]
    fn best_match_ranking_scenario() {
        let a = key("action=generate;type=document;format=pdf;target=thumbnail");
        let b = key("action=generate;type=document");
        let c = CapKeyBuilder::new()
            .tag("action", "generate")
            .wildcard("format")
            .tag("type", "document")
            .build()
            .unwrap();

        let candidates = vec![a.clone(), b.clone(), c.clone()];
        let request = key("action=generate;type=document");

        let ranked = find_all(&request, &candidates);
        assert_eq!(ranked, vec![&a, &b, &c]);
        assert_eq!(find_best(&request, &candidates), Some(&a));
    }

    #[test]
    fn ranking_is_stable_under_permutation() {
        let a = key("action=generate;type=document;format=pdf;target=thumbnail");
        let b = key("action=generate;type=document");
        let c = CapKeyBuilder::new()
            .tag("action", "generate")
            .wildcard("format")
            .tag("type", "document")
            .build()
            .unwrap();
        let request = key("action=generate;type=document");

        let order1 = vec![a.clone(), b.clone(), c.clone()];
        let order2 = vec![c, a, b];
        assert_eq!(find_all(&request, &order1), find_all(&request, &order2));
    }

    #[test]
    fn compatible_does_not_imply_equal() {
        let a = CapKeyBuilder::new().wildcard("type").build().unwrap();
        let b = key("type=data_processing");
        assert!(a.can_handle(&b));
        assert!(b.can_handle(&a));
        assert_ne!(a, b);
        assert!(a.compatible(&b));
    }

    #[test]
    fn merge_prefers_right_hand_side() {
        let a = key("action=generate;type=document");
        let b = key("action=transform");
        let merged = a.merge(&b);
        assert_eq!(merged.action(), Some("transform"));
        assert_eq!(merged.r#type(), Some("document"));
    }

    #[test]
    fn subset_restricts_tags() {
        let a = key("action=generate;type=document;format=pdf");
        let s = a.subset(&["action", "type"]);
        assert_eq!(s.canonical(), "action=generate;type=document");
    }
}
