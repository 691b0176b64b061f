//! Tag sets and static tag lists.

use std::{collections::BTreeMap, fmt, str::FromStr};

use snafu::Snafu;

/// A tag list error.
#[derive(Clone, Debug, Eq, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum TagError {
    /// A flat key/value token list had a dangling key.
    #[snafu(display("Tag list must contain an even number of keys and values, got {} token(s).", count))]
    OddTokenCount {
        /// Number of tokens in the list.
        count: usize,
    },
}

/// A set of tags for a single metric.
///
/// Keys are unique: inserting an existing key replaces its value. Iteration is always in key order, regardless of the
/// order in which tags were inserted, which is what makes encoding a tag set deterministic.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagSet {
    tags: BTreeMap<String, String>,
}

impl TagSet {
    /// Creates an empty `TagSet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tag set from a flat `key, value, key, value, ...` token sequence.
    ///
    /// Later pairs overwrite earlier pairs with the same key.
    ///
    /// # Errors
    ///
    /// If the sequence has an odd number of tokens, an error is returned. The dangling key is never silently dropped.
    pub fn from_flat<I, S>(tokens: I) -> Result<Self, TagError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens.into_iter().map(Into::into).collect::<Vec<String>>();
        let pairs = pair_up(tokens)?;
        Ok(pairs.into_iter().collect())
    }

    /// Inserts a tag, returning the value it replaced, if any.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into())
    }

    /// Returns the value of the given tag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns an iterator over the tags, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (key, value) in iter {
            tags.insert(key, value);
        }
        tags
    }
}

impl<K, V> Extend<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// Static tags attached to every metric of a call site.
///
/// These are configured as a single flat, comma-delimited string of alternating keys and values: `"region,us-east,tier,
/// gold"` configures `region=us-east` and `tier=gold`. Whitespace around each token is trimmed, and trailing empty
/// tokens (as left behind by a trailing comma) are ignored.
///
/// Pairs are kept in configuration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AdditionalTags {
    pairs: Vec<(String, String)>,
}

impl AdditionalTags {
    /// Creates an empty set of additional tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses additional tags from their flat, comma-delimited form.
    ///
    /// # Errors
    ///
    /// If the list has an odd number of tokens, an error is returned.
    pub fn parse(raw: &str) -> Result<Self, TagError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut tokens = raw.split(',').map(|token| token.trim().to_string()).collect::<Vec<_>>();
        while tokens.last().is_some_and(|token| token.is_empty()) {
            tokens.pop();
        }

        pair_up(tokens).map(|pairs| Self { pairs })
    }

    /// Creates additional tags from already-split key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns `true` if there are no additional tags.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns an iterator over the key/value pairs, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for AdditionalTags {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AdditionalTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{},{}", key, value)?;
        }
        Ok(())
    }
}

fn pair_up(tokens: Vec<String>) -> Result<Vec<(String, String)>, TagError> {
    if tokens.len() % 2 != 0 {
        return Err(TagError::OddTokenCount { count: tokens.len() });
    }

    let mut pairs = Vec::with_capacity(tokens.len() / 2);
    let mut tokens = tokens.into_iter();
    while let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
        pairs.push((key, value));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_is_ordered_by_key() {
        let tags: TagSet = [("zone", "a"), ("app", "b"), ("method", "c")].into_iter().collect();
        let keys = tags.iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(keys, vec!["app", "method", "zone"]);
    }

    #[test]
    fn tag_set_last_write_wins() {
        let mut tags = TagSet::new();
        assert_eq!(tags.insert("region", "us-east"), None);
        assert_eq!(tags.insert("region", "eu-west"), Some("us-east".to_string()));
        assert_eq!(tags.get("region"), Some("eu-west"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn tag_set_from_flat() {
        let tags = TagSet::from_flat(["a", "1", "b", "2", "a", "3"]).unwrap();
        assert_eq!(tags.get("a"), Some("3"));
        assert_eq!(tags.get("b"), Some("2"));

        assert_eq!(
            TagSet::from_flat(["a", "1", "b"]),
            Err(TagError::OddTokenCount { count: 3 })
        );
        assert!(TagSet::from_flat(Vec::<String>::new()).unwrap().is_empty());
    }

    #[test]
    fn additional_tags_parse() {
        let tags = AdditionalTags::parse("region,us-east,tier,gold").unwrap();
        assert_eq!(
            tags.iter().collect::<Vec<_>>(),
            vec![("region", "us-east"), ("tier", "gold")]
        );
        assert_eq!(tags.to_string(), "region,us-east,tier,gold");
    }

    #[test]
    fn additional_tags_whitespace_and_trailing_comma() {
        let tags = AdditionalTags::parse(" region , us-east ,").unwrap();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("region", "us-east")]);
    }

    #[test]
    fn additional_tags_empty() {
        assert!(AdditionalTags::parse("").unwrap().is_empty());
        assert!(AdditionalTags::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn additional_tags_odd_count_rejected() {
        assert_eq!(
            AdditionalTags::parse("region,us-east,tier"),
            Err(TagError::OddTokenCount { count: 3 })
        );
        assert_eq!("region".parse::<AdditionalTags>(), Err(TagError::OddTokenCount { count: 1 }));
    }

    #[test]
    fn additional_tags_keep_empty_values_in_the_middle() {
        // Empty values are kept here and dropped later by the name encoder.
        let tags = AdditionalTags::parse("a,,b,2").unwrap();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("a", ""), ("b", "2")]);
    }
}
