//! Dotted-path helpers.
//!
//! Paths address nodes in the tree as `.`-separated segments; the empty
//! path is the root. Segments are opaque strings except that `/` and `~`
//! are reserved by the pointer representation and rejected up front.

use crate::error::{Error, Result};

/// Split a dotted path into pointer segments. The empty path is the root
/// and yields no segments.
pub(crate) fn to_segments(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('.')
        .map(|seg| {
            if seg.contains('/') || seg.contains('~') {
                Err(Error::ReservedCharacter(seg.to_string()))
            } else {
                Ok(seg.to_string())
            }
        })
        .collect()
}

/// Remainder of `path` after `ns` and the joining dot.
///
/// Callers guarantee that `path` starts with `ns + "."`.
pub(crate) fn strip_namespace<'a>(path: &'a str, ns: &str) -> &'a str {
    &path[ns.len() + 1..]
}

/// Prefix test used for subscription matching.
///
/// This is a raw string prefix, not a segment prefix: a subscription at
/// `"a"` also matches a write at `"aardvark"`. Peers on the wire rely on
/// this exact test, so it must not be tightened to segment boundaries.
pub(crate) fn prefix_matches(written: &str, subscribed: &str) -> bool {
    written.starts_with(subscribed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_is_root() {
        assert_eq!(to_segments("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_dotted_path_splits() {
        assert_eq!(to_segments("a").unwrap(), vec!["a"]);
        assert_eq!(to_segments("a.b.c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reserved_characters_rejected() {
        assert_eq!(
            to_segments("a.b/c"),
            Err(Error::ReservedCharacter("b/c".to_string()))
        );
        assert_eq!(
            to_segments("~tmp"),
            Err(Error::ReservedCharacter("~tmp".to_string()))
        );
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("store_b.name.first", "store_b"), "name.first");
        assert_eq!(strip_namespace("a.b", "a"), "b");
    }

    #[test]
    fn test_prefix_is_string_wise_not_segment_wise() {
        assert!(prefix_matches("number.int", "number"));
        assert!(prefix_matches("number", "number"));
        assert!(prefix_matches("anything", ""));
        // Deliberate: matches across a segment boundary.
        assert!(prefix_matches("aardvark", "a"));
        assert!(!prefix_matches("a", "aardvark"));
    }
}
