//! Tree operations over `serde_json::Value`.
//!
//! The store's local data is a single structured value. Reads never fail;
//! writes autovivify missing intermediates as objects and surface type
//! mismatches without touching the tree.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Read the value at `segments`. Absent paths yield `None`.
pub(crate) fn read<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(arr) => arr.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Assign `value` at `segments`, creating missing intermediate objects.
pub(crate) fn assign(root: &mut Value, segments: &[String], value: Value) -> Result<()> {
    let slot = descend_mut(root, segments)?;
    *slot = value;
    Ok(())
}

/// Append `value` to the array at `segments`. An absent target becomes a
/// fresh one-element array; a present non-array target is an error.
pub(crate) fn append(root: &mut Value, segments: &[String], value: Value) -> Result<()> {
    let slot = descend_mut(root, segments)?;
    match slot {
        Value::Array(arr) => arr.push(value),
        Value::Null => *slot = Value::Array(vec![value]),
        _ => return Err(Error::NotAnArray(segments.join("."))),
    }
    Ok(())
}

/// Walk to the slot named by `segments`, inserting empty objects for
/// missing intermediates. Existing arrays are entered by numeric index;
/// any scalar on the way is an error, and nothing is created past the
/// point of failure.
fn descend_mut<'a>(root: &'a mut Value, segments: &[String]) -> Result<&'a mut Value> {
    let mut cur = root;
    for seg in segments {
        if cur.is_null() {
            *cur = Value::Object(Map::new());
        }
        cur = match cur {
            Value::Object(map) => map.entry(seg.clone()).or_insert(Value::Null),
            Value::Array(arr) => {
                let idx = seg
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidIndex(seg.clone()))?;
                arr.get_mut(idx)
                    .ok_or_else(|| Error::InvalidIndex(seg.clone()))?
            }
            _ => return Err(Error::NotAnObject(seg.clone())),
        };
    }
    Ok(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(path: &str) -> Vec<String> {
        crate::path::to_segments(path).unwrap()
    }

    #[test]
    fn test_read_absent_is_none() {
        let root = json!({"key": "value"});
        assert_eq!(read(&root, &segs("badkey")), None);
        assert_eq!(read(&root, &segs("key.deeper")), None);
    }

    #[test]
    fn test_read_explicit_null_is_some() {
        let root = json!({"key": null});
        assert_eq!(read(&root, &segs("key")), Some(&Value::Null));
    }

    #[test]
    fn test_read_array_by_index() {
        let root = json!({"list": [1, 2, 3]});
        assert_eq!(read(&root, &segs("list.1")), Some(&json!(2)));
        assert_eq!(read(&root, &segs("list.9")), None);
        assert_eq!(read(&root, &segs("list.x")), None);
    }

    #[test]
    fn test_assign_autovivifies_objects() {
        let mut root = json!({});
        assign(&mut root, &segs("a.b.c"), json!(1)).unwrap();
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_assign_at_root_replaces_tree() {
        let mut root = json!({"old": true});
        assign(&mut root, &segs(""), json!({"new": true})).unwrap();
        assert_eq!(root, json!({"new": true}));
    }

    #[test]
    fn test_assign_into_existing_array() {
        let mut root = json!({"list": [1, 2, 3]});
        assign(&mut root, &segs("list.1"), json!(9)).unwrap();
        assert_eq!(root, json!({"list": [1, 9, 3]}));
    }

    #[test]
    fn test_assign_through_scalar_fails_without_mutation() {
        let mut root = json!({"a": {"b": 5}});
        let before = root.clone();
        assert_eq!(
            assign(&mut root, &segs("a.b.c"), json!(1)),
            Err(Error::NotAnObject("c".to_string()))
        );
        assert_eq!(root, before);
    }

    #[test]
    fn test_assign_bad_array_index_fails_without_mutation() {
        let mut root = json!({"list": [1]});
        let before = root.clone();
        assert_eq!(
            assign(&mut root, &segs("list.7.x"), json!(1)),
            Err(Error::InvalidIndex("7".to_string()))
        );
        assert_eq!(root, before);
    }

    #[test]
    fn test_append_to_existing_array() {
        let mut root = json!({"list": [1]});
        append(&mut root, &segs("list"), json!(2)).unwrap();
        assert_eq!(root, json!({"list": [1, 2]}));
    }

    #[test]
    fn test_append_creates_absent_array() {
        let mut root = json!({});
        append(&mut root, &segs("a.list"), json!("x")).unwrap();
        assert_eq!(root, json!({"a": {"list": ["x"]}}));
    }

    #[test]
    fn test_append_to_scalar_fails() {
        let mut root = json!({"n": 3});
        assert_eq!(
            append(&mut root, &segs("n"), json!(1)),
            Err(Error::NotAnArray("n".to_string()))
        );
        assert_eq!(root, json!({"n": 3}));
    }
}
