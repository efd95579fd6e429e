//! Path addressing primitives.
//!
//! `get`, `exists`, `set` and `delete` over an arbitrary key/index path.
//! These functions mutate in place; transactional behavior is the
//! responsibility of the caller (see the patch executor).

use crate::{
    error::{value_type_name, StoreError, StoreResult},
    Path, Seg,
};
use serde_json::{Map, Value};

/// Get a reference to the value at a path.
///
/// Returns `None` if the path does not resolve. Numeric-looking keys
/// address array elements and indices address stringified object keys.
///
/// # Examples
///
/// ```
/// use tirea_docstore::{access, path};
/// use serde_json::json;
///
/// let doc = json!({"items": [{"title": "a"}]});
/// assert_eq!(access::get(&doc, &path!("items", "0", "title")), Some(&json!("a")));
/// assert_eq!(access::get(&doc, &path!("items", 5)), None);
/// ```
pub fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, seg| child(current, seg))
}

/// Whether the path resolves to a value (a stored `null` counts).
#[inline]
pub fn exists(root: &Value, path: &Path) -> bool {
    get(root, path).is_some()
}

/// Get a mutable reference to the value at a path.
pub fn get_mut<'a>(root: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |current, seg| child_mut(current, seg))
}

fn child<'a>(current: &'a Value, seg: &Seg) -> Option<&'a Value> {
    match current {
        Value::Object(obj) => obj.get(seg.object_key().as_ref()),
        Value::Array(arr) => arr.get(seg.array_index()?),
        _ => None,
    }
}

fn child_mut<'a>(current: &'a mut Value, seg: &Seg) -> Option<&'a mut Value> {
    match current {
        Value::Object(obj) => obj.get_mut(seg.object_key().as_ref()),
        Value::Array(arr) => arr.get_mut(seg.array_index()?),
        _ => None,
    }
}

/// Set a value at a path.
///
/// Setting the root requires an object. Missing (or scalar) intermediate
/// containers are replaced by an array when the next segment looks numeric
/// and by an object otherwise. Writing past the end of an array pads it
/// with `null`.
pub fn set(root: &mut Value, path: &Path, value: Value) -> StoreResult<()> {
    if path.is_empty() {
        if !value.is_object() {
            return Err(StoreError::root_shape(&value));
        }
        *root = value;
        return Ok(());
    }
    set_at(root, path.segments(), value, path, 0)
}

fn set_at(
    current: &mut Value,
    segments: &[Seg],
    value: Value,
    full_path: &Path,
    depth: usize,
) -> StoreResult<()> {
    let (seg, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *current = value;
            return Ok(());
        }
    };

    if !current.is_object() && !current.is_array() {
        *current = empty_container_for(seg);
    }

    let slot = match current {
        Value::Object(obj) => obj
            .entry(seg.object_key().into_owned())
            .or_insert(Value::Null),
        Value::Array(arr) => {
            let idx = seg.array_index().ok_or_else(|| {
                StoreError::type_mismatch(full_path.prefix(depth + 1), "array index", "key")
            })?;
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            &mut arr[idx]
        }
        other => {
            return Err(StoreError::type_mismatch(
                full_path.prefix(depth),
                "container",
                value_type_name(other),
            ))
        }
    };

    if rest.is_empty() {
        *slot = value;
        return Ok(());
    }
    if !slot.is_object() && !slot.is_array() {
        *slot = empty_container_for(&rest[0]);
    }
    set_at(slot, rest, value, full_path, depth + 1)
}

/// The container created for a missing parent of `next`.
#[inline]
pub(crate) fn empty_container_for(next: &Seg) -> Value {
    if next.looks_numeric() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Delete the value at a path. Returns whether anything was removed.
///
/// Array parents splice the element out (later indices shift down); object
/// parents drop the key. Deleting the root resets it to an empty object.
pub fn delete(root: &mut Value, path: &Path) -> bool {
    let Some((last, parent_segments)) = path.segments().split_last() else {
        let was_empty = root.as_object().is_some_and(Map::is_empty);
        *root = Value::Object(Map::new());
        return !was_empty;
    };
    let parent_path = Path::from_segments(parent_segments.to_vec());
    match get_mut(root, &parent_path) {
        Some(Value::Object(obj)) => obj.shift_remove(last.object_key().as_ref()).is_some(),
        Some(Value::Array(arr)) => match last.array_index() {
            Some(idx) if idx < arr.len() => {
                arr.remove(idx);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Resolve every loosely-typed segment against the current tree.
///
/// Segments below an array become indices, segments below an object become
/// keys; below a missing container the creation rule of [`set`] applies.
pub fn canonicalize(root: &Value, path: &Path) -> Path {
    let mut out = Path::root();
    let mut current = Some(root);
    for seg in path.iter() {
        let canonical = match current {
            Some(Value::Object(_)) => Seg::Key(seg.object_key().into_owned()),
            Some(Value::Array(_)) => match seg.array_index() {
                Some(i) => Seg::Index(i),
                None => seg.clone(),
            },
            _ => match seg.array_index() {
                Some(i) => Seg::Index(i),
                None => seg.clone(),
            },
        };
        current = current.and_then(|v| child(v, &canonical));
        out.push(canonical);
    }
    out
}
