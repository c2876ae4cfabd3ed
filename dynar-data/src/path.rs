//! Dot-path access into nested attribute maps.
//!
//! `a.b.c` addresses `map[a][b][c]`. Segments are opaque byte strings; the
//! dot is always a separator.
//!
//! Semantics:
//! - a path holding a stored null is *set*: [`get`] returns `Some(&Null)`
//!   and [`isset`] returns `true`. Only [`unset`] makes it absent.
//! - [`unset`] removes the leaf only. Ancestors left empty are kept.
//! - [`set`] through a segment holding a scalar replaces the scalar with a
//!   nested map.

use crate::value::{DynMap, DynValue};
use bytes::Bytes;

/// Split a dotted path into its segments. Always yields at least one.
pub fn segments(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|b| *b == b'.')
}

/// Look up a path. `None` means absent, as opposed to a stored null.
pub fn get<'a>(root: &'a DynMap, path: impl AsRef<[u8]>) -> Option<&'a DynValue> {
    let mut segs = segments(path.as_ref());
    let mut current = root.get(segs.next()?)?;
    for seg in segs {
        current = current.as_map()?.get(seg)?;
    }
    Some(current)
}

fn get_mut<'a>(root: &'a mut DynMap, path: &[u8]) -> Option<&'a mut DynValue> {
    let mut segs = segments(path);
    let mut current = root.get_mut(segs.next()?)?;
    for seg in segs {
        current = current.as_map_mut()?.get_mut(seg)?;
    }
    Some(current)
}

/// Store `value` at `path`, creating the missing part of the path as a chain
/// of nested maps hung off the deepest existing map.
pub fn set(root: &mut DynMap, path: impl AsRef<[u8]>, value: DynValue) {
    let path = path.as_ref();
    let (parents, leaf) = split_leaf(path);
    let mut node = root;
    if let Some(parents) = parents {
        for seg in segments(parents) {
            let child = node
                .entry(Bytes::copy_from_slice(seg))
                .or_insert_with(DynValue::map);
            node = ensure_map(child);
        }
    }
    node.insert(Bytes::copy_from_slice(leaf), value);
}

/// Whether every segment of `path` resolves to an existing entry.
pub fn isset(root: &DynMap, path: impl AsRef<[u8]>) -> bool {
    get(root, path).is_some()
}

/// Remove the entry at `path`, returning it if it was present.
pub fn unset(root: &mut DynMap, path: impl AsRef<[u8]>) -> Option<DynValue> {
    let (parents, leaf) = split_leaf(path.as_ref());
    match parents {
        None => root.remove(leaf),
        Some(parents) => get_mut(root, parents)?.as_map_mut()?.remove(leaf),
    }
}

fn split_leaf(path: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match path.iter().rposition(|b| *b == b'.') {
        Some(pos) => (Some(&path[..pos]), &path[pos + 1..]),
        None => (None, path),
    }
}

fn ensure_map(value: &mut DynValue) -> &mut DynMap {
    if !matches!(value, DynValue::Map(_)) {
        *value = DynValue::map();
    }
    match value {
        DynValue::Map(map) => map,
        _ => unreachable!("value was just replaced by a map"),
    }
}
