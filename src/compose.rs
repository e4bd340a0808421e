//! Representation composition.
//!
//! Builds variant fixtures from a base fixture without touching it. Untouched
//! entries are shared with the base (`Arc` clone), and directives carry over.

use crate::error::{Error, Result};
use crate::representation::{Representation, RepresentationMap, validate_key};
use std::sync::Arc;

/// `base` with every entry of `overrides` inserted or replacing the existing one.
#[must_use]
pub fn copy_with_new_properties(
    base: &RepresentationMap,
    overrides: &RepresentationMap,
) -> RepresentationMap {
    let mut copy = base.clone();
    for key in overrides.keys() {
        if let Some(shared) = overrides.get_shared(key) {
            copy.insert_shared(key.to_string(), Arc::clone(shared));
        }
    }
    copy
}

/// `base` without `keys`. Keys that are not present are ignored.
#[must_use]
pub fn copy_with_removed_properties<S: AsRef<str>>(
    base: &RepresentationMap,
    keys: &[S],
) -> RepresentationMap {
    let mut copy = base.clone();
    for key in keys {
        copy.remove(key.as_ref());
    }
    copy
}

/// One variant per override map, in input order.
#[must_use]
pub fn copy_multiple_with_new_properties(
    base: &RepresentationMap,
    overrides: &[RepresentationMap],
) -> Vec<RepresentationMap> {
    overrides
        .iter()
        .map(|o| copy_with_new_properties(base, o))
        .collect()
}

/// One variant per removal list, in input order.
#[must_use]
pub fn copy_multiple_with_removed_properties<S: AsRef<str>>(
    base: &RepresentationMap,
    removals: &[Vec<S>],
) -> Vec<RepresentationMap> {
    removals
        .iter()
        .map(|keys| copy_with_removed_properties(base, keys))
        .collect()
}

/// Replace the entry at a dotted `path` (`"a.b.c"`), descending through groups.
///
/// Every segment but the last must name an existing [`Representation::Group`].
pub fn updated_copy(
    base: &RepresentationMap,
    path: &str,
    representation: Representation,
) -> Result<RepresentationMap> {
    let segments = split_path(path)?;
    replace_at(base, &segments, Arc::new(representation), path)
}

/// Remove entries at dotted paths. Paths that do not resolve are ignored.
#[must_use]
pub fn copy_with_removed_nested_properties<S: AsRef<str>>(
    base: &RepresentationMap,
    paths: &[S],
) -> RepresentationMap {
    paths.iter().fold(base.clone(), |acc, path| {
        let segments: Vec<&str> = path.as_ref().split('.').collect();
        remove_at(&acc, &segments).unwrap_or(acc)
    })
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::validation(format!("invalid representation path: {path:?}")));
    }
    Ok(segments)
}

fn replace_at(
    map: &RepresentationMap,
    segments: &[&str],
    value: Arc<Representation>,
    full_path: &str,
) -> Result<RepresentationMap> {
    let mut copy = map.clone();
    match segments {
        [] => Err(Error::validation("empty representation path")),
        [leaf] => {
            validate_key(leaf)?;
            copy.insert_shared((*leaf).to_string(), value);
            Ok(copy)
        }
        [head, rest @ ..] => {
            let Some(Representation::Group { kind, children }) = map.get(head) else {
                return Err(Error::validation(format!(
                    "path {full_path:?}: {head:?} is not a nested group"
                )));
            };
            let children = replace_at(children, rest, value, full_path)?;
            copy.insert_shared(
                (*head).to_string(),
                Arc::new(Representation::Group {
                    kind: *kind,
                    children,
                }),
            );
            Ok(copy)
        }
    }
}

fn remove_at(map: &RepresentationMap, segments: &[&str]) -> Option<RepresentationMap> {
    let mut copy = map.clone();
    match segments {
        [] => None,
        [leaf] => copy.remove(leaf).map(|_| copy),
        [head, rest @ ..] => {
            let Some(Representation::Group { kind, children }) = map.get(head) else {
                return None;
            };
            let children = remove_at(children, rest)?;
            copy.insert_shared(
                (*head).to_string(),
                Arc::new(Representation::Group {
                    kind: *kind,
                    children,
                }),
            );
            Some(copy)
        }
    }
}
