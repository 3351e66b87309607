//! Path Resolution
//!
//! Walks a parsed path one `get` at a time. Every non-terminal segment must
//! hold an object; the terminal key may hold anything, including nothing.

use tracing::trace;

use super::namespace::Namespace;
use super::parse::{Anchor, PropertyPath};
use crate::error::{Error, Result};
use crate::object::Object;
use crate::value::Value;

/// Find the object resolution starts from.
pub fn anchor_object(
    path: &PropertyPath,
    namespace: Option<&Namespace>,
    base: Option<&Object>,
) -> Result<Object> {
    match path.anchor() {
        Anchor::Base => base.cloned().ok_or_else(|| Error::PathResolution {
            path: path.to_string(),
            segment: ".".to_string(),
        }),
        Anchor::Root(name) => namespace
            .and_then(|namespace| namespace.lookup(name))
            .ok_or_else(|| Error::UnknownRoot(name.to_string())),
    }
}

/// Follow `segments` from `object`, requiring each one to hold an object.
pub fn walk<'a, I>(path: &PropertyPath, mut object: Object, segments: I) -> Result<Object>
where
    I: IntoIterator<Item = &'a str>,
{
    for segment in segments {
        object = match object.get(segment) {
            Value::Object(next) => next,
            other => {
                trace!(path = %path, segment, value = ?other, "path segment is not an object");
                return Err(Error::PathResolution {
                    path: path.to_string(),
                    segment: segment.to_string(),
                });
            }
        };
    }
    Ok(object)
}

/// Resolve `path` to the object holding its terminal key.
pub fn resolve(
    path: &PropertyPath,
    namespace: Option<&Namespace>,
    base: Option<&Object>,
) -> Result<Object> {
    let anchor = anchor_object(path, namespace, base)?;
    let count = path.segments().len() - 1;
    walk(path, anchor, path.segments().take(count))
}

/// Read the value at `path`.
pub fn get(path: &PropertyPath, namespace: Option<&Namespace>, base: Option<&Object>) -> Result<Value> {
    resolve(path, namespace, base)?.try_get(path.terminal_key())
}

/// Write the value at `path`.
pub fn set(
    path: &PropertyPath,
    namespace: Option<&Namespace>,
    base: Option<&Object>,
    value: Value,
) -> Result<()> {
    resolve(path, namespace, base)?.set(path.terminal_key(), value);
    Ok(())
}
