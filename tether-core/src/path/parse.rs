//! Path Grammar
//!
//! ```text
//! name            local key on the base object
//! .a.b            relative to the base object
//! Root.a.b        first segment names a root in the namespace
//! Root*a.b        observe-through: every segment after `*` is watched
//! .a*b.c  *a.b    the same, relative to the base object
//! ```
//!
//! Segments before the marker are resolved once. Without a marker only the
//! terminal key is watched, on the second-to-last object.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Separator between segments.
pub const SEPARATOR: char = '.';

/// Observe-through marker.
pub const CHAIN_MARKER: char = '*';

/// Where resolution starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// The base object supplied by the caller.
    Base,
    /// A root registered in the namespace.
    Root(Box<str>),
}

/// A parsed property path.
#[derive(Clone, PartialEq, Eq)]
pub struct PropertyPath {
    source: Box<str>,
    anchor: Anchor,
    segments: SmallVec<[Box<str>; 4]>,
    /// Index of the first watched segment.
    observe_from: usize,
}

impl PropertyPath {
    /// Parse a path string.
    pub fn parse(path: &str) -> Result<Self> {
        let relative = path.starts_with(SEPARATOR) || path.starts_with(CHAIN_MARKER);
        let (segments, marker) = split(path)?;

        if relative || (segments.len() == 1 && marker.is_none()) {
            let observe_from = marker.unwrap_or(segments.len() - 1);
            return Ok(Self {
                source: path.into(),
                anchor: Anchor::Base,
                segments,
                observe_from,
            });
        }

        let mut segments = segments;
        let root = segments.remove(0);
        // The marker cannot precede the root, so it is at least 1 here.
        let observe_from = marker.map_or(segments.len() - 1, |m| m - 1);
        Ok(Self {
            source: path.into(),
            anchor: Anchor::Root(root),
            segments,
            observe_from,
        })
    }

    /// Parse a path that is always resolved against a base object, as
    /// `Object::get_path` does. A leading `.` is optional.
    pub fn relative(path: &str) -> Result<Self> {
        let (segments, marker) = split(path)?;
        let observe_from = marker.unwrap_or(segments.len() - 1);
        Ok(Self {
            source: path.into(),
            anchor: Anchor::Base,
            segments,
            observe_from,
        })
    }

    /// Watch every segment, as if the path started with the marker.
    pub fn observe_all(mut self) -> Self {
        self.observe_from = 0;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn segments(&self) -> impl ExactSizeIterator<Item = &str> {
        self.segments.iter().map(|s| &**s)
    }

    pub fn first_segment(&self) -> &str {
        &self.segments[0]
    }

    pub fn terminal_key(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Segments resolved once, before observation starts.
    pub fn fixed_segments(&self) -> &[Box<str>] {
        &self.segments[..self.observe_from]
    }

    /// Segments watched for replacement; the last one is the terminal key.
    pub fn observed_segments(&self) -> &[Box<str>] {
        &self.segments[self.observe_from..]
    }

    /// True when more than the terminal key is watched.
    pub fn is_chained(&self) -> bool {
        self.observe_from + 1 < self.segments.len()
    }

    /// A single key on the base object.
    pub fn is_local(&self) -> bool {
        self.anchor == Anchor::Base && self.segments.len() == 1
    }
}

impl fmt::Debug for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyPath({:?})", self.source)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

type Segments = SmallVec<[Box<str>; 4]>;

/// Split into segments and the index of the segment the marker precedes.
fn split(path: &str) -> Result<(Segments, Option<usize>)> {
    let invalid = |reason| Error::InvalidPath {
        path: path.to_string(),
        reason,
    };

    let body = path.strip_prefix(SEPARATOR).unwrap_or(path);
    if body.is_empty() {
        return Err(invalid("empty path"));
    }

    let mut segments = Segments::new();
    let mut marker = None;
    let mut start = 0;

    for (index, c) in body.char_indices() {
        if c != SEPARATOR && c != CHAIN_MARKER {
            continue;
        }
        let segment = &body[start..index];
        start = index + c.len_utf8();

        let leading_marker = c == CHAIN_MARKER && index == 0;
        if segment.is_empty() && !leading_marker {
            return Err(invalid("empty segment"));
        }
        if !segment.is_empty() {
            segments.push(segment.into());
        }
        if c == CHAIN_MARKER {
            if marker.is_some() {
                return Err(invalid("more than one observe-through marker"));
            }
            marker = Some(segments.len());
        }
    }

    let last = &body[start..];
    if last.is_empty() {
        return Err(invalid("path ends with a separator"));
    }
    segments.push(last.into());

    Ok((segments, marker))
}
