//! Path Observers
//!
//! A path observer watches the value at the end of a property path. It
//! installs one ordinary observer per watched segment, each on the object
//! currently holding that segment:
//!
//! ```text
//! App*b.c     App --b--> B --c--> value
//!             ^ watch b   ^ watch c
//! ```
//!
//! When a non-terminal link fires, the object behind it was replaced. The
//! observer then drops its registrations further down the old chain,
//! resolves the rest of the path against the new object, registers on the
//! new chain and reports the new terminal value once. A re-link that ends
//! at an equal value is not reported. A change of the terminal key itself is
//! always reported.
//!
//! A chain that runs into a missing object stops there. Its terminal value
//! reads as `Undefined` and it keeps watching the last reachable link, so
//! it heals as soon as the missing object appears.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::namespace::Namespace;
use super::parse::PropertyPath;
use super::resolve;
use crate::error::{Error, Result};
use crate::object::{Object, Observer, ObserverId, WeakObject};
use crate::value::Value;

/// Callback receiving the value at the end of the path.
pub type PathCallback = dyn Fn(&Value) + Send + Sync;

/// Watches the value at the end of a property path.
///
/// Dropping the observer removes every registration it made.
pub struct PathObserver {
    chain: Arc<Mutex<Chain>>,
}

struct Chain {
    path: Box<str>,
    segments: SmallVec<[Box<str>; 4]>,
    links: SmallVec<[Link; 4]>,
    callback: Arc<PathCallback>,
    last: Value,
    active: bool,
}

/// One installed registration: `observer` watches `key` on `object`.
struct Link {
    object: WeakObject,
    key: Box<str>,
    observer: ObserverId,
}

impl Link {
    fn detach(&self) {
        if let Some(object) = self.object.upgrade() {
            object.remove_observer(&self.key, self.observer);
        }
    }
}

impl PathObserver {
    /// Start watching `path`.
    ///
    /// Absolute paths are anchored in `namespace`, relative ones at `base`.
    /// Segments before the observe-through marker must resolve now; the
    /// watched part may be incomplete.
    pub fn watch<F>(
        path: &PropertyPath,
        namespace: Option<&Namespace>,
        base: Option<&Object>,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let anchor = resolve::anchor_object(path, namespace, base)?;
        let start = resolve::walk(path, anchor, path.fixed_segments().iter().map(|s| &**s))?;
        let segments: SmallVec<[Box<str>; 4]> = path.observed_segments().iter().cloned().collect();

        let chain = Arc::new(Mutex::new(Chain {
            path: path.as_str().into(),
            segments: segments.clone(),
            links: SmallVec::new(),
            callback: Arc::new(callback),
            last: Value::Undefined,
            active: true,
        }));

        let links = build_links(&Arc::downgrade(&chain), &segments, 0, Some(start));
        chain.lock().links = links;

        let observer = Self { chain };
        let last = observer.value();
        let linked = {
            let mut chain = observer.chain.lock();
            chain.last = last;
            chain.links.len()
        };
        debug!(path = %path, linked, watched = segments.len(), "path observer installed");
        Ok(observer)
    }

    /// Watch a path relative to `base`.
    pub fn watch_from<F>(base: &Object, path: &PropertyPath, callback: F) -> Result<Self>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::watch(path, None, Some(base), callback)
    }

    /// Current value at the end of the path, `Undefined` if the chain is
    /// broken.
    pub fn value(&self) -> Value {
        terminal_value(&self.chain)
    }

    /// Write the value at the end of the path.
    pub fn set_value(&self, value: Value) -> Result<()> {
        let (object, key) = terminal(&self.chain)?;
        object.set(&key, value);
        Ok(())
    }

    /// True when every watched segment resolved.
    pub fn is_resolved(&self) -> bool {
        terminal(&self.chain).is_ok()
    }

    /// Number of installed registrations.
    pub fn link_count(&self) -> usize {
        self.chain.lock().links.len()
    }

    pub fn path(&self) -> String {
        self.chain.lock().path.to_string()
    }

    pub fn is_active(&self) -> bool {
        self.chain.lock().active
    }

    /// Remove every registration. Further changes are not reported.
    pub fn disconnect(&self) {
        let (links, path) = {
            let mut chain = self.chain.lock();
            if !chain.active {
                return;
            }
            chain.active = false;
            (std::mem::take(&mut chain.links), chain.path.clone())
        };
        for link in &links {
            link.detach();
        }
        debug!(path = %path, removed = links.len(), "path observer disconnected");
    }
}

impl Drop for PathObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self.chain.lock();
        f.debug_struct("PathObserver")
            .field("path", &chain.path)
            .field("links", &chain.links.len())
            .field("active", &chain.active)
            .finish()
    }
}

/// Register on `segments[start..]`, beginning at `object`, until the chain
/// runs out of objects.
fn build_links(
    chain: &Weak<Mutex<Chain>>,
    segments: &[Box<str>],
    start: usize,
    object: Option<Object>,
) -> SmallVec<[Link; 4]> {
    let mut links = SmallVec::new();
    let mut next = object;

    for (index, key) in segments.iter().enumerate().skip(start) {
        let Some(object) = next.take() else {
            break;
        };

        let id = ObserverId::new();
        let weak = chain.clone();
        object.add_observer(
            key,
            Observer::with_id(id, move |_, _| {
                if let Some(chain) = weak.upgrade() {
                    link_changed(&chain, index, id);
                }
            }),
        );

        if index + 1 < segments.len() {
            next = match object.get(key) {
                Value::Object(child) => Some(child),
                other => {
                    trace!(segment = %key, value = ?other, "chain stops at non-object");
                    None
                }
            };
        }

        links.push(Link {
            object: object.downgrade(),
            key: key.clone(),
            observer: id,
        });
    }

    links
}

fn link_changed(chain: &Arc<Mutex<Chain>>, index: usize, id: ObserverId) {
    let relink = {
        let mut state = chain.lock();
        if !state.active || state.links.get(index).map(|link| link.observer) != Some(id) {
            return;
        }
        if index + 1 == state.segments.len() {
            None
        } else {
            let stale: SmallVec<[Link; 4]> = state.links.drain(index + 1..).collect();
            let holder = state.links[index].object.upgrade();
            let key = state.links[index].key.clone();
            Some((stale, holder, key, state.segments.clone()))
        }
    };

    let Some((stale, holder, key, segments)) = relink else {
        let value = terminal_value(chain);
        let callback = {
            let mut state = chain.lock();
            state.last = value.clone();
            state.callback.clone()
        };
        trace!(value = ?value, "terminal key changed");
        callback(&value);
        return;
    };

    for link in &stale {
        link.detach();
    }

    let next = holder.and_then(|holder| match holder.get(&key) {
        Value::Object(child) => Some(child),
        _ => None,
    });
    let fresh = build_links(&Arc::downgrade(chain), &segments, index + 1, next);

    {
        let mut state = chain.lock();
        if !state.active {
            drop(state);
            for link in &fresh {
                link.detach();
            }
            return;
        }
        state.links.extend(fresh);
    }

    let value = terminal_value(chain);
    let callback = {
        let mut state = chain.lock();
        debug!(
            path = %state.path,
            segment = %key,
            linked = state.links.len(),
            "path re-linked"
        );
        if state.last == value {
            None
        } else {
            state.last = value.clone();
            Some(state.callback.clone())
        }
    };

    if let Some(callback) = callback {
        callback(&value);
    }
}

/// The object holding the terminal key, or the segment where the chain
/// stops.
fn terminal(chain: &Mutex<Chain>) -> Result<(Object, Box<str>)> {
    let state = chain.lock();
    let broken = |segment: &str| Error::PathResolution {
        path: state.path.to_string(),
        segment: segment.to_string(),
    };

    let Some(last) = state.links.last() else {
        return Err(broken(&state.segments[0]));
    };
    if state.links.len() < state.segments.len() {
        return Err(broken(&last.key));
    }
    match last.object.upgrade() {
        Some(object) => Ok((object, last.key.clone())),
        None => Err(broken(&last.key)),
    }
}

fn terminal_value(chain: &Mutex<Chain>) -> Value {
    match terminal(chain) {
        Ok((object, key)) => object.get(&key),
        Err(_) => Value::Undefined,
    }
}
