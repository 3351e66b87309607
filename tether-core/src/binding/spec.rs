//! Binding declarations.

use std::fmt;
use std::sync::Arc;

use crate::object::Object;
use crate::value::Value;

/// Which way a value is travelling through a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Source to destination.
    Forward,
    /// Destination back to source.
    Backward,
}

/// Maps a value on its way across a binding.
pub type Transform = dyn Fn(&Value, Direction) -> Value + Send + Sync;

/// Declaration of a binding between two paths.
///
/// The short form is just the source path, converted with `From<&str>`:
///
/// ```rust,ignore
/// runtime.bind(&view, "title", "App.controller.title")?;
/// runtime.connect(
///     BindingSpec::new("App.user.age")
///         .to("App.form.age")
///         .one_way()
///         .transform(|v, _| v.clone()),
/// )?;
/// ```
#[derive(Clone)]
pub struct BindingSpec {
    source: String,
    dest: Option<String>,
    base: Option<Object>,
    one_way: bool,
    transform: Option<Arc<Transform>>,
}

impl BindingSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: None,
            base: None,
            one_way: false,
            transform: None,
        }
    }

    /// Destination path.
    pub fn to(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Object that relative paths resolve against.
    pub fn relative_to(mut self, base: &Object) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Only propagate source to destination.
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Map values crossing the binding. Bidirectional bindings call the
    /// transform in both directions.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value, Direction) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dest(&self) -> Option<&str> {
        self.dest.as_deref()
    }

    pub fn base(&self) -> Option<&Object> {
        self.base.as_ref()
    }

    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    pub(crate) fn transformer(&self) -> Option<Arc<Transform>> {
        self.transform.clone()
    }
}

impl From<&str> for BindingSpec {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for BindingSpec {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl fmt::Debug for BindingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSpec")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("base", &self.base)
            .field("one_way", &self.one_way)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_is_bidirectional() {
        let spec = BindingSpec::from("App.title");
        assert_eq!(spec.source(), "App.title");
        assert_eq!(spec.dest(), None);
        assert!(!spec.is_one_way());
        assert!(spec.transformer().is_none());
    }

    #[test]
    fn long_form() {
        let base = Object::new();
        let spec = BindingSpec::new(".a")
            .to(".b")
            .relative_to(&base)
            .one_way()
            .transform(|value, _| value.clone());

        assert_eq!(spec.dest(), Some(".b"));
        assert_eq!(spec.base(), Some(&base));
        assert!(spec.is_one_way());
        assert!(spec.transformer().is_some());
    }
}
