//! Runtime
//!
//! A [`Runtime`] bundles what path resolution and bindings need beyond a
//! single object: the namespace absolute paths start from, the run loop
//! bindings queue on, and the configuration.
//!
//! Runtimes are independent of each other. Objects can be shared between
//! them, but a binding belongs to the runtime that connected it.

use std::sync::Arc;

use tracing::debug;

use crate::binding::{Binding, BindingSpec, Endpoint, FlushReport, RunLoop};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::path::{resolve, Namespace, PathObserver, PropertyPath};
use crate::value::Value;

/// Handle to a property runtime.
///
/// Cloning the handle shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    namespace: Namespace,
    run_loop: RunLoop,
    config: Arc<RuntimeConfig>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(max_settle_passes = config.max_settle_passes, "runtime created");
        Self {
            namespace: Namespace::new(),
            run_loop: RunLoop::with_config(&config),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Make `object` reachable as the first segment of absolute paths.
    /// Returns the object previously registered under `name`.
    pub fn register(&self, name: &str, object: &Object) -> Option<Object> {
        self.namespace.register(name, object.clone())
    }

    pub fn unregister(&self, name: &str) -> Option<Object> {
        self.namespace.unregister(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Object> {
        self.namespace.lookup(name)
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Read `path`. Relative paths resolve against `base`.
    pub fn get_path(&self, base: Option<&Object>, path: &str) -> Result<Value> {
        let path = PropertyPath::parse(path)?;
        resolve::get(&path, Some(&self.namespace), base)
    }

    /// Write `path`. Relative paths resolve against `base`.
    pub fn set_path(&self, base: Option<&Object>, path: &str, value: impl Into<Value>) -> Result<()> {
        let path = PropertyPath::parse(path)?;
        resolve::set(&path, Some(&self.namespace), base, value.into())
    }

    /// Watch the value at `path`. The observer stops when dropped.
    pub fn observe_path<F>(&self, base: Option<&Object>, path: &str, callback: F) -> Result<PathObserver>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let path = PropertyPath::parse(path)?;
        PathObserver::watch(&path, Some(&self.namespace), base, callback)
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Connect the source and destination paths named by `spec`.
    pub fn connect(&self, spec: impl Into<BindingSpec>) -> Result<Binding> {
        let spec = spec.into();
        let dest = spec.dest().ok_or_else(|| Error::InvalidPath {
            path: spec.source().to_string(),
            reason: "binding has no destination",
        })?;

        let source = Endpoint {
            path: PropertyPath::parse(spec.source())?,
            base: spec.base().cloned(),
        };
        let dest = Endpoint {
            path: PropertyPath::parse(dest)?,
            base: spec.base().cloned(),
        };
        self.link(&spec, source, dest)
    }

    /// Bind `key` of `object` to the source path named by `spec`.
    ///
    /// Relative source paths resolve against `object` unless the spec names
    /// another base.
    pub fn bind(&self, object: &Object, key: &str, spec: impl Into<BindingSpec>) -> Result<Binding> {
        let spec = spec.into();
        let base = spec.base().unwrap_or(object).clone();

        let source = Endpoint {
            path: PropertyPath::parse(spec.source())?,
            base: Some(base),
        };
        let dest = Endpoint {
            path: PropertyPath::relative(key)?,
            base: Some(object.clone()),
        };
        self.link(&spec, source, dest)
    }

    fn link(&self, spec: &BindingSpec, source: Endpoint, dest: Endpoint) -> Result<Binding> {
        Binding::connect(
            &self.run_loop,
            Some(&self.namespace),
            source,
            dest,
            spec.is_one_way(),
            spec.transformer(),
        )
    }

    /// Disconnect `binding`, the counterpart of [`Runtime::connect`] and
    /// [`Runtime::bind`]. Same as [`Binding::disconnect`]; returns `false`
    /// if it was already disconnected.
    pub fn disconnect(&self, binding: &Binding) -> bool {
        binding.disconnect()
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Apply the bindings and tasks queued so far.
    pub fn flush(&self) -> FlushReport {
        self.run_loop.flush()
    }

    /// Flush until nothing is queued.
    pub fn settle(&self) -> Result<usize> {
        self.run_loop.settle()
    }

    pub fn invoke_last<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_loop.invoke_last(task);
    }

    pub fn coalesce(&self, object: &Object) -> bool {
        self.run_loop.coalesce(object)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_and_relative_paths() {
        let runtime = Runtime::new();
        let app = Object::new();
        let user = Object::new();
        user.set("name", "Ada");
        app.set("user", &user);
        runtime.register("App", &app);

        assert_eq!(runtime.get_path(None, "App.user.name").unwrap(), Value::from("Ada"));
        assert_eq!(runtime.get_path(Some(&app), ".user.name").unwrap(), Value::from("Ada"));

        runtime.set_path(None, "App.user.name", "Grace").unwrap();
        assert_eq!(user.get("name"), Value::from("Grace"));

        assert!(matches!(runtime.get_path(None, "Nope.x"), Err(Error::UnknownRoot(_))));
    }

    #[test]
    fn connect_requires_destination() {
        let runtime = Runtime::new();
        assert!(matches!(
            runtime.connect("App.x"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn bind_short_form() {
        let runtime = Runtime::new();
        let app = Object::new();
        app.set("title", "hello");
        runtime.register("App", &app);

        let view = Object::new();
        let binding = runtime.bind(&view, "title", "App.title").unwrap();
        runtime.flush();
        assert_eq!(view.get("title"), Value::from("hello"));

        view.set("title", "edited");
        runtime.flush();
        assert_eq!(app.get("title"), Value::from("edited"));

        assert!(runtime.disconnect(&binding));
        assert_eq!(runtime.run_loop().binding_count(), 0);
    }

    #[test]
    fn connect_unknown_root_fails() {
        let runtime = Runtime::new();
        let result = runtime.connect(BindingSpec::new("Missing.a").to("Missing.b"));
        assert!(matches!(result, Err(Error::UnknownRoot(_))));
        assert_eq!(runtime.run_loop().binding_count(), 0);
    }

    #[test]
    fn observe_path_reports_changes() {
        let runtime = Runtime::new();
        let app = Object::new();
        runtime.register("App", &app);

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = runtime
            .observe_path(None, "App.count", move |value| sink.lock().push(value.clone()))
            .unwrap();

        app.set("count", 1);
        drop(observer);
        app.set("count", 2);
        assert_eq!(*seen.lock(), vec![Value::Int(1)]);
    }
}
