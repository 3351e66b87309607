//! Integration Tests for the Property Runtime
//!
//! These tests verify that objects, paths, bindings and the run loop work
//! together correctly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{
    BindingSpec, Direction, Error, Object, PropertyDescriptor, Runtime, RuntimeConfig, Value,
};

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Object, &str) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let clone = count.clone();
    (count, move |_: &Object, _: &str| {
        clone.fetch_add(1, Ordering::SeqCst);
    })
}

/// Setting the same value twice notifies once.
#[test]
fn idempotent_set() {
    let object = Object::new();
    let (count, observer) = counter();
    object.observe("k", observer);

    object.set("k", "v");
    object.set("k", "v");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// A cacheable property evaluates once per dependency change.
#[test]
fn cache_correctness() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let tally = evaluations.clone();

    let object = Object::builder()
        .value("n", 1)
        .computed(
            "square",
            PropertyDescriptor::getter(move |o: &Object| {
                tally.fetch_add(1, Ordering::SeqCst);
                let n = o.get("n").as_i64().unwrap_or(0);
                n * n
            })
            .depends_on(["n"])
            .cacheable(),
        )
        .build()
        .unwrap();

    assert_eq!(object.get("square"), Value::Int(1));
    assert_eq!(object.get("square"), Value::Int(1));
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    object.set("n", 3);
    assert_eq!(object.get("square"), Value::Int(9));
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

/// Repeated sets inside a bracket notify once after it closes.
#[test]
fn batch_dedup() {
    let object = Object::new();
    let (count, observer) = counter();
    object.observe("k", observer);

    object.begin_property_changes();
    for n in 0..10 {
        object.set("k", n);
    }
    assert_eq!(count.load(Ordering::SeqCst), 0);
    object.end_property_changes();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// Replacing an intermediate object of a chained path reports once.
#[test]
fn chained_relink() {
    let runtime = Runtime::new();
    let a = Object::new();
    let b = Object::new();
    b.set("c", 1);
    a.set("b", &b);
    runtime.register("A", &a);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _observer = runtime
        .observe_path(None, "A*b.c", move |value| sink.lock().push(value.clone()))
        .unwrap();

    let replacement = Object::new();
    replacement.set("c", 2);
    a.set("b", &replacement);
    assert_eq!(*seen.lock(), vec![Value::Int(2)]);

    let twin = Object::new();
    twin.set("c", 2);
    a.set("b", &twin);
    assert_eq!(seen.lock().len(), 1);

    // Only the current chain is watched.
    replacement.set("c", 10);
    twin.set("c", 3);
    assert_eq!(*seen.lock(), vec![Value::Int(2), Value::Int(3)]);
}

/// Without the marker, replacing the intermediate object is not observed.
#[test]
fn unchained_path_stays_on_original_object() {
    let runtime = Runtime::new();
    let a = Object::new();
    let b = Object::new();
    a.set("b", &b);
    runtime.register("A", &a);

    let (count, _) = counter();
    let fired = count.clone();
    let _observer = runtime
        .observe_path(None, "A.b.c", move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let replacement = Object::new();
    replacement.set("c", 1);
    a.set("b", &replacement);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

/// Bidirectional bindings converge in both directions without looping.
#[test]
fn bidirectional_convergence() {
    let runtime = Runtime::new();
    let x = Object::new();
    let y = Object::new();
    runtime.register("X", &x);
    runtime.register("Y", &y);

    runtime.connect(BindingSpec::new("X.a").to("Y.b")).unwrap();
    runtime.settle().unwrap();

    x.set("a", 5);
    runtime.flush();
    assert_eq!(y.get("b"), Value::Int(5));

    y.set("b", 7);
    runtime.flush();
    assert_eq!(x.get("a"), Value::Int(7));

    assert!(runtime.run_loop().is_idle());
    let report = runtime.flush();
    assert!(report.is_empty());
}

/// Two bindings pointing at each other settle instead of ping-ponging.
#[test]
fn mutual_bindings_settle() {
    let runtime = Runtime::new();
    let x = Object::new();
    let y = Object::new();
    runtime.register("X", &x);
    runtime.register("Y", &y);

    runtime.connect(BindingSpec::new("X.a").to("Y.b")).unwrap();
    runtime.connect(BindingSpec::new("Y.b").to("X.a")).unwrap();
    runtime.settle().unwrap();

    x.set("a", 1);
    let passes = runtime.settle().unwrap();
    assert!(passes <= 2);
    assert_eq!(y.get("b"), Value::Int(1));
    assert_eq!(x.get("a"), Value::Int(1));
}

/// A one-way binding never writes back to its source.
#[test]
fn one_way_isolation() {
    let runtime = Runtime::new();
    let x = Object::new();
    let y = Object::new();
    x.set("a", 1);
    runtime.register("X", &x);
    runtime.register("Y", &y);

    runtime
        .connect(BindingSpec::new("X.a").to("Y.b").one_way())
        .unwrap();
    runtime.flush();
    assert_eq!(y.get("b"), Value::Int(1));

    y.set("b", 99);
    for _ in 0..3 {
        runtime.flush();
    }
    assert_eq!(x.get("a"), Value::Int(1));
    assert_eq!(y.get("b"), Value::Int(99));

    x.set("a", 2);
    runtime.flush();
    assert_eq!(y.get("b"), Value::Int(2));
}

/// Disconnecting a dirty binding drops its queued sync.
#[test]
fn disconnect_cancels_pending_sync() {
    let runtime = Runtime::new();
    let x = Object::new();
    let y = Object::new();
    runtime.register("X", &x);
    runtime.register("Y", &y);

    let binding = runtime.connect(BindingSpec::new("X.a").to("Y.b")).unwrap();
    runtime.flush();

    x.set("a", 1);
    assert!(binding.is_dirty());
    runtime.disconnect(&binding);
    runtime.flush();

    assert_eq!(y.get("b"), Value::Undefined);
    assert_eq!(x.observer_count("a"), 0);
}

/// A binding can disconnect another one queued later in the same flush.
#[test]
fn disconnect_during_flush_skips_binding() {
    let runtime = Runtime::new();
    let source = Object::new();
    let first = Object::new();
    let second = Object::new();
    runtime.register("S", &source);
    runtime.register("F", &first);
    runtime.register("T", &second);

    runtime.connect(BindingSpec::new("S.v").to("F.v")).unwrap();
    let victim = runtime.connect(BindingSpec::new("S.v").to("T.v")).unwrap();
    runtime.flush();

    let handle = victim.clone();
    first.observe("v", move |_, _| {
        handle.disconnect();
    });

    source.set("v", 1);
    let report = runtime.flush();
    assert_eq!(report.synced, 1);
    assert_eq!(first.get("v"), Value::Int(1));
    assert_eq!(second.get("v"), Value::Undefined);
}

/// Bindings dirtied during a flush run in the next one.
#[test]
fn next_flush_deferral() {
    let runtime = Runtime::new();
    let a = Object::new();
    let b = Object::new();
    let c = Object::new();
    for (name, object) in [("A", &a), ("B", &b), ("C", &c)] {
        runtime.register(name, object);
    }

    runtime.connect(BindingSpec::new("A.v").to("B.v").one_way()).unwrap();
    runtime.connect(BindingSpec::new("B.v").to("C.v").one_way()).unwrap();
    runtime.settle().unwrap();

    a.set("v", "hello");
    runtime.flush();
    assert_eq!(b.get("v"), Value::from("hello"));
    assert_eq!(c.get("v"), Value::Undefined);

    runtime.flush();
    assert_eq!(c.get("v"), Value::from("hello"));
}

/// Transforms convert values in both directions.
#[test]
fn transformed_binding() {
    let runtime = Runtime::new();
    let model = Object::new();
    model.set("celsius", 100.0);
    runtime.register("Model", &model);

    let view = Object::new();
    runtime
        .bind(
            &view,
            "fahrenheit",
            BindingSpec::new("Model.celsius").transform(|value, direction| {
                let n = value.as_f64().unwrap_or(0.0);
                match direction {
                    Direction::Forward => Value::Float(n * 9.0 / 5.0 + 32.0),
                    Direction::Backward => Value::Float((n - 32.0) * 5.0 / 9.0),
                }
            }),
        )
        .unwrap();

    runtime.flush();
    assert_eq!(view.get("fahrenheit"), Value::Float(212.0));

    view.set("fahrenheit", 32.0);
    runtime.flush();
    assert_eq!(model.get("celsius"), Value::Float(0.0));
}

/// A binding through a chained path follows the replaced object.
#[test]
fn binding_follows_chained_source() {
    let runtime = Runtime::new();
    let app = Object::new();
    let first = Object::new();
    first.set("name", "first");
    app.set("user", &first);
    runtime.register("App", &app);

    let label = Object::new();
    runtime
        .bind(&label, "text", BindingSpec::new("App*user.name").one_way())
        .unwrap();
    runtime.flush();
    assert_eq!(label.get("text"), Value::from("first"));

    let second = Object::new();
    second.set("name", "second");
    app.set("user", &second);
    runtime.flush();
    assert_eq!(label.get("text"), Value::from("second"));
}

/// A binding to a computed property updates when its dependencies change.
#[test]
fn binding_to_computed_property() {
    let runtime = Runtime::new();
    let person = Object::builder()
        .value("first", "Ada")
        .value("last", "Lovelace")
        .computed(
            "full",
            PropertyDescriptor::getter(|p: &Object| {
                format!(
                    "{} {}",
                    p.get("first").as_str().unwrap_or_default(),
                    p.get("last").as_str().unwrap_or_default()
                )
            })
            .depends_on(["first", "last"])
            .cacheable(),
        )
        .build()
        .unwrap();
    runtime.register("Person", &person);

    let label = Object::new();
    runtime.bind(&label, "text", "Person.full").unwrap();
    runtime.flush();
    assert_eq!(label.get("text"), Value::from("Ada Lovelace"));

    person.set("first", "Augusta");
    runtime.flush();
    assert_eq!(label.get("text"), Value::from("Augusta Lovelace"));
}

/// Coalesced objects notify at the flush point, after bindings.
#[test]
fn coalesced_notifications() {
    let runtime = Runtime::new();
    let object = Object::new();
    let (count, observer) = counter();
    object.observe("k", observer);

    runtime.coalesce(&object);
    object.set("k", 1);
    object.set("k", 2);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    runtime.flush();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// Settling gives up after the configured number of passes.
#[test]
fn settle_limit() {
    let runtime = Runtime::with_config(RuntimeConfig::from_json(r#"{"max_settle_passes": 2}"#).unwrap());
    let object = Object::new();
    runtime.register("O", &object);

    // Each flush schedules another increment.
    fn bump(runtime: Runtime, object: Object) {
        object.increment_property("n", 1);
        let next = runtime.clone();
        runtime.invoke_last(move || bump(next, object));
    }
    let (rt, obj) = (runtime.clone(), object.clone());
    runtime.invoke_last(move || bump(rt, obj));

    assert!(matches!(runtime.settle(), Err(Error::SettleLimit { passes: 2 })));
    assert_eq!(object.get("n"), Value::Int(2));
}

/// Broken paths read as undefined and heal.
#[test]
fn broken_path_heals() {
    let runtime = Runtime::new();
    let app = Object::new();
    runtime.register("App", &app);

    let label = Object::new();
    runtime
        .bind(&label, "text", BindingSpec::new("App*user.name").one_way())
        .unwrap();
    let report = runtime.flush();
    assert_eq!(report.failed, 0);
    assert_eq!(label.get("text"), Value::Undefined);

    assert!(matches!(
        runtime.get_path(None, "App.user.name"),
        Err(Error::PathResolution { .. })
    ));

    let user = Object::new();
    user.set("name", "late");
    app.set("user", &user);
    runtime.flush();
    assert_eq!(label.get("text"), Value::from("late"));
}

/// Objects hydrated from JSON take part in bindings like any other.
#[test]
fn hydrated_objects() {
    let runtime = Runtime::new();
    let state = Value::from_json(serde_json::json!({
        "user": { "name": "Ada", "tags": ["math"] },
        "count": 3
    }));
    let root = state.as_object().unwrap().clone();
    runtime.register("State", &root);

    assert_eq!(runtime.get_path(None, "State.user.name").unwrap(), Value::from("Ada"));
    runtime.set_path(None, "State.user.name", "Grace").unwrap();
    assert_eq!(
        root.snapshot(),
        serde_json::json!({ "user": { "name": "Grace", "tags": ["math"] }, "count": 3 })
    );
}

/// A cycle of computed properties across objects reads as an error and a
/// change inside it is dispatched once around the loop, then stops.
#[test]
fn cross_object_cycle_is_reported() {
    let a = Object::new();
    let b = Object::builder()
        .value("other", &a)
        .computed(
            "q",
            PropertyDescriptor::getter(|o: &Object| o.get_path("other.p").unwrap_or_default())
                .depends_on(["other.p"]),
        )
        .build()
        .unwrap();
    a.set("other", &b);
    a.define_property(
        "p",
        PropertyDescriptor::getter(|o: &Object| o.get_path("other.q").unwrap_or_default())
            .depends_on(["other.q"])
            .cacheable(),
    )
    .unwrap();

    let (p_count, p_observer) = counter();
    a.observe("p", p_observer);
    let (q_count, q_observer) = counter();
    b.observe("q", q_observer);

    assert!(matches!(a.try_get("p"), Err(Error::DependencyCycle { .. })));
    assert!(matches!(b.try_get("q"), Err(Error::DependencyCycle { .. })));
    assert_eq!(a.get("p"), Value::Undefined);

    a.notify_property_change("p");
    assert_eq!(p_count.load(Ordering::SeqCst), 1);
    assert_eq!(q_count.load(Ordering::SeqCst), 1);
}

/// NaN written through mutual bindings settles instead of bouncing.
#[test]
fn nan_settles_through_mutual_bindings() {
    let runtime = Runtime::new();
    let x = Object::new();
    let y = Object::new();
    runtime.register("X", &x);
    runtime.register("Y", &y);

    runtime.connect(BindingSpec::new("X.a").to("Y.b")).unwrap();
    runtime.connect(BindingSpec::new("Y.b").to("X.a")).unwrap();
    runtime.settle().unwrap();

    x.set("a", f64::NAN);
    assert!(runtime.settle().is_ok());
    assert_eq!(y.get("b"), Value::from(f64::NAN));
    assert!(runtime.run_loop().is_idle());
}
