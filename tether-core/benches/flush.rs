//! Benchmark: set/notify cost and run loop flushes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_core::{BindingSpec, Object, PropertyDescriptor, Runtime};

fn bench_set_notify(c: &mut Criterion) {
    let object = Object::builder()
        .value("n", 0)
        .computed(
            "double",
            PropertyDescriptor::getter(|o: &Object| o.get("n").as_i64().unwrap_or(0) * 2)
                .depends_on(["n"])
                .cacheable(),
        )
        .observer(["double"], |_, _| {})
        .build()
        .unwrap();

    let mut n = 0i64;
    c.bench_function("set_notify", |b| {
        b.iter(|| {
            n += 1;
            object.set("n", n);
            black_box(object.get("double"))
        });
    });
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for count in [1usize, 16, 256] {
        let runtime = Runtime::new();
        let source = Object::new();
        runtime.register("Source", &source);

        let targets: Vec<Object> = (0..count)
            .map(|_| {
                let target = Object::new();
                runtime
                    .bind(&target, "value", BindingSpec::new("Source.value").one_way())
                    .unwrap();
                target
            })
            .collect();
        runtime.settle().unwrap();

        let mut n = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                n += 1;
                source.set("value", n);
                black_box(runtime.flush())
            });
        });
        black_box(&targets);
    }

    group.finish();
}

criterion_group!(benches, bench_set_notify, bench_flush);
criterion_main!(benches);
