use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mqjs_bridge::{Engine, PropertyAttribute, to_json};

const FIB: &str = r#"
    function fib(n) {
        if (n <= 1) return n;
        var a = 0;
        var b = 1;
        for (var i = 2; i <= n; i = i + 1) {
            var c = a + b;
            a = b;
            b = c;
        }
        return b;
    }
    var sum = 0;
    for (var i = 0; i < 1000; i = i + 1) {
        sum = sum + fib(30);
    }
    sum
"#;

fn bench_new_context(c: &mut Criterion) {
    let engine = Engine::new();
    c.bench_function("new context", |b| b.iter(|| black_box(engine.new_context(None))));
}

fn bench_compile(c: &mut Criterion) {
    let engine = Engine::new();
    c.bench_function("compile fib", |b| b.iter(|| black_box(engine.compile(FIB, None, None).unwrap())));

    let data = engine.pre_compile(FIB).unwrap();
    c.bench_function("compile fib precompiled", |b| {
        b.iter(|| black_box(engine.compile(FIB, None, Some(&data)).unwrap()))
    });
}

fn bench_run(c: &mut Criterion) {
    let engine = Engine::new();
    let context = engine.new_context(None);
    let script = engine.compile(FIB, None, None).unwrap();
    c.bench_function("run fib 1k", |b| b.iter(|| black_box(script.run(&context).unwrap())));
}

fn bench_workloads(c: &mut Criterion) {
    let workloads = [
        (
            "loop 10k",
            "var sum = 0; for (var i = 0; i < 10000; i = i + 1) { sum = sum + i; } sum",
        ),
        (
            "array push 10k",
            "var arr = []; for (var i = 0; i < 10000; i = i + 1) { arr.push(i); } arr.length",
        ),
        (
            "object create 1k",
            r#"
                function Point(x, y) {
                    this.x = x;
                    this.y = y;
                }
                var points = [];
                for (var i = 0; i < 1000; i = i + 1) {
                    points.push(new Point(i, i * 2));
                }
                points.length
            "#,
        ),
        (
            "json parse 1k",
            r#"
                var data = '{"name": "test", "value": 42, "items": [1, 2, 3]}';
                var sum = 0;
                for (var i = 0; i < 1000; i = i + 1) {
                    sum = sum + JSON.parse(data).value;
                }
                sum
            "#,
        ),
    ];

    let engine = Engine::new();
    for (name, code) in workloads {
        let script = engine.compile(code, None, None).unwrap();
        c.bench_function(name, |b| {
            b.iter(|| {
                let context = engine.new_context(None);
                black_box(script.run(&context).unwrap())
            })
        });
    }
}

fn bench_host_calls(c: &mut Criterion) {
    let engine = Engine::new();
    let add = engine.new_function_template(|info| {
        let sum = info.get(0).to_number() + info.get(1).to_number();
        info.return_value().set_number(sum);
    });
    let context = engine.new_context(None);
    context.scope(|scope| {
        let add = add.new_function(scope).unwrap();
        scope.global().set_property("add", &add, PropertyAttribute::NONE);
    });
    let script = engine
        .compile("var s = 0; for (var i = 0; i < 1000; i = i + 1) { s = add(s, i); } s", None, None)
        .unwrap();

    c.bench_function("host calls 1k", |b| b.iter(|| black_box(script.run(&context).unwrap())));
}

fn bench_properties(c: &mut Criterion) {
    let engine = Engine::new();
    let context = engine.new_context(None);
    let object = context.scope(|scope| scope.new_object());
    let value = engine.true_value();

    c.bench_function("set and get property", |b| {
        b.iter(|| {
            object.set_property("flag", &value, PropertyAttribute::NONE);
            black_box(object.get_property("flag").unwrap())
        })
    });
}

fn bench_to_json(c: &mut Criterion) {
    let engine = Engine::new();
    let value = engine
        .parse_json(r#"{"name": "test", "value": 42, "items": [1, 2, 3], "nested": {"ok": true}}"#)
        .unwrap();

    c.bench_function("to json", |b| b.iter(|| black_box(to_json(&value))));
}

criterion_group!(
    benches,
    bench_new_context,
    bench_compile,
    bench_run,
    bench_workloads,
    bench_host_calls,
    bench_properties,
    bench_to_json,
);

criterion_main!(benches);
