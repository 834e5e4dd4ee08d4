use criterion::{Criterion, black_box, criterion_group, criterion_main};
use evex::{EvalOptions, HostFn, Value, evaluate, evaluate_ast, parse};

const QUERY: &str =
    "user.plan == 'pro' && std.clamp(score * weight + bonus, 0, 100) >= threshold \
     ? score |> boost : std.min(score, threshold)";

fn bench_env() -> Value {
    Value::object([
        ("user", Value::object([("plan", Value::from("pro"))])),
        ("score", Value::from(72.5)),
        ("weight", Value::from(1.2)),
        ("bonus", Value::from(3.0)),
        ("threshold", Value::from(80.0)),
        (
            "boost",
            Value::from(HostFn::new(|args| match args {
                [Value::Number(n)] => Ok(Value::Number(n * 1.1)),
                _ => Err("boost expects one number".to_string()),
            })),
        ),
    ])
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_query", |b| {
        b.iter(|| parse(black_box(QUERY)).unwrap())
    });
}

fn bench_eval_ast(c: &mut Criterion) {
    let expr = parse(QUERY).unwrap();
    let env = bench_env();
    let opts = EvalOptions::default();

    c.bench_function("eval_parsed_query", |b| {
        b.iter(|| evaluate_ast(black_box(&expr), black_box(&env), &opts).unwrap())
    });
}

fn bench_end_to_end(c: &mut Criterion) {
    let env = bench_env();
    let opts = EvalOptions::default();

    c.bench_function("parse_and_eval_query", |b| {
        b.iter(|| evaluate(black_box(QUERY), black_box(&env), &opts).unwrap())
    });
}

criterion_group!(hot_paths, bench_parse, bench_eval_ast, bench_end_to_end);
criterion_main!(hot_paths);
