// crates/lua-sandbox/benches/sandbox_bench.rs
//
// Two Criterion benchmark groups:
//   cold_start      — create + init + one invoke, a fresh sandbox each iteration
//   warm_throughput — repeated invoke against one already-initialized sandbox

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lua_sandbox::{Sandbox, SandboxConfig};

const SNIPPET_ARITHMETIC: &str = "function process(n) local s = 0 for i = 1, n do s = s + i * i end return s end";
const SNIPPET_TABLE_OUTPUT: &str = r#"
function process(n)
    local rows = {}
    for i = 1, n do rows[i] = { index = i, value = i * i } end
    output(rows)
    return 0
end
"#;

fn cold_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_start");
    group.sample_size(30);

    group.bench_function("create_init_invoke", |b| {
        b.iter(|| {
            let mut sandbox = Sandbox::create(SandboxConfig::default()).expect("create");
            sandbox.init(SNIPPET_ARITHMETIC).expect("init");
            black_box(sandbox.invoke(black_box(100)).expect("invoke"))
        })
    });

    group.finish();
}

fn warm_throughput(c: &mut Criterion) {
    use criterion::Throughput;

    let mut group = c.benchmark_group("warm_throughput");
    group.throughput(Throughput::Elements(1));

    let mut arithmetic_sandbox = Sandbox::create(SandboxConfig::default()).expect("create");
    arithmetic_sandbox.init(SNIPPET_ARITHMETIC).expect("init");
    group.bench_function("arithmetic", |b| {
        b.iter(|| black_box(arithmetic_sandbox.invoke(black_box(500)).expect("invoke")))
    });

    let mut table_output_sandbox = Sandbox::create(SandboxConfig::default()).expect("create");
    table_output_sandbox.init(SNIPPET_TABLE_OUTPUT).expect("init");
    group.bench_function("table_output", |b| {
        b.iter(|| black_box(table_output_sandbox.invoke(black_box(50)).expect("invoke")))
    });

    group.finish();
}

criterion_group!(benches_cold_start, cold_start);
criterion_group!(benches_warm_throughput, warm_throughput);
criterion_main!(benches_cold_start, benches_warm_throughput);
