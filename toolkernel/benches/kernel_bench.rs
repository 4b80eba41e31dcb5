//! Benchmarks for tool lookup and argument validation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use toolkernel::tools::{closest_match, similarity_ratio, validate_arguments, ToolDefinition};

fn similarity_benchmark(c: &mut Criterion) {
    c.bench_function("similarity_ratio", |b| {
        b.iter(|| similarity_ratio(black_box("read_file"), black_box("read_files")))
    });

    let names: Vec<String> = (0..200).map(|i| format!("tool_{i}")).collect();
    c.bench_function("closest_match_200", |b| {
        b.iter(|| closest_match(black_box("tool_19x"), names.iter().map(String::as_str)))
    });
}

fn validation_benchmark(c: &mut Criterion) {
    let def = ToolDefinition::new("write_file", "Writes a file").with_parameters(json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "content": {"type": "string"},
            "mode": {"type": "integer"}
        },
        "required": ["path", "content"]
    }));
    let args = json!({"path": "/tmp/a", "content": "hello", "mode": 420})
        .as_object()
        .cloned()
        .unwrap_or_default();

    c.bench_function("validate_arguments", |b| {
        b.iter(|| validate_arguments(black_box(&def), black_box(&args)))
    });
}

criterion_group!(benches, similarity_benchmark, validation_benchmark);
criterion_main!(benches);
