// In chunkwire-core/benches/parser_bench.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chunkwire::{ChunkMeta, ChunkParser, ChunkParserVersion, ResultFormat};

// --- Mock Data Generation ---

/// A JSON chunk body of `rows` rows, each with an id, a decimal, a label and a null.
fn generate_json_chunk(rows: usize) -> String {
    let mut body = String::from("[");
    for i in 0..rows {
        if i > 0 {
            body.push(',');
        }
        body.push_str(&format!(
            r#"["{}","{}.{:02}","label \"{}\" with escapes",null]"#,
            i,
            i * 3,
            i % 100,
            i
        ));
    }
    body.push(']');
    body
}

// --- Benchmark Suite ---

const ROWS: usize = 20_000;

fn bench_json_parsers(c: &mut Criterion) {
    let body = generate_json_chunk(ROWS);

    let mut group = c.benchmark_group("JSON Chunk Parsers");
    group.throughput(criterion::Throughput::Bytes(body.len() as u64));

    for (name, version) in [
        ("[1] Whole Buffer", ChunkParserVersion::WholeBuffer),
        ("[2] Streaming", ChunkParserVersion::Streaming),
        ("[3] Reusable Streaming", ChunkParserVersion::ReusableStreaming),
    ] {
        let parser = ChunkParser::new(version);
        let meta = ChunkMeta::remote(1, "bench", ROWS, body.len() as u64);
        group.bench_function(name, |b| {
            b.iter(|| {
                let chunk = parser
                    .parse_chunk(black_box(body.as_bytes()), ResultFormat::Json, meta.clone(), &[])
                    .unwrap();
                black_box(chunk.row_count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_json_parsers);
criterion_main!(benches);
