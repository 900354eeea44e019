use chatfolio::core::reframe::Reframer;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

fn make_capture(events: usize, base: &str) -> Vec<u8> {
    let mut capture = String::new();
    for i in 0..events {
        let event = if i % 50 == 49 {
            json!({"choices": [{"delta": {"function_call": {"arguments": "{\"component\":\"projects\"}"}}}]})
        } else {
            json!({"choices": [{"delta": {"content": base}}]})
        };
        capture.push_str(&format!("data: {event}\n\n"));
    }
    capture.push_str("data: [DONE]\n\n");
    capture.into_bytes()
}

fn reframe_all(capture: &[u8], chunk_size: usize) -> usize {
    let mut reframer = Reframer::new();
    let mut out = Vec::new();
    for chunk in capture.chunks(chunk_size) {
        reframer.push_chunk(chunk, &mut out);
    }
    reframer.finish(&mut out);
    out.len()
}

fn bench_reframe(c: &mut Criterion) {
    let base = "lorem ipsum, dolor sit amet! consectetur adipiscing elit ";

    for &events in &[200usize, 2000usize] {
        let capture = make_capture(events, base);

        let mut group = c.benchmark_group(format!("reframe_events{}", events));
        group.throughput(Throughput::Bytes(capture.len() as u64));

        // Small chunks approximate a slow network; large ones a buffered proxy.
        for &chunk_size in &[16usize, 1024usize, 64 * 1024] {
            group.bench_function(BenchmarkId::new("chunk", chunk_size), |b| {
                b.iter(|| reframe_all(&capture, chunk_size))
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_reframe);
criterion_main!(benches);
