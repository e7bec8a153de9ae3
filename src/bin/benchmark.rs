//! Performance benchmarks for RbVault
//!
//! Measures store operation latency and end-to-end script throughput

use rbvault::{Coordinator, ExtractionMode, OrderedStore, Payload, ScriptJob, SchedulingConfig};
use std::fmt::Write as _;
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct BenchmarkResults {
    operation: String,
    total_operations: usize,
    duration: Duration,
    ops_per_second: f64,
    avg_latency_us: f64,
    p95_latency_us: f64,
    p99_latency_us: f64,
}

impl BenchmarkResults {
    fn new(operation: String, total_operations: usize, duration: Duration, latencies: &mut [Duration]) -> Self {
        latencies.sort();

        let ops_per_second = total_operations as f64 / duration.as_secs_f64();
        let avg_latency_us = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().map(|d| d.as_secs_f64() * 1_000_000.0).sum::<f64>() / latencies.len() as f64
        };

        let p95_index = (latencies.len() as f64 * 0.95) as usize;
        let p99_index = (latencies.len() as f64 * 0.99) as usize;

        let p95_latency_us = latencies.get(p95_index).unwrap_or(&Duration::ZERO).as_secs_f64() * 1_000_000.0;
        let p99_latency_us = latencies.get(p99_index).unwrap_or(&Duration::ZERO).as_secs_f64() * 1_000_000.0;

        Self {
            operation,
            total_operations,
            duration,
            ops_per_second,
            avg_latency_us,
            p95_latency_us,
            p99_latency_us,
        }
    }

    fn print(&self) {
        println!("=== {} Benchmark Results ===", self.operation);
        println!("Total operations: {}", self.total_operations);
        println!("Duration: {:.3}s", self.duration.as_secs_f64());
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
        println!("Average latency: {:.3}us", self.avg_latency_us);
        println!("P95 latency: {:.3}us", self.p95_latency_us);
        println!("P99 latency: {:.3}us", self.p99_latency_us);
        println!();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("RbVault Performance Benchmarks");
    println!("==============================");
    println!();

    run_store_benchmarks(100_000);
    run_pipeline_benchmarks(20_000)?;

    Ok(())
}

/// Keys spread over the i32 range without a sorted insertion order.
fn scrambled_key(i: usize) -> i32 {
    (i as u32).wrapping_mul(2_654_435_761) as i32
}

fn run_store_benchmarks(num_operations: usize) {
    println!("Running store benchmarks...");

    let mut store = OrderedStore::new();
    benchmark_upsert(&mut store, num_operations).print();
    benchmark_pop(&mut store, ExtractionMode::Max, num_operations / 2).print();
    benchmark_pop(&mut store, ExtractionMode::Min, num_operations / 2).print();

    let mut store = OrderedStore::new();
    for i in 0..num_operations {
        store.upsert(scrambled_key(i), Payload::from_token("data"));
    }
    benchmark_remove(&mut store, num_operations).print();
}

fn benchmark_upsert(store: &mut OrderedStore, num_operations: usize) -> BenchmarkResults {
    let mut latencies = Vec::with_capacity(num_operations);
    let payload = Payload::from_token("abcd");

    let start = Instant::now();
    for i in 0..num_operations {
        let op_start = Instant::now();
        store.upsert(scrambled_key(i), payload);
        latencies.push(op_start.elapsed());
    }
    let total_duration = start.elapsed();

    BenchmarkResults::new("UPSERT".to_string(), num_operations, total_duration, &mut latencies)
}

fn benchmark_pop(store: &mut OrderedStore, mode: ExtractionMode, num_operations: usize) -> BenchmarkResults {
    let mut latencies = Vec::with_capacity(num_operations);

    let start = Instant::now();
    for _ in 0..num_operations {
        let op_start = Instant::now();
        if store.pop_extreme(mode).is_err() {
            break;
        }
        latencies.push(op_start.elapsed());
    }
    let total_duration = start.elapsed();

    BenchmarkResults::new(format!("POP {:?}", mode), latencies.len(), total_duration, &mut latencies)
}

fn benchmark_remove(store: &mut OrderedStore, num_operations: usize) -> BenchmarkResults {
    let mut latencies = Vec::with_capacity(num_operations);

    let start = Instant::now();
    for i in (0..num_operations).rev() {
        let op_start = Instant::now();
        store.remove(scrambled_key(i));
        latencies.push(op_start.elapsed());
    }
    let total_duration = start.elapsed();

    BenchmarkResults::new("REMOVE".to_string(), num_operations, total_duration, &mut latencies)
}

fn generate_script(session: usize, lines: usize) -> String {
    let mut script = String::new();
    for i in 0..lines {
        let key = scrambled_key(i) % 10_000;
        // writeln! into a String cannot fail
        let _ = match i % 10 {
            0..=5 => writeln!(script, "w {} {} data", session, key),
            6..=7 => writeln!(script, "r {}", session),
            8 => writeln!(script, "w {} {}", session, key),
            _ => writeln!(script, "s {} {}", session, i % 2),
        };
    }
    script
}

fn run_pipeline_benchmarks(lines_per_script: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running script pipeline benchmarks...");

    let scripts = [generate_script(1, lines_per_script), generate_script(2, lines_per_script)];
    let coordinator = Coordinator::new(SchedulingConfig::disabled());

    let start = Instant::now();
    let report = coordinator.run([
        ScriptJob::new(scripts[0].as_bytes(), io::sink()),
        ScriptJob::new(scripts[1].as_bytes(), io::sink()),
    ])?;
    let total_duration = start.elapsed();

    let total_lines: usize = report.workers.iter().map(|w| w.lines).sum();
    let mut latencies = Vec::new();
    BenchmarkResults::new("Two-worker pipeline".to_string(), total_lines, total_duration, &mut latencies).print();
    println!("Drained at teardown: {:?}", report.drained);
    println!();

    Ok(())
}
