use std::{sync::Arc, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pprof::criterion::Output;
use rand::Rng;

use mangle::{Binder, Direction, Engine, Link, LinkError, OpSpec, OperandSpec};

const N_PACKETS: usize = 1_000;

/// Links that discard everything they send.
#[derive(Debug)]
struct Discard(String);

impl Link for Discard {
    fn name(&self) -> &str {
        &self.0
    }

    fn send(&self, _frame: &[u8]) -> Result<(), LinkError> {
        Ok(())
    }
}

#[derive(Debug)]
struct DiscardBinder;

impl Binder for DiscardBinder {
    fn open(&mut self, name: &str) -> Result<Arc<dyn Link>, LinkError> {
        Ok(Arc::new(Discard(name.to_string())))
    }
}

/// An engine with `n_routes` routes on eth0, of which only the last one matches UDP traffic.
fn engine(n_routes: usize) -> Engine {
    let mut engine = Engine::new(DiscardBinder);

    engine.add_field("proto", 23, 1, None).unwrap();
    engine.add_field("dport", 36, 2, None).unwrap();
    engine.add_field("mac_dst", 0, 6, None).unwrap();
    engine.add_iface("eth0").unwrap();
    engine.add_iface("eth1").unwrap();

    let mut routes = Vec::with_capacity(n_routes);
    for i in 0..n_routes {
        let name = format!("r{i}");
        let matches = if i + 1 == n_routes {
            vec![OpSpec::new(OperandSpec::packet("proto"), OperandSpec::value("proto", "17"))]
        } else {
            vec![
                OpSpec::new(OperandSpec::packet("proto"), OperandSpec::value("proto", "17")),
                OpSpec::new(OperandSpec::packet("dport"), OperandSpec::value("dport", &(i as u16).to_string())),
            ]
        };
        let writes = [
            OpSpec::new(OperandSpec::packet("mac_dst"), OperandSpec::value("mac_dst", "0a:00:27:00:00:00")),
            OpSpec::new(OperandSpec::state("dport", "last"), OperandSpec::packet("dport")),
        ];

        engine.add_rule(&name, &matches, &writes).unwrap();
        routes.push((name, "eth1".to_string()));
    }

    engine.add_process("eth0", &routes).unwrap();
    engine
}

fn packets(size: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..N_PACKETS)
        .map(|_| {
            let mut packet = vec![0u8; size];
            rng.fill(&mut packet[..]);
            packet[23] = 17;
            // Never matches the leading routes.
            packet[36..38].copy_from_slice(&u16::MAX.to_be_bytes());
            packet
        })
        .collect()
}

fn dispatch_routes(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt::try_init();

    let mut group = c.benchmark_group("dispatch_routes");
    group.throughput(Throughput::Elements(N_PACKETS as u64));

    for n_routes in [1, 8, 64] {
        let mut engine = engine(n_routes);
        let mut packets = packets(64);

        group.bench_function(BenchmarkId::from_parameter(n_routes), |b| {
            b.iter(|| {
                for packet in packets.iter_mut() {
                    let verdict = engine.on_packet("eth0", Direction::Ingress, packet);
                    debug_assert!(verdict.is_forwarded());
                }
            })
        });
    }

    group.finish();
}

fn dispatch_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_bytes");

    for size in [64, 512, 1500] {
        let mut engine = engine(4);
        let mut packets = packets(size);

        group.throughput(Throughput::Bytes((size * N_PACKETS) as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                for packet in packets.iter_mut() {
                    engine.on_packet("eth0", Direction::Ingress, packet);
                }
            })
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().warm_up_time(Duration::from_secs(1)).with_profiler(pprof::criterion::PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = dispatch_routes, dispatch_bytes
}

// Runs the per-packet hot path against in-memory engines.
criterion_main!(benches);
