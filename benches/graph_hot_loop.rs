use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::any::Any;
use std::hint::black_box;
use std::sync::Arc;

use pipeworks::config::MasterConfig;
use pipeworks::element::{ConfigArgs, Element};
use pipeworks::elements::default_registry;
use pipeworks::master::Master;
use pipeworks::packet::Packet;
use pipeworks::parse::parse_string;
use pipeworks::router::{ElementCtx, install_config};

// Sink that stops the router after swallowing `limit` packets, so one
// `master.run()` measures a complete burst through the graph.
struct StopAfter {
    limit: u64,
    count: u64,
}

impl Element for StopAfter {
    fn class_name(&self) -> &'static str {
        "StopAfter"
    }

    fn ports(&self) -> (usize, usize) {
        (1, 0)
    }

    fn configure(&mut self, args: &ConfigArgs) -> anyhow::Result<()> {
        self.limit = args.get_usize("limit", 10_000)? as u64;
        Ok(())
    }

    fn push(&mut self, _port: usize, pkt: Packet, ctx: &ElementCtx) {
        drop(pkt);
        self.count += 1;
        if self.count >= self.limit {
            ctx.router().please_stop();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn bench_push_chain(c: &mut Criterion) {
    let mut registry = default_registry();
    registry.register("StopAfter", || Box::new(StopAfter { limit: 0, count: 0 }));
    let registry = Arc::new(registry);

    let mut group = c.benchmark_group("push_chain");
    for packets in [1_000u64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(packets), &packets, |b, &n| {
            let text = format!(
                "src :: InfiniteSource(burst=32) -> c :: Counter -> stop :: StopAfter(limit={n});"
            );
            let parsed = parse_string(&text).unwrap();
            b.iter(|| {
                let master = Master::new(MasterConfig::single_thread());
                let router = install_config(&master, &registry, &parsed, false).unwrap();
                router.activate();
                master.run();
                let counter = router.find("c").unwrap();
                black_box(router.call_read(Some(counter), "count").unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_push_chain);
criterion_main!(benches);
