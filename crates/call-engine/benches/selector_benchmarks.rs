//! Performance benchmarks for agent selection and presence claims
//!
//! Selection runs on every routing round, so it is measured over pools of
//! realistic size for each strategy.

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use callcenter_call_engine::prelude::*;
use tokio::runtime::Runtime;

fn candidate_pool(size: usize) -> Vec<AgentPresence> {
    (0..size)
        .map(|i| {
            let mut profile = AgentProfile::default().with_satisfaction((i % 5) as f64);
            if i % 3 == 0 {
                profile = profile.with_skill("billing", 3 + (i % 3) as u8);
            }
            if i % 4 == 0 {
                profile = profile.with_skill("spanish", 4);
            }
            AgentPresence {
                agent_id: AgentId::from(format!("agent-{:04}", i)),
                status: AgentStatus::Available,
                is_available: true,
                current_call_id: None,
                current_calls: (i % 2) as u32,
                total_calls: (i * 7 % 23) as u64,
                last_assigned_at: Some(Utc::now() - Duration::seconds(i as i64)),
                connected_at: Utc::now(),
                session: SessionMeta::new(format!("ws-{}", i)).with_profile(profile),
            }
        })
        .collect()
}

/// Benchmark every strategy against growing candidate pools
fn benchmark_selection(c: &mut Criterion) {
    let selector = AgentSelector::default();
    let requirements = CallRequirements::new().with_skill("billing").with_skill("spanish").with_priority(6);
    let excluded = vec![AgentId::from("agent-0000"), AgentId::from("agent-0003")];

    let mut group = c.benchmark_group("agent_selection");
    for size in [10usize, 100, 1000] {
        let pool = candidate_pool(size);
        for strategy in [
            RoutingStrategy::RoundRobin,
            RoutingStrategy::SkillsBased,
            RoutingStrategy::Weighted,
            RoutingStrategy::Priority,
        ] {
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), size), &pool, |b, pool| {
                b.iter(|| black_box(selector.select(pool, &requirements, strategy, &excluded)));
            });
        }
    }
    group.finish();
}

/// Benchmark a claim/release cycle on the in-memory registry
fn benchmark_claim_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = Arc::new(InMemoryPresenceRegistry::new());
    let agent = AgentId::from("agent-0001");
    rt.block_on(registry.register_agent(&agent, SessionMeta::new("ws-1"))).unwrap();

    c.bench_function("claim_release_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let claimed = registry.try_claim(&agent, "bench-call").await.unwrap();
                let released = registry.release(&agent, Some("bench-call")).await.unwrap();
                black_box((claimed, released));
            })
        });
    });
}

criterion_group!(benches, benchmark_selection, benchmark_claim_release);
criterion_main!(benches);
