//! Filter throughput benchmarks: evaluate membership, range, and search
//! constraints at various selectivities on 100K rows.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tabagg::config::DashboardConfig;
use tabagg::io::parse_raw;
use tabagg::pipeline::bounds::Interval;
use tabagg::pipeline::filter::{EmptySelection, FilterState};
use tabagg::pipeline::Pipeline;

// ============================================================
// Data generation
// ============================================================

const REGIONS: &[&str] = &["North", "South", "East", "West", "Central"];

/// Generate CSV with `n_rows` rows where amount cycles 0..999.
fn generate_csv(n_rows: usize) -> String {
    let mut s = String::with_capacity(n_rows * 40);
    s.push_str("id,region,amount,note\n");
    for i in 0..n_rows {
        let amount = i % 1000;
        s.push_str(&format!("{},{},{},item {}\n", i, REGIONS[i % REGIONS.len()], amount, i * 7));
    }
    s
}

fn build_pipeline(n_rows: usize) -> Pipeline {
    let raw = parse_raw(&generate_csv(n_rows)).expect("parse");
    DashboardConfig::default().build_pipeline_from(&raw).expect("pipeline")
}

fn range_state(pipeline: &Pipeline, lo: f64, hi: f64) -> FilterState {
    let mut state = FilterState::new();
    state
        .set_range(pipeline.schema(), pipeline.bounds(), "amount", Interval::new(lo, hi))
        .expect("range");
    state
}

// ============================================================
// Benchmarks
// ============================================================

/// Range filter at ~10%, ~50%, ~90% selectivity.
fn bench_range_selectivity(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_selectivity");

    let n_rows = 100_000;
    let pipeline = build_pipeline(n_rows);
    group.throughput(Throughput::Elements(n_rows as u64));

    for (name, lo) in [("selectivity_10pct", 900.0), ("selectivity_50pct", 500.0), ("selectivity_90pct", 100.0)] {
        let state = range_state(&pipeline, lo, 999.0);
        group.bench_with_input(BenchmarkId::new(name, n_rows), &state, |b, state| {
            b.iter(|| pipeline.evaluate(state).expect("evaluate"));
        });
    }

    group.finish();
}

/// Membership, search, and all constraints combined.
fn bench_constraint_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_kinds");

    let n_rows = 100_000;
    let pipeline = build_pipeline(n_rows);
    group.throughput(Throughput::Elements(n_rows as u64));

    let mut membership = FilterState::new();
    membership.set_membership("region", ["North", "East"], EmptySelection::AllowAll);

    let mut search = FilterState::new();
    search.set_search(vec!["note".into()], "77");

    let mut combined = range_state(&pipeline, 200.0, 800.0);
    combined.set_membership("region", ["South", "West", "Central"], EmptySelection::AllowAll);
    combined.set_search(vec![], "1");

    let inclusive = pipeline.inclusive_filter();

    for (name, state) in [
        ("membership", &membership),
        ("search", &search),
        ("combined", &combined),
        ("inclusive", &inclusive),
    ] {
        group.bench_with_input(BenchmarkId::new(name, n_rows), state, |b, state| {
            b.iter(|| pipeline.evaluate(state).expect("evaluate"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_range_selectivity, bench_constraint_kinds);
criterion_main!(benches);
