//! Benchmarks for citation handling, report assembly and full runs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use insightflow::config::EngineConfig;
use insightflow::core::StageRole;
use insightflow::pipeline::{Orchestrator, WorkflowRequest};
use insightflow::stages::{citations, ReportAssembler, StagePorts};
use insightflow::testing::fixtures::{canned_text, passages};
use insightflow::testing::{ScriptedGeneration, ScriptedRetrieval, SnapshotBuilder};
use std::sync::Arc;

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

fn citation_benchmark(c: &mut Criterion) {
    let text = (0..200)
        .map(|i| format!("Claim number {i} is supported [cite:p{i}] and [cite:p{}].", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let known = passages("p", 150);

    c.bench_function("parse_citations", |b| {
        b.iter(|| citations::parse_citations(black_box(&text)));
    });
    c.bench_function("unknown_citations", |b| {
        b.iter(|| citations::unknown_citations(black_box(&text), black_box(&known)));
    });
}

fn assembly_benchmark(c: &mut Criterion) {
    let mut builder = SnapshotBuilder::new("efficient attention for long documents");
    for role in &StageRole::ALL[..4] {
        let prefix = insightflow::testing::fixtures::prefix(*role);
        builder = builder.completed(*role, passages(prefix, 10), &canned_text(*role, &ids(prefix, 10)));
    }
    let snapshot = builder.build();
    let carried = snapshot.all_passages();
    let formatter_text = canned_text(StageRole::Formatter, &ids("r", 2));

    c.bench_function("assemble_report", |b| {
        b.iter(|| {
            ReportAssembler::assemble(
                black_box(&snapshot),
                black_box(&formatter_text),
                black_box(&carried),
                false,
            )
        });
    });
}

fn workflow_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ports = StagePorts::new(
        Arc::new(ScriptedRetrieval::new()),
        Arc::new(ScriptedGeneration::new()),
    );
    let orchestrator = Orchestrator::new(EngineConfig::default(), ports).unwrap();

    c.bench_function("workflow_run_scripted", |b| {
        b.iter(|| {
            runtime
                .block_on(orchestrator.run(WorkflowRequest::new("long context retrieval")))
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    citation_benchmark,
    assembly_benchmark,
    workflow_benchmark
);
criterion_main!(benches);
