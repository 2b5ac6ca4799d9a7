//! Criterion benchmarks for join compilation and pushdown planning.
//!
//! Both run once per terminal operation, before any SQL reaches the
//! executor.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use relstream_core::dialect::SqliteDialect;
use relstream_core::join::{compile_join, JoinOperator, JoinStage, JoinType};
use relstream_core::pipeline::{Action, Filter, Pipeline, Sort};
use relstream_core::StreamTerminator;
use relstream_types::{
    ColumnDef, ColumnRef, Direction, OrderSpec, PredicateOp, PredicateSpec, TableDef, TableId,
    Value,
};

fn table(index: usize) -> TableDef {
    TableDef::new(
        TableId::new("bench", format!("t{index}")),
        (0..8).map(|c| ColumnDef::new(format!("c{c}"))),
    )
}

/// A chain where every stage joins the previous one on `c0`.
fn chain(stages: usize) -> Vec<JoinStage> {
    (0..stages)
        .map(|i| {
            let stage = if i == 0 {
                JoinStage::from(table(0))
            } else {
                JoinStage::join(
                    table(i),
                    JoinType::Inner,
                    JoinOperator::Equal,
                    "c0",
                    vec![ColumnRef::new(table(i - 1).id, "c0")],
                )
            };
            stage.with_predicate(PredicateSpec::new(
                "c1",
                PredicateOp::GreaterThan,
                vec![Value::from(10)],
            ))
        })
        .collect()
}

fn bench_compile_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join/compile");

    for stages in [2, 8, 26] {
        let input = chain(stages);
        group.bench_with_input(BenchmarkId::new("stages", stages), &input, |b, input| {
            b.iter(|| compile_join(input, &SqliteDialect).unwrap());
        });
    }

    group.finish();
}

fn bench_plan_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("terminator/plan");

    let mut pipeline = Pipeline::new();
    for i in 0..16 {
        pipeline
            .push(Action::Filter(Filter::Field(PredicateSpec::new(
                format!("c{i}"),
                PredicateOp::Equal,
                vec![Value::from(i)],
            ))))
            .unwrap();
    }
    pipeline
        .push(Action::Sorted(Sort::Fields(vec![OrderSpec::new("c0", Direction::Asc)])))
        .unwrap();
    pipeline.push(Action::Skip(10)).unwrap();
    pipeline.push(Action::Limit(100)).unwrap();

    group.bench_function("filters_sort_page", |b| {
        let terminator = StreamTerminator::new(&SqliteDialect, true);
        b.iter(|| terminator.plan(&pipeline));
    });

    group.finish();
}

criterion_group!(benches, bench_compile_join, bench_plan_pipeline);
criterion_main!(benches);
