//! Search benchmarks using Criterion.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the plan-space search loop: goal admission,
//! link installation with threat detection, and frontier management
//! over a chain of sequentially dependent goals.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skein::action::{Action, Effect, EffectTime};
use skein::domain::{Domain, Requirements};
use skein::formula::{Atom, Formula, Literal, PredicateId};
use skein::params::Parameters;
use skein::problem::Problem;
use skein::search::plan;
use skein::symbol::SymbolStore;
use skein::term::TermTable;
use smallvec::SmallVec;
use std::rc::Rc;

/// A domain with a chain of predicates p0 .. pn where each `step-i`
/// consumes p(i-1) and produces p(i). The solution is a totally
/// ordered n-step plan.
fn chain_problem(n: usize) -> (Rc<Problem>, SymbolStore) {
    let symbols = SymbolStore::new();
    let terms = Rc::new(TermTable::new(symbols.intern("object")));
    let mut domain = Domain::new(symbols.intern("chain"), Requirements::default(), terms);
    let preds: Vec<PredicateId> = (0..=n)
        .map(|i| domain.declare_predicate(symbols.intern(&format!("p{i}")), 0))
        .collect();
    let atom = |pred: PredicateId| Atom {
        predicate: pred,
        args: SmallVec::new(),
    };
    for i in 1..=n {
        let mut action = Action::schema(symbols.intern(&format!("step-{i}")));
        action.set_condition(Rc::new(Formula::Literal(Literal::positive(atom(
            preds[i - 1],
        )))));
        action.add_effect(Effect::new(Literal::positive(atom(preds[i])), EffectTime::AtEnd));
        domain.add_action(action, &symbols).unwrap();
    }
    let mut builder = Problem::builder(symbols.intern("chain-problem"), Rc::new(domain), &symbols);
    builder.init(atom(preds[0]));
    builder.goal(Rc::new(Formula::Literal(Literal::positive(atom(preds[n])))));
    (builder.finish(&symbols), symbols)
}

fn bench_chain_lengths(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_search");
    for n in [2usize, 4, 8] {
        let (problem, _symbols) = chain_problem(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let result = plan(black_box(&problem), &Parameters::default()).unwrap();
                assert!(result.plan.is_some());
            })
        });
    }
    group.finish();
}

fn bench_initial_plan(c: &mut Criterion) {
    let (problem, _symbols) = chain_problem(8);
    c.bench_function("context_setup", |b| {
        b.iter(|| {
            let ctx = skein::search::SearchContext::new(
                black_box(problem.clone()),
                Parameters::default(),
            );
            assert!(ctx.is_ok());
        })
    });
}

criterion_group!(benches, bench_chain_lengths, bench_initial_plan);
criterion_main!(benches);
