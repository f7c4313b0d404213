use proptest::prelude::*;
use skein::bindings::{Binding, Bindings};
use skein::chain::Chain;
use skein::symbol::SymbolStore;
use skein::term::{Term, TermTable};
use std::rc::Rc;

// ========== CHAIN LAWS ==========

proptest! {
    #[test]
    fn push_preserves_existing_elements(items in prop::collection::vec(0u16..100, 0..40), extra in 0u16..100) {
        let chain: Chain<u16> = items.iter().copied().collect();
        let pushed = chain.push(extra);
        prop_assert_eq!(pushed.len(), chain.len() + 1);
        prop_assert_eq!(pushed.first(), Some(&extra));
        let mut rest: Vec<u16> = pushed.iter().copied().collect();
        rest.remove(0);
        let original: Vec<u16> = chain.iter().copied().collect();
        prop_assert_eq!(rest, original);
        // The original chain is untouched by the fork.
        prop_assert_eq!(chain.len(), items.len());
    }

    #[test]
    fn remove_drops_exactly_the_first_match(items in prop::collection::vec(0u16..10, 0..40), target in 0u16..10) {
        let chain: Chain<u16> = items.iter().copied().collect();
        let removed = chain.remove(&target);
        let before: Vec<u16> = chain.iter().copied().collect();
        let after: Vec<u16> = removed.iter().copied().collect();
        match before.iter().position(|&x| x == target) {
            Some(pos) => {
                let mut expected = before.clone();
                expected.remove(pos);
                prop_assert_eq!(after, expected);
                prop_assert_eq!(removed.len(), chain.len() - 1);
            }
            None => {
                prop_assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn remove_never_disturbs_the_original(items in prop::collection::vec(0u16..10, 0..40), target in 0u16..10) {
        let chain: Chain<u16> = items.iter().copied().collect();
        let snapshot: Vec<u16> = chain.iter().copied().collect();
        let _removed = chain.remove(&target);
        let unchanged: Vec<u16> = chain.iter().copied().collect();
        prop_assert_eq!(snapshot, unchanged);
    }
}

// ========== BINDINGS LAWS ==========

#[derive(Debug, Clone)]
struct RawBinding {
    var: usize,
    var_step: u32,
    object: usize,
    equal: bool,
}

fn raw_binding_strategy() -> impl Strategy<Value = RawBinding> {
    (0..4usize, 1..3u32, 0..3usize, any::<bool>()).prop_map(|(var, var_step, object, equal)| {
        RawBinding {
            var,
            var_step,
            object,
            equal,
        }
    })
}

fn build_world(num_vars: usize, num_objects: usize) -> (Rc<TermTable>, Vec<Term>, Vec<Term>) {
    let symbols = SymbolStore::new();
    let terms = Rc::new(TermTable::new(symbols.intern("object")));
    let objects = (0..num_objects)
        .map(|i| Term::Object(terms.add_object(symbols.intern(&format!("o{i}")), terms.root_type())))
        .collect();
    let vars = (0..num_vars)
        .map(|_| Term::Variable(terms.add_variable(terms.root_type())))
        .collect();
    (terms, vars, objects)
}

proptest! {
    #[test]
    fn batch_and_incremental_addition_agree(raw in prop::collection::vec(raw_binding_strategy(), 0..8)) {
        let (terms, vars, objects) = build_world(4, 3);
        let bindings: Vec<Binding> = raw
            .iter()
            .map(|r| {
                let Term::Variable(v) = vars[r.var] else { unreachable!() };
                Binding {
                    var: v,
                    var_step: r.var_step,
                    term: objects[r.object],
                    term_step: 0,
                    equal: r.equal,
                }
            })
            .collect();
        let empty = Bindings::new(terms);
        let batch = empty.add(&bindings);
        let mut incremental = Some(empty);
        for b in &bindings {
            incremental = incremental.and_then(|acc| acc.add(std::slice::from_ref(b)));
        }
        prop_assert_eq!(batch.is_some(), incremental.is_some());
        if let (Some(batch), Some(incremental)) = (batch, incremental) {
            for r in &raw {
                let Term::Variable(v) = vars[r.var] else { unreachable!() };
                prop_assert_eq!(
                    batch.value(v, r.var_step),
                    incremental.value(v, r.var_step)
                );
            }
        }
    }

    #[test]
    fn equal_then_unequal_is_inconsistent(var_step in 1..5u32) {
        let (terms, vars, objects) = build_world(1, 1);
        let Term::Variable(v) = vars[0] else { unreachable!() };
        let empty = Bindings::new(terms);
        let eq = Binding { var: v, var_step, term: objects[0], term_step: 0, equal: true };
        let neq = Binding { var: v, var_step, term: objects[0], term_step: 0, equal: false };
        prop_assert!(empty.add(&[eq.clone()]).is_some());
        prop_assert!(empty.add(&[eq, neq]).is_none());
    }
}
