//! Property-based tests of the onsite accumulator and the solver.

use lca_calculator::cache::OnsiteCache;
use lca_calculator::config::Settings;
use lca_calculator::database::Database;
use lca_calculator::onsite::{OnsiteResults, SubProcess};
use lca_calculator::results::solve_graph;
use lca_calculator::sample;
use lca_calculator::units::{JOULE, KILOGRAM, Quantity};
use proptest::prelude::*;

fn database() -> Database {
    Database::new(sample::dataset().unwrap(), &Settings::default()).unwrap()
}

const TARGETS: [&str; 6] = [
    "Truck Transportation Test",
    "Amount Group Test",
    "Mass Allocation Test",
    "Displacement Test",
    "Test Mix of Mixes",
    "Multimode Transportation Test",
];

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1e-12)
}

/// (subprocess, entity, value) triples: entity 0 is the gas, 1 and 2 the resources.
fn arb_entries() -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    proptest::collection::vec((0..2usize, 0..3usize, -1.0e3..1.0e3f64), 0..8)
}

fn build(db: &Database, entries: &[(usize, usize, f64)]) -> OnsiteResults {
    let gas = db.gas("g1").unwrap();
    let resources = [db.resource("r1").unwrap(), db.resource("r2").unwrap()];
    let subs = [SubProcess::new("Burner", "0101"), SubProcess::new("Heater", "0202")];
    let mut r = OnsiteResults::new();
    for &(sub, kind, value) in entries {
        let sub = subs[sub].clone();
        match kind {
            0 => r.add_emission(sub, gas, Quantity::new(value, KILOGRAM)),
            k => r
                .add_resource(sub, resources[k - 1], Quantity::new(value, JOULE), db)
                .unwrap(),
        }
    }
    r
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Solving for a + b equals solving for a and for b separately.
    #[test]
    fn prop_totals_are_additive(
        target in 0..TARGETS.len(),
        a in 0.1..100.0f64,
        b in 0.1..100.0f64,
    ) {
        let db = database();
        let cache = OnsiteCache::new();
        let t = db.target_by_name(TARGETS[target]).unwrap();
        let solve = |amount: f64| {
            solve_graph(&db, &cache, t, Quantity::new(amount, KILOGRAM)).unwrap().sum()
        };
        let (sa, sb, sab) = (solve(a), solve(b), solve(a + b));
        for (k, v) in &sab.emissions {
            let parts = sa.emissions[k].value() + sb.emissions[k].value();
            prop_assert!(close(v.value(), parts), "{}: {} vs {}", k.name, v.value(), parts);
        }
        for (k, v) in &sab.resources {
            let parts = sa.resources[k].value() + sb.resources[k].value();
            prop_assert!(close(v.value(), parts), "{}: {} vs {}", k.name, v.value(), parts);
        }
    }

    /// Scaling by a quantity and dividing by it again restores every value.
    #[test]
    fn prop_scale_then_divide_is_identity(
        factor in prop_oneof![-1.0e6..-1.0e-6f64, 1.0e-6..1.0e6f64],
        entries in arb_entries(),
    ) {
        let db = database();
        let r = build(&db, &entries);
        let q = Quantity::new(factor, JOULE);
        let mut back = r.scale_copy(q);
        back.div(q);
        for (sub, amounts) in &r.emissions {
            for (k, v) in amounts {
                prop_assert!(close(back.emissions[sub][k].value(), v.value()));
                prop_assert_eq!(back.emissions[sub][k].dimensions(), v.dimensions());
            }
        }
        for (sub, amounts) in &r.resources {
            for (k, v) in amounts {
                prop_assert!(close(back.resources[sub][k].value(), v.value()));
            }
        }
    }

    /// Flattening already flattened results changes nothing.
    #[test]
    fn prop_flatten_is_idempotent(entries in arb_entries()) {
        let db = database();
        let r = build(&db, &entries);
        let once = r.flatten_subprocess();
        let twice = once.clone().into_results().flatten_subprocess();
        prop_assert_eq!(once, twice);
    }

    /// Solving the same target twice visits the graph in the same order.
    #[test]
    fn prop_traversal_is_deterministic(target in 0..TARGETS.len(), amount in 0.1..10.0f64) {
        let db = database();
        let t = db.target_by_name(TARGETS[target]).unwrap();
        let fu = Quantity::new(amount, KILOGRAM);
        let first = solve_graph(&db, &OnsiteCache::new(), t, fu).unwrap();
        let second = solve_graph(&db, &OnsiteCache::new(), t, fu).unwrap();
        prop_assert_eq!(first.table(), second.table());
        prop_assert_eq!(first.to_string(), second.to_string());
    }
}
