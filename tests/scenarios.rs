//! Reference scenarios solved against the built-in sample dataset.
//!
//! Every pathway delivers 1 kg of the liquid test resource (1e-3 J), so
//! the expected values below are the per-joule figures scaled by 1e-3.

use lca_calculator::cache::OnsiteCache;
use lca_calculator::config::Settings;
use lca_calculator::database::Database;
use lca_calculator::onsite::Totals;
use lca_calculator::results::solve_graph;
use lca_calculator::sample;
use lca_calculator::units::{JOULE, KILOGRAM, METER, Quantity};

fn database() -> Database {
    Database::new(sample::dataset().unwrap(), &Settings::default()).unwrap()
}

fn solve_amount(db: &Database, cache: &OnsiteCache, name: &str, amount: Quantity) -> Totals {
    let target = db.target_by_name(name).unwrap();
    solve_graph(db, cache, target, amount).unwrap().sum()
}

fn solve(name: &str) -> Totals {
    let db = database();
    solve_amount(&db, &OnsiteCache::new(), name, Quantity::new(1.0, KILOGRAM))
}

fn assert_close(actual: f64, expected: f64, rel: f64) {
    let scale = expected.abs().max(1e-300);
    assert!(
        (actual - expected).abs() / scale < rel,
        "expected {expected}, got {actual}"
    );
}

/// Checks the test gas emission [kg] and liquid resource use [J].
fn check(name: &str, emission: f64, resource: f64) {
    check_within(name, emission, resource, 1e-6);
}

fn check_within(name: &str, emission: f64, resource: f64, rel: f64) {
    let totals = solve(name);
    let e = totals.emission("g1").unwrap();
    let r = totals.resource("r1").unwrap();
    assert_eq!(e.dimensions(), KILOGRAM);
    assert_eq!(r.dimensions(), JOULE);
    assert_close(e.value(), emission, rel);
    assert_close(r.value(), resource, rel);
}

#[test]
fn test_truck() {
    // 1000 kg moved 10 km each way at 0.5 J/(kg m), half a kg per joule burned.
    check("Truck Transportation Test", 5000.0, 1.0e4 + 1.0e-3);
}

#[test]
fn test_ocean_tanker() {
    check("Ocean Tanker Test", 8.1e5, 1.62e6 + 1.0e-3);
}

#[test]
fn test_pipeline() {
    check("Pipeline Transportation Test", 3.6e6, 7.2e6 + 1.0e-3);
}

#[test]
fn test_rail() {
    check("Rail Transportation Test", 2.0e8, 4.0e8 + 1.0e-3);
}

#[test]
fn test_multimode() {
    // Tanker 2000 km with backhaul, pipeline 300 km, truck 284.86 km with backhaul.
    check_within("Multimode Transportation Test", 2.0324e6, 4064.86e3, 1e-4);
}

#[test]
fn test_transport_loss() {
    check("Transport Loss Test", 0.05, 1.1e-3);
}

#[test]
fn test_stand_alone_input() {
    check("Input Test", 3.0e-3, 6.0e-3);
}

#[test]
fn test_amount_group() {
    check("Amount Group Test", 1.5e-3, 3.0e-3);
}

#[test]
fn test_efficiency_group() {
    check("Test Efficiency Group", 0.5e-3 / 0.3, 1.0e-3 / 0.3);
}

#[test]
fn test_loop_converges_to_closed_form() {
    // Half of every joule feeds back: totals are the onsite values / (1 - 0.5).
    let totals = solve("Loop Test");
    assert_close(totals.emission("g1").unwrap().value(), 1.1e-2, 1e-4);
    assert_close(totals.resource("r1").unwrap().value(), 2.0e-2, 1e-4);
}

#[test]
fn test_allocation_methods() {
    check("Mass Allocation Test", 1.142857e-3, 1.142857e-3);
    check("Volume Allocation Test", 1.142857e-3, 1.142857e-3);
    check("Energy Allocation Test", 1.0e-3 / 0.9, 1.0e-3 / 0.9);
    check("Market Allocation Test", 0.142857e-3, 0.142857e-3);
}

#[test]
fn test_displacement_credits_coproduct() {
    let totals = solve("Displacement Test");
    assert_close(totals.emission("g1").unwrap().value(), -2.0e-3, 1e-6);
    assert_close(totals.resource("r1").unwrap().value(), 2.0e-3, 1e-6);
    assert_close(totals.resource("r2").unwrap().value(), -0.8e-3, 1e-6);
}

#[test]
fn test_mixes() {
    for name in [
        "Test Mix Energy",
        "Test Mix Mass",
        "Test Mix Volume",
        "Test Mix of Mixes",
    ] {
        check(name, 0.75e-3, 2.5e-3);
    }
}

#[test]
fn test_vehicle_per_meter() {
    let db = database();
    let totals = solve_amount(&db, &OnsiteCache::new(), "Test Vehicle", Quantity::new(1.0, METER));
    assert_close(totals.emission("g1").unwrap().value(), 12.0012012, 1e-6);
    assert_close(totals.resource("r1").unwrap().value(), 20.000002, 1e-6);
    let driven = totals.resource("DrivingRes").unwrap();
    assert_eq!(driven.dimensions(), METER);
    assert_eq!(driven.value(), 1.0);
}

#[test]
fn test_amount_in_energy_units() {
    let db = database();
    let totals = solve_amount(&db, &OnsiteCache::new(), "Input Test", Quantity::new(2.0e-3, JOULE));
    assert_close(totals.emission("g1").unwrap().value(), 6.0e-3, 1e-6);
}

#[test]
fn test_shared_cache_gives_same_results() {
    let db = database();
    let cache = OnsiteCache::new();
    let first = solve_amount(&db, &cache, "Test Mix of Mixes", Quantity::new(1.0, KILOGRAM));
    let cached = cache.len();
    assert!(cached > 0);

    let again = solve_amount(&db, &cache, "Test Mix of Mixes", Quantity::new(1.0, KILOGRAM));
    assert_eq!(first, again);
    assert_eq!(cache.len(), cached);

    // A different target reuses the member pathways already computed.
    solve_amount(&db, &cache, "Test Mix Energy", Quantity::new(1.0, KILOGRAM));
    assert_eq!(cache.len(), cached);
}

#[test]
fn test_concurrent_solves_share_one_database() {
    let db = database();
    let cache = OnsiteCache::new();
    let expected = solve_amount(&db, &cache, "Multimode Transportation Test", Quantity::new(1.0, KILOGRAM));
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let fresh = OnsiteCache::new();
                    solve_amount(&db, &fresh, "Multimode Transportation Test", Quantity::new(1.0, KILOGRAM))
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_unknown_target() {
    let db = database();
    assert!(db.target_by_name("No Such Pathway").is_err());
}

#[test]
fn test_amount_with_wrong_dimensions_is_rejected() {
    let db = database();
    let target = db.target_by_name("Input Test").unwrap();
    let cache = OnsiteCache::new();
    assert!(solve_graph(&db, &cache, target, Quantity::new(1.0, METER)).is_err());
}
