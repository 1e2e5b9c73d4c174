//! SQLite storage and directory import.

use std::fs;

use lca_calculator::cache::OnsiteCache;
use lca_calculator::config::Settings;
use lca_calculator::database::Database;
use lca_calculator::models::{AllocationMethod, CoproductMethod, GroupKind, InputSource};
use lca_calculator::results::solve_graph;
use lca_calculator::units::{KILOGRAM, Quantity};
use lca_calculator::{db, import, sample};
use rusqlite::Connection;

fn memory_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    conn
}

#[test]
fn test_sample_round_trip() {
    let conn = memory_db();
    let data = sample::dataset().unwrap();
    let counts = db::insert_dataset(&conn, &data).unwrap();
    assert_eq!(counts, data.counts());

    let loaded = db::load_dataset(&conn).unwrap();
    assert_eq!(loaded, data);
}

#[test]
fn test_stored_sample_solves_like_the_original() {
    let conn = memory_db();
    let data = sample::dataset().unwrap();
    db::insert_dataset(&conn, &data).unwrap();

    let settings = Settings::default();
    let original = Database::new(data, &settings).unwrap();
    let stored = Database::new(db::load_dataset(&conn).unwrap(), &settings).unwrap();
    let fu = Quantity::new(1.0, KILOGRAM);
    for name in ["Displacement Test", "Test Mix of Mixes", "Ocean Tanker Test"] {
        let a = solve_graph(&original, &OnsiteCache::new(), original.target_by_name(name).unwrap(), fu)
            .unwrap();
        let b = solve_graph(&stored, &OnsiteCache::new(), stored.target_by_name(name).unwrap(), fu)
            .unwrap();
        assert_eq!(a.sum(), b.sum(), "{name}");
    }
}

#[test]
fn test_listings_are_ordered_by_name() {
    let conn = memory_db();
    db::insert_dataset(&conn, &sample::dataset().unwrap()).unwrap();

    let pathways = db::list_pathways(&conn).unwrap();
    let names: Vec<_> = pathways.iter().map(|p| p.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    let truck = pathways
        .iter()
        .find(|p| p.id == "pw-truck")
        .unwrap();
    assert_eq!(truck.vertices, 2);
    assert_eq!(truck.main_output, "po-truck");

    let resources = db::list_resources(&conn).unwrap();
    assert_eq!(resources[0].name, "Test Resource Coproduct");
    assert_eq!(resources[1].state, "energy");

    let processes = db::list_processes(&conn).unwrap();
    assert!(processes.iter().any(|p| p.id == "tp-truck" && p.kind == "transportation"));
    assert!(processes.windows(2).all(|w| w[0].name <= w[1].name));
}

#[test]
fn test_process_summary() {
    let conn = memory_db();
    db::insert_dataset(&conn, &sample::dataset().unwrap()).unwrap();

    let p = db::get_process_summary(&conn, "p-mass-allocation").unwrap().unwrap();
    assert_eq!(p.summary.name, "Mass Allocation Process");
    assert_eq!(p.allocation, AllocationMethod::Mass);
    assert_eq!(p.inputs.len(), 1);
    assert_eq!(p.inputs[0].source, InputSource::Well);
    assert_eq!(p.outputs.len(), 2);
    assert_eq!(p.outputs[0].coproduct, None);
    assert_eq!(p.outputs[1].coproduct, Some(CoproductMethod::Allocation));

    let g = db::get_process_summary(&conn, "p-amount-group").unwrap().unwrap();
    assert_eq!(g.groups.len(), 1);
    assert!(matches!(g.groups[0].kind, GroupKind::Amount { .. }));
    assert_eq!(g.groups[0].inputs, 2);
    assert_eq!(g.inputs.len(), 2);
    assert_eq!(g.inputs[0].amount.as_ref().unwrap().value, "0.25");

    let t = db::get_process_summary(&conn, "tp-truck").unwrap().unwrap();
    assert_eq!(t.inputs[0].source, InputSource::Previous);
    assert_eq!(t.allocation, AllocationMethod::None);

    assert!(db::get_process_summary(&conn, "missing").unwrap().is_none());
}

#[test]
fn test_reinsert_replaces_records() {
    let conn = memory_db();
    let data = sample::dataset().unwrap();
    db::insert_dataset(&conn, &data).unwrap();
    db::insert_dataset(&conn, &data).unwrap();
    assert_eq!(db::load_dataset(&conn).unwrap(), data);

    db::clear_data(&conn).unwrap();
    assert_eq!(db::load_dataset(&conn).unwrap().counts().pathways, 0);
}

const GASES: &str = r#"
[[gases]]
id = "G1"
name = "CO2"
"#;

const FUEL: &str = r#"
[[resources]]
id = "R1"
name = "Diesel"
state = "liquid"
density = { value = "850", unit = "kg/m^3" }

[[stationary_processes]]
id = "P1"
name = "Diesel Supply"
outputs = [{ id = "O1", resource = "R1", amount = { value = "1", unit = "kg" } }]

[[pathways]]
id = "W1"
name = "Diesel Pathway"
main_output = "PO1"
outputs = [{ id = "PO1", resource = "R1" }]
vertices = [{ id = "V1", kind = "process", model = "P1" }]
edges = [{ from_vertex = "V1", output = "O1", to_vertex = "PO1", input = "PO1" }]
"#;

#[test]
fn test_import_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("gases.toml"), GASES).unwrap();
    fs::create_dir(dir.path().join("fuels")).unwrap();
    fs::write(dir.path().join("fuels").join("diesel.toml"), FUEL).unwrap();
    fs::write(dir.path().join("README.md"), "not a dataset").unwrap();

    let files = import::find_dataset_files(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let conn = memory_db();
    let stats = import::import_directory(&conn, dir.path()).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.counts.gases, 1);
    assert_eq!(stats.counts.processes, 1);
    assert_eq!(stats.counts.pathways, 1);
    assert!(stats.to_string().starts_with("Imported 2 files"));

    let data = db::load_dataset(&conn).unwrap();
    let database = Database::new(data, &Settings::default()).unwrap();
    let target = database.target_by_name("Diesel Pathway").unwrap();
    let results = solve_graph(&database, &OnsiteCache::new(), target, Quantity::new(2.0, KILOGRAM))
        .unwrap();
    assert_eq!(results.sum().resource("R1").unwrap().value(), 2.0);
}

#[test]
fn test_import_error_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.toml"), "[[gases]]\nid = 1\n").unwrap();

    let conn = memory_db();
    let err = import::import_directory(&conn, dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));
    assert!(db::list_resources(&conn).unwrap().is_empty());
}
