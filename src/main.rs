//! LCA Calculator
//!
//! Life cycle emissions and resource use of fuel pathways, mixes and vehicles.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use lca_calculator::cache::OnsiteCache;
use lca_calculator::config::Settings;
use lca_calculator::database::Database;
use lca_calculator::models::InputSource;
use lca_calculator::process::Target;
use lca_calculator::results::{Results, solve_graph};
use lca_calculator::units::Quantity;
use lca_calculator::{db, import, sample};

#[derive(Parser)]
#[command(name = "lca-calculator")]
#[command(about = "Life cycle emissions and resource use calculator for fuel pathways")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "lca_data.db")]
    database: PathBuf,

    /// Settings file (analysis year, heating value basis, solver limits)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load the built-in reference dataset
    LoadSample,

    /// Import TOML dataset files from a directory
    Import {
        /// Directory searched recursively for *.toml files
        dir: PathBuf,

        /// Clear existing data before import
        #[arg(long)]
        clear: bool,
    },

    /// List all pathways in the database
    ListPathways,

    /// List all resources in the database
    ListResources,

    /// List all stationary and transportation processes
    ListProcesses,

    /// Show inputs and outputs of a process
    Process {
        /// Process ID
        id: String,
    },

    /// Onsite results of the process producing a pathway's main output
    Onsite {
        /// Pathway, mix or vehicle name (or ID)
        pathway: String,

        /// Amount of the main output
        #[arg(short, long, default_value = "1.0")]
        amount: f64,

        /// Unit of the amount (defaults to kg, or m for vehicles)
        #[arg(short, long)]
        unit: Option<String>,
    },

    /// Solve the life cycle of a pathway, mix or vehicle
    Solve {
        /// Pathway, mix or vehicle name (or ID)
        name: String,

        /// Amount of the main output (the functional unit)
        #[arg(short, long, default_value = "1.0")]
        amount: f64,

        /// Unit of the amount (defaults to kg, or m for vehicles)
        #[arg(short, long)]
        unit: Option<String>,

        /// Print the per-process breakdown table
        #[arg(short, long)]
        table: bool,

        /// Write the breakdown table to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the onsite results of every edge
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "lca_calculator=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            db::clear_data(&conn)?;
            let counts = db::insert_dataset(&conn, &sample::dataset()?)?;
            println!("Sample data loaded: {}", counts);
        }

        Commands::Import { dir, clear } => {
            if clear {
                println!("Clearing existing data...");
                db::clear_data(&conn)?;
            }

            let stats = import::import_directory(&conn, &dir)?;
            println!("{}", stats);
        }

        Commands::ListPathways => {
            let pathways = db::list_pathways(&conn)?;
            if pathways.is_empty() {
                println!("No pathways in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<36} {:<24} {:>8}", "Pathway", "ID", "Vertices");
                println!("{}", "-".repeat(70));
                for p in pathways {
                    println!("{:<36} {:<24} {:>8}", p.name, p.id, p.vertices);
                }
            }
        }

        Commands::ListResources => {
            let resources = db::list_resources(&conn)?;
            if resources.is_empty() {
                println!("No resources in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<36} {:<16} {:<10}", "Resource", "ID", "State");
                println!("{}", "-".repeat(64));
                for r in resources {
                    println!("{:<36} {:<16} {:<10}", r.name, r.id, r.state);
                }
            }
        }

        Commands::ListProcesses => {
            let processes = db::list_processes(&conn)?;
            if processes.is_empty() {
                println!("No processes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<36} {:<24} {:<14}", "Process", "ID", "Kind");
                println!("{}", "-".repeat(76));
                for p in processes {
                    println!("{:<36} {:<24} {:<14}", p.name, p.id, p.kind);
                }
            }
        }

        Commands::Process { id } => match db::get_process_summary(&conn, &id)? {
            Some(p) => {
                println!("Process: {}", p.summary.name);
                println!("  ID: {}", p.summary.id);
                println!("  Kind: {}", p.summary.kind);
                if !p.allocation.tag().is_empty() {
                    println!("  Allocation: {}", p.allocation.tag());
                }

                if !p.inputs.is_empty() {
                    println!("  Inputs:");
                    for i in &p.inputs {
                        let source = match &i.source {
                            InputSource::Mix { mix } => format!("mix {mix}"),
                            InputSource::Pathway { pathway } => format!("pathway {pathway}"),
                            other => other.tag().to_string(),
                        };
                        let amount = i
                            .amount
                            .as_ref()
                            .map(|a| format!(" @ {} {}", a.value, a.unit))
                            .unwrap_or_default();
                        println!("    {} {} from {}{}", i.id, i.resource, source, amount);
                    }
                }

                for g in &p.groups {
                    let value = g.kind.value();
                    println!(
                        "  Group ({} {} {}): {} inputs",
                        g.kind.tag(),
                        value.value,
                        value.unit,
                        g.inputs
                    );
                }

                if !p.outputs.is_empty() {
                    println!("  Outputs:");
                    for o in &p.outputs {
                        let role = o
                            .coproduct
                            .map(|m| format!(" (coproduct, {})", m.tag()))
                            .unwrap_or_default();
                        println!(
                            "    {} {} @ {} {}{}",
                            o.id, o.resource, o.amount.value, o.amount.unit, role
                        );
                    }
                }
            }
            None => println!("Process '{}' not found", id),
        },

        Commands::Onsite {
            pathway,
            amount,
            unit,
        } => {
            let database = open_database(&conn, &settings)?;
            let target = database.target_by_name(&pathway)?;
            let (process, path, output) = target.main_process_and_output(&database)?;
            let amount = functional_unit(&database, target, &output, amount, unit.as_deref())?;

            let onsite = database
                .process(&process)?
                .compute_onsite(&path, &output, &database)?;
            println!("Onsite results of {} for {}:", process, amount);
            print!("{}", onsite.scale_copy(amount).flatten_subprocess());
        }

        Commands::Solve {
            name,
            amount,
            unit,
            table,
            csv,
            verbose,
        } => {
            let database = open_database(&conn, &settings)?;
            let target = database.target_by_name(&name)?;
            let (_, _, output) = target.main_process_and_output(&database)?;
            let amount = functional_unit(&database, target, &output, amount, unit.as_deref())?;

            let cache = OnsiteCache::new();
            let results = solve_graph(&database, &cache, target, amount)?;

            if verbose {
                println!("Per-edge onsite results:\n");
                println!("{}", results);
            }

            println!("Life cycle of {} for {}:", target.name(), amount);
            print!("{}", results.sum());

            if table {
                println!();
                for row in results.table() {
                    println!("{}", row.join("\t"));
                }
            }

            if let Some(path) = csv {
                write_csv(&results, &path)?;
                println!("Table written to {}", path.display());
            }
        }
    }

    Ok(())
}

/// Load the stored dataset into a validated snapshot
fn open_database(conn: &Connection, settings: &Settings) -> Result<Database> {
    let data = db::load_dataset(conn)?;
    Database::new(data, settings).context("Stored dataset is inconsistent")
}

/// The amount to solve for, in the units of the main output
fn functional_unit(
    database: &Database,
    target: Target<'_>,
    output: &str,
    amount: f64,
    unit: Option<&str>,
) -> Result<Quantity> {
    let unit = unit.unwrap_or(match target {
        Target::Vehicle(_) => "m",
        Target::Pathway(_) | Target::Mix(_) => "kg",
    });
    let quantity = Quantity::from_label(amount, unit)?;
    let resource = database.output_resource(output)?;
    Ok(database.to_default_units(resource, quantity)?)
}

fn write_csv(results: &Results, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in results.table() {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
