//! Life cycle emissions and resource use calculator
//!
//! Fuel and vehicle pathways are graphs of processes. Each process reports
//! its own (onsite) emissions, resource use and upstream requirements per
//! unit of output; [`results::solve_graph`] walks the requirements upstream
//! and accumulates life cycle totals for a functional unit.

pub mod cache;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod expr;
pub mod import;
pub mod mix;
pub mod models;
pub mod onsite;
pub mod pathway;
pub mod process;
pub mod results;
pub mod sample;
pub mod stationary;
pub mod transport;
pub mod units;
pub mod vehicle;
