//! Database schema and operations
//!
//! Pathways, mixes and process inputs/outputs are stored in their own tables
//! so they can be listed and queried. Records with deeply nested data
//! (technologies, process bodies, modes, vehicles) are kept whole as TOML
//! text next to the columns the listings need.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::expr::Param;
use crate::models::{
    AllocationMethod, CoproductMethod, Dataset, DatasetCounts, Edge, GroupKind, Input,
    InputSource, Mix, MixShare, Parameter, Pathway, PathwayOutput, ShareType, StationaryProcess,
    TransportationProcess, Vertex, VertexKind,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Named values referenced from expressions as [name]
        CREATE TABLE IF NOT EXISTS parameters (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gases (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS technologies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            input_resource TEXT NOT NULL,
            body TEXT NOT NULL
        );

        -- Stationary and transportation processes
        CREATE TABLE IF NOT EXISTS processes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            allocation TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS process_inputs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            process_id TEXT NOT NULL,
            input_id TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            source TEXT NOT NULL,
            reference TEXT,
            amount TEXT,
            unit TEXT
        );

        CREATE TABLE IF NOT EXISTS process_input_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            process_id TEXT NOT NULL,
            type TEXT NOT NULL,
            value TEXT NOT NULL,
            unit TEXT NOT NULL,
            inputs INTEGER NOT NULL
        );

        -- Outputs and coproducts; output ids are unique across the dataset
        CREATE TABLE IF NOT EXISTS process_outputs (
            output_id TEXT PRIMARY KEY,
            process_id TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            unit TEXT NOT NULL,
            coproduct_method TEXT
        );

        CREATE TABLE IF NOT EXISTS modes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mixes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            share_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            output_id TEXT NOT NULL
        );

        -- Members of a mix: kind is 'pathway' or 'mix'
        CREATE TABLE IF NOT EXISTS mix_shares (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mix_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            source TEXT NOT NULL,
            value TEXT NOT NULL,
            unit TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vehicles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pathways (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            main_output TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pathway_outputs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pathway_id TEXT NOT NULL,
            output_id TEXT NOT NULL,
            resource_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pathway_vertices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pathway_id TEXT NOT NULL,
            vertex_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            model TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pathway_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pathway_id TEXT NOT NULL,
            from_vertex TEXT NOT NULL,
            output_id TEXT NOT NULL,
            to_vertex TEXT NOT NULL,
            input_id TEXT NOT NULL
        );

        -- Create indexes for common lookups
        CREATE INDEX IF NOT EXISTS idx_process_inputs_process ON process_inputs(process_id);
        CREATE INDEX IF NOT EXISTS idx_process_groups_process ON process_input_groups(process_id);
        CREATE INDEX IF NOT EXISTS idx_process_outputs_process ON process_outputs(process_id);
        CREATE INDEX IF NOT EXISTS idx_mix_shares_mix ON mix_shares(mix_id);
        CREATE INDEX IF NOT EXISTS idx_pathway_outputs_pathway ON pathway_outputs(pathway_id);
        CREATE INDEX IF NOT EXISTS idx_pathway_vertices_pathway ON pathway_vertices(pathway_id);
        CREATE INDEX IF NOT EXISTS idx_pathway_edges_pathway ON pathway_edges(pathway_id);
        "#,
    )?;
    Ok(())
}

/// Delete every stored record
pub fn clear_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM pathway_edges;
        DELETE FROM pathway_vertices;
        DELETE FROM pathway_outputs;
        DELETE FROM pathways;
        DELETE FROM vehicles;
        DELETE FROM mix_shares;
        DELETE FROM mixes;
        DELETE FROM modes;
        DELETE FROM process_outputs;
        DELETE FROM process_input_groups;
        DELETE FROM process_inputs;
        DELETE FROM processes;
        DELETE FROM technologies;
        DELETE FROM resources;
        DELETE FROM gases;
        DELETE FROM parameters;
        "#,
    )?;
    Ok(())
}

fn to_body<T: Serialize>(record: &T) -> Result<String> {
    Ok(toml::to_string(record)?)
}

fn from_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(toml::from_str(body)?)
}

/// Insert or replace every record of `data` in one transaction.
pub fn insert_dataset(conn: &Connection, data: &Dataset) -> Result<DatasetCounts> {
    let tx = conn.unchecked_transaction()?;

    for p in &data.parameters {
        tx.execute(
            "INSERT OR REPLACE INTO parameters (name, value) VALUES (?1, ?2)",
            (&p.name, &p.value),
        )?;
    }
    for g in &data.gases {
        tx.execute(
            "INSERT OR REPLACE INTO gases (id, name, body) VALUES (?1, ?2, ?3)",
            (&g.id, &g.name, to_body(g)?),
        )?;
    }
    for r in &data.resources {
        tx.execute(
            "INSERT OR REPLACE INTO resources (id, name, state, body) VALUES (?1, ?2, ?3, ?4)",
            (&r.id, &r.name, &r.state, to_body(r)?),
        )?;
    }
    for t in &data.technologies {
        tx.execute(
            "INSERT OR REPLACE INTO technologies (id, name, input_resource, body)
             VALUES (?1, ?2, ?3, ?4)",
            (&t.id, &t.name, &t.input_resource, to_body(t)?),
        )?;
    }
    for p in &data.stationary_processes {
        insert_stationary(&tx, p)?;
    }
    for p in &data.transportation_processes {
        insert_transportation(&tx, p)?;
    }
    for m in &data.modes {
        tx.execute(
            "INSERT OR REPLACE INTO modes (id, name, kind, body) VALUES (?1, ?2, ?3, ?4)",
            (&m.id, &m.name, m.kind.tag(), to_body(m)?),
        )?;
    }
    for m in &data.mixes {
        insert_mix(&tx, m)?;
    }
    for v in &data.vehicles {
        tx.execute(
            "INSERT OR REPLACE INTO vehicles (id, name, body) VALUES (?1, ?2, ?3)",
            (&v.id, &v.name, to_body(v)?),
        )?;
    }
    for p in &data.pathways {
        insert_pathway(&tx, p)?;
    }

    tx.commit()?;
    let counts = data.counts();
    info!(%counts, "dataset stored");
    Ok(counts)
}

fn replace_process(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM process_inputs WHERE process_id = ?1", [id])?;
    conn.execute("DELETE FROM process_input_groups WHERE process_id = ?1", [id])?;
    conn.execute("DELETE FROM process_outputs WHERE process_id = ?1", [id])?;
    Ok(())
}

fn insert_input(conn: &Connection, process_id: &str, input: &Input) -> Result<()> {
    let amount = input.amount.as_ref().or(input.share.as_ref());
    conn.execute(
        "INSERT INTO process_inputs (process_id, input_id, resource_id, source, reference, amount, unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            process_id,
            &input.id,
            &input.resource,
            input.source.tag(),
            input.source.reference(),
            amount.map(|p| &p.value),
            amount.map(|p| &p.unit),
        ),
    )?;
    Ok(())
}

fn insert_output(
    conn: &Connection,
    process_id: &str,
    output_id: &str,
    resource: &str,
    amount: &Param,
    coproduct: Option<CoproductMethod>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO process_outputs (output_id, process_id, resource_id, amount, unit, coproduct_method)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            output_id,
            process_id,
            resource,
            &amount.value,
            &amount.unit,
            coproduct.map(|c| c.tag()),
        ),
    )?;
    Ok(())
}

fn insert_stationary(conn: &Connection, p: &StationaryProcess) -> Result<()> {
    let allocation = p
        .coproducts
        .as_ref()
        .map(|c| c.allocation_method)
        .unwrap_or_default();
    conn.execute(
        "INSERT OR REPLACE INTO processes (id, name, kind, allocation, body)
         VALUES (?1, ?2, 'stationary', ?3, ?4)",
        (&p.id, &p.name, allocation.tag(), to_body(p)?),
    )?;
    replace_process(conn, &p.id)?;

    for input in &p.inputs {
        insert_input(conn, &p.id, input)?;
    }
    for g in &p.input_groups {
        let value = g.kind.value();
        conn.execute(
            "INSERT INTO process_input_groups (process_id, type, value, unit, inputs)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &p.id,
                g.kind.tag(),
                &value.value,
                &value.unit,
                (g.shares.len() + g.inputs.len()) as i64,
            ),
        )?;
        for input in g.shares.iter().chain(&g.inputs) {
            insert_input(conn, &p.id, input)?;
        }
    }
    for o in &p.outputs {
        insert_output(conn, &p.id, &o.id, &o.resource, &o.amount, None)?;
    }
    for c in p.coproducts.iter().flat_map(|c| &c.items) {
        insert_output(conn, &p.id, &c.id, &c.resource, &c.amount, Some(c.method))?;
    }
    Ok(())
}

fn insert_transportation(conn: &Connection, p: &TransportationProcess) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO processes (id, name, kind, body)
         VALUES (?1, ?2, 'transportation', ?3)",
        (&p.id, &p.name, to_body(p)?),
    )?;
    replace_process(conn, &p.id)?;
    insert_input(conn, &p.id, &p.input)?;
    let o = &p.output;
    insert_output(conn, &p.id, &o.id, &o.resource, &o.amount, None)
}

fn insert_mix(conn: &Connection, m: &Mix) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO mixes (id, name, share_type, resource_id, output_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (&m.id, &m.name, m.share_type.tag(), &m.resource, &m.output_id),
    )?;
    conn.execute("DELETE FROM mix_shares WHERE mix_id = ?1", [&m.id])?;
    let members = m
        .pathways
        .iter()
        .map(|s| ("pathway", s))
        .chain(m.mixes.iter().map(|s| ("mix", s)));
    for (kind, s) in members {
        conn.execute(
            "INSERT INTO mix_shares (mix_id, kind, source, value, unit) VALUES (?1, ?2, ?3, ?4, ?5)",
            (&m.id, kind, &s.source, &s.share.value, &s.share.unit),
        )?;
    }
    Ok(())
}

fn insert_pathway(conn: &Connection, p: &Pathway) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pathways (id, name, main_output) VALUES (?1, ?2, ?3)",
        (&p.id, &p.name, &p.main_output),
    )?;
    for table in ["pathway_outputs", "pathway_vertices", "pathway_edges"] {
        conn.execute(&format!("DELETE FROM {table} WHERE pathway_id = ?1"), [&p.id])?;
    }
    for o in &p.outputs {
        conn.execute(
            "INSERT INTO pathway_outputs (pathway_id, output_id, resource_id) VALUES (?1, ?2, ?3)",
            (&p.id, &o.id, &o.resource),
        )?;
    }
    for v in &p.vertices {
        conn.execute(
            "INSERT INTO pathway_vertices (pathway_id, vertex_id, kind, model) VALUES (?1, ?2, ?3, ?4)",
            (&p.id, &v.id, v.kind.tag(), &v.model),
        )?;
    }
    for e in &p.edges {
        conn.execute(
            "INSERT INTO pathway_edges (pathway_id, from_vertex, output_id, to_vertex, input_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (&p.id, &e.from_vertex, &e.output, &e.to_vertex, &e.input),
        )?;
    }
    Ok(())
}

/// Read the bodies of a table in insertion order
fn load_bodies<T: DeserializeOwned>(conn: &Connection, sql: &str) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut results = Vec::new();
    for row in rows {
        let body = row?;
        results.push(from_body(&body).with_context(|| format!("corrupt record in query '{sql}'"))?);
    }
    Ok(results)
}

/// Read every stored record back into a [`Dataset`]
pub fn load_dataset(conn: &Connection) -> Result<Dataset> {
    let mut stmt = conn.prepare("SELECT name, value FROM parameters ORDER BY rowid")?;
    let parameters = stmt
        .query_map([], |row| {
            Ok(Parameter {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stationary_processes = Vec::new();
    let mut transportation_processes = Vec::new();
    let mut stmt = conn.prepare("SELECT kind, body FROM processes ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (kind, body) = row?;
        match kind.as_str() {
            "stationary" => stationary_processes.push(from_body(&body)?),
            "transportation" => transportation_processes.push(from_body(&body)?),
            other => anyhow::bail!("unknown process kind '{other}' in database"),
        }
    }

    let data = Dataset {
        parameters,
        gases: load_bodies(conn, "SELECT body FROM gases ORDER BY rowid")?,
        resources: load_bodies(conn, "SELECT body FROM resources ORDER BY rowid")?,
        technologies: load_bodies(conn, "SELECT body FROM technologies ORDER BY rowid")?,
        stationary_processes,
        transportation_processes,
        modes: load_bodies(conn, "SELECT body FROM modes ORDER BY rowid")?,
        mixes: load_mixes(conn)?,
        vehicles: load_bodies(conn, "SELECT body FROM vehicles ORDER BY rowid")?,
        pathways: load_pathways(conn)?,
    };
    info!(counts = %data.counts(), "dataset loaded from sqlite");
    Ok(data)
}

fn load_mixes(conn: &Connection) -> Result<Vec<Mix>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, share_type, resource_id, output_id FROM mixes ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut share_stmt = conn.prepare(
        "SELECT kind, source, value, unit FROM mix_shares WHERE mix_id = ?1 ORDER BY id",
    )?;
    let mut results = Vec::new();
    for row in rows {
        let (id, name, share_type, resource, output_id) = row?;
        let mut mix = Mix {
            share_type: ShareType::parse(&share_type)?,
            pathways: Vec::new(),
            mixes: Vec::new(),
            id,
            name,
            resource,
            output_id,
        };
        let members = share_stmt.query_map([&mix.id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                MixShare {
                    source: row.get(1)?,
                    share: Param {
                        value: row.get(2)?,
                        unit: row.get(3)?,
                    },
                },
            ))
        })?;
        for member in members {
            match member? {
                (kind, s) if kind == "pathway" => mix.pathways.push(s),
                (kind, s) if kind == "mix" => mix.mixes.push(s),
                (other, _) => anyhow::bail!("unknown share kind '{other}' in mix {}", mix.id),
            }
        }
        results.push(mix);
    }
    Ok(results)
}

fn load_pathways(conn: &Connection) -> Result<Vec<Pathway>> {
    let mut stmt = conn.prepare("SELECT id, name, main_output FROM pathways ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut output_stmt = conn.prepare(
        "SELECT output_id, resource_id FROM pathway_outputs WHERE pathway_id = ?1 ORDER BY id",
    )?;
    let mut vertex_stmt = conn.prepare(
        "SELECT vertex_id, kind, model FROM pathway_vertices WHERE pathway_id = ?1 ORDER BY id",
    )?;
    let mut edge_stmt = conn.prepare(
        "SELECT from_vertex, output_id, to_vertex, input_id FROM pathway_edges
         WHERE pathway_id = ?1 ORDER BY id",
    )?;

    let mut results = Vec::new();
    for row in rows {
        let (id, name, main_output) = row?;
        let outputs = output_stmt
            .query_map([&id], |row| {
                Ok(PathwayOutput {
                    id: row.get(0)?,
                    resource: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut vertices = Vec::new();
        let raw = vertex_stmt
            .query_map([&id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (vertex_id, kind, model) in raw {
            vertices.push(Vertex {
                id: vertex_id,
                kind: VertexKind::parse(&kind)?,
                model,
            });
        }
        let edges = edge_stmt
            .query_map([&id], |row| {
                Ok(Edge {
                    from_vertex: row.get(0)?,
                    output: row.get(1)?,
                    to_vertex: row.get(2)?,
                    input: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        results.push(Pathway {
            id,
            name,
            main_output,
            outputs,
            vertices,
            edges,
        });
    }
    Ok(results)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathwaySummary {
    pub id: String,
    pub name: String,
    pub main_output: String,
    pub vertices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    pub id: String,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub id: String,
    pub name: String,
    /// "stationary" or "transportation".
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    pub id: String,
    pub resource: String,
    pub source: InputSource,
    /// Amount, or share for inputs of a group.
    pub amount: Option<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub id: String,
    pub resource: String,
    pub amount: Param,
    /// Set for coproducts.
    pub coproduct: Option<CoproductMethod>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub kind: GroupKind,
    pub inputs: usize,
}

/// Everything `process <id>` shows about a process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDetail {
    pub summary: ProcessSummary,
    pub allocation: AllocationMethod,
    pub inputs: Vec<InputRow>,
    pub groups: Vec<GroupRow>,
    pub outputs: Vec<OutputRow>,
}

/// List all pathways in the database
pub fn list_pathways(conn: &Connection) -> Result<Vec<PathwaySummary>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.main_output,
                (SELECT COUNT(*) FROM pathway_vertices v WHERE v.pathway_id = p.id)
         FROM pathways p ORDER BY p.name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(PathwaySummary {
            id: row.get(0)?,
            name: row.get(1)?,
            main_output: row.get(2)?,
            vertices: row.get::<_, i64>(3)? as usize,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all resources in the database
pub fn list_resources(conn: &Connection) -> Result<Vec<ResourceSummary>> {
    let mut stmt = conn.prepare("SELECT id, name, state FROM resources ORDER BY name")?;

    let rows = stmt.query_map([], |row| {
        Ok(ResourceSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            state: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all stationary and transportation processes
pub fn list_processes(conn: &Connection) -> Result<Vec<ProcessSummary>> {
    let mut stmt = conn.prepare("SELECT id, name, kind FROM processes ORDER BY name")?;

    let rows = stmt.query_map([], |row| {
        Ok(ProcessSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Inputs, input groups and outputs of one process, or `None` if it doesn't exist
pub fn get_process_summary(conn: &Connection, id: &str) -> Result<Option<ProcessDetail>> {
    let found = conn
        .query_row(
            "SELECT id, name, kind, allocation FROM processes WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    ProcessSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((summary, allocation)) = found else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT input_id, resource_id, source, reference, amount, unit
         FROM process_inputs WHERE process_id = ?1 ORDER BY id",
    )?;
    let raw = stmt
        .query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut inputs = Vec::new();
    for (input_id, resource, source, reference, amount, unit) in raw {
        inputs.push(InputRow {
            id: input_id,
            resource,
            source: InputSource::from_parts(&source, reference)?,
            amount: amount.map(|value| Param {
                value,
                unit: unit.unwrap_or_default(),
            }),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT type, value, unit, inputs FROM process_input_groups
         WHERE process_id = ?1 ORDER BY id",
    )?;
    let raw = stmt
        .query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Param {
                    value: row.get(1)?,
                    unit: row.get(2)?,
                },
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut groups = Vec::new();
    for (kind, value, count) in raw {
        groups.push(GroupRow {
            kind: GroupKind::from_parts(&kind, value)?,
            inputs: count as usize,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT output_id, resource_id, amount, unit, coproduct_method
         FROM process_outputs WHERE process_id = ?1 ORDER BY rowid",
    )?;
    let raw = stmt
        .query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                Param {
                    value: row.get(2)?,
                    unit: row.get(3)?,
                },
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut outputs = Vec::new();
    for (output_id, resource, amount, method) in raw {
        outputs.push(OutputRow {
            id: output_id,
            resource,
            amount,
            coproduct: method.as_deref().map(CoproductMethod::parse).transpose()?,
        });
    }

    Ok(Some(ProcessDetail {
        summary,
        allocation: AllocationMethod::parse(&allocation)?,
        inputs,
        groups,
        outputs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gas, Resource};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = conn();
        init_schema(&conn).unwrap();
        assert!(list_pathways(&conn).unwrap().is_empty());
        assert!(get_process_summary(&conn, "P1").unwrap().is_none());
    }

    #[test]
    fn test_resources_list_by_name() {
        let conn = conn();
        let resource = |id: &str, name: &str| Resource {
            id: id.to_string(),
            name: name.to_string(),
            state: "liquid".to_string(),
            density: Some(Param::new(850, "kg/m^3")),
            hhv: None,
            lhv: None,
            market_value: None,
            c_ratio: None,
            s_ratio: None,
            compatible: Vec::new(),
            evaporation: Vec::new(),
        };
        let data = Dataset {
            gases: vec![Gas {
                id: "G1".into(),
                name: "CO2".into(),
                c_ratio: None,
                s_ratio: None,
            }],
            resources: vec![resource("2", "Gasoline"), resource("1", "Diesel")],
            ..Dataset::default()
        };
        let counts = insert_dataset(&conn, &data).unwrap();
        assert_eq!(counts.resources, 2);

        let names: Vec<_> = list_resources(&conn).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["Diesel", "Gasoline"]);

        let loaded = load_dataset(&conn).unwrap();
        assert_eq!(loaded.resources, data.resources);
        assert_eq!(loaded.gases, data.gases);

        clear_data(&conn).unwrap();
        assert!(list_resources(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_tag_in_store_is_rejected() {
        let conn = conn();
        conn.execute(
            "INSERT INTO processes (id, name, kind, allocation, body) VALUES ('P1', 'Bad', 'stationary', 'Weight', '')",
            [],
        )
        .unwrap();
        assert!(get_process_summary(&conn, "P1").is_err());
    }
}
