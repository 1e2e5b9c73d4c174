//! Life cycle solver
//!
//! The solver walks the process graph depth first from the target's main
//! process. Each visit scales the visited process's per-unit onsite results
//! by the amount required and records them on the edge to the requesting
//! process. Graphs may contain cycles, so a node stops recursing once the
//! total amount required from it changes by less than the configured
//! tolerance between visits.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::{debug, info, trace};

use crate::cache::{CacheKey, OnsiteCache};
use crate::config::SolverConfig;
use crate::database::Database;
use crate::error::Result;
use crate::onsite::{OnsiteResults, SubProcess, Totals};
use crate::process::{PathwayRef, ProcessRef, Target};
use crate::units::Quantity;

/// One (process, pathway, output) combination in a solved life cycle.
#[derive(Debug, Clone)]
pub struct ResultNode {
    /// Display id; nodes are matched on the triple, not on this.
    pub id: String,
    pub process: ProcessRef,
    pub pathway: PathwayRef,
    pub output: String,
    pub process_name: String,
    pub pathway_name: String,
    /// Amount of the output required by each downstream node, by node index.
    required_by: Vec<(usize, Quantity)>,
    /// Total required as of the previous visit.
    old_req_sum: Option<Quantity>,
}

impl ResultNode {
    /// Amounts required by each downstream node, by node index.
    pub fn required_by(&self) -> &[(usize, Quantity)] {
        &self.required_by
    }

    fn add_required_by(&mut self, node: usize, amount: Quantity) -> Result<()> {
        match self.required_by.iter_mut().find(|(n, _)| *n == node) {
            Some((_, q)) => q.add_assign_checked(&amount)?,
            None => self.required_by.push((node, amount)),
        }
        Ok(())
    }

    /// Total amount of the output required by all downstream nodes.
    pub fn required_sum(&self) -> Result<Option<Quantity>> {
        let mut sum: Option<Quantity> = None;
        for (_, q) in &self.required_by {
            sum = Some(match sum {
                Some(s) => s.try_add(q)?,
                None => *q,
            });
        }
        Ok(sum)
    }
}

/// Emissions and resource use of the `from` node attributable to supplying
/// the `to` node. Indices refer to [`Results::nodes`].
#[derive(Debug, Clone)]
pub struct ResultEdge {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub from_results: OnsiteResults,
}

/// The graph of a solved life cycle: one node per (process, pathway,
/// output) and one edge per supplier and consumer pair.
#[derive(Debug, Clone, Default)]
pub struct Results {
    nodes: Vec<ResultNode>,
    edges: Vec<ResultEdge>,
    node_index: HashMap<CacheKey, usize>,
    edge_index: HashMap<(usize, usize), usize>,
}

impl Results {
    /// All nodes, in the order they were first visited.
    pub fn nodes(&self) -> &[ResultNode] {
        &self.nodes
    }

    /// All edges, sorted by upstream then downstream names.
    pub fn edges(&self) -> &[ResultEdge] {
        &self.edges
    }

    /// The node for a process producing `output` in pathway `path`, if visited.
    pub fn node(
        &self,
        process: &ProcessRef,
        path: &PathwayRef,
        output: &str,
    ) -> Option<&ResultNode> {
        let key = (process.clone(), path.clone(), output.to_string());
        self.node_index.get(&key).map(|&i| &self.nodes[i])
    }

    /// The supplying end of an edge.
    pub fn upstream_node(&self, e: &ResultEdge) -> &ResultNode {
        &self.nodes[e.from]
    }

    /// The consuming end of an edge.
    pub fn downstream_node(&self, e: &ResultEdge) -> &ResultNode {
        &self.nodes[e.to]
    }

    /// Emissions and resource use of the whole life cycle.
    pub fn sum(&self) -> Totals {
        let mut all = OnsiteResults::new();
        for e in &self.edges {
            all.add(&e.from_results);
        }
        all.flatten_subprocess()
    }

    /// Everything `node` does, whichever downstream node it does it for.
    pub fn sum_for(&self, node: &ResultNode) -> OnsiteResults {
        let mut out = OnsiteResults::new();
        let same = |n: &ResultNode| {
            n.process == node.process && n.pathway == node.pathway && n.output == node.output
        };
        for e in self.edges.iter().filter(|e| same(&self.nodes[e.from])) {
            out.add(&e.from_results);
        }
        out
    }

    fn node_id(process: &ProcessRef, path: &PathwayRef, output: &str) -> String {
        format!("{}/{}/{}", process.id_str(), path.id_str(), output)
    }

    fn get_node(
        &mut self,
        process: &ProcessRef,
        path: &PathwayRef,
        output: &str,
        db: &Database,
    ) -> Result<usize> {
        let key = (process.clone(), path.clone(), output.to_string());
        if let Some(&i) = self.node_index.get(&key) {
            return Ok(i);
        }
        let node = ResultNode {
            id: Self::node_id(process, path, output),
            process: process.clone(),
            pathway: path.clone(),
            output: output.to_string(),
            process_name: db.process(process)?.name().to_string(),
            pathway_name: path.name(db),
            required_by: Vec::new(),
            old_req_sum: None,
        };
        self.nodes.push(node);
        self.node_index.insert(key, self.nodes.len() - 1);
        Ok(self.nodes.len() - 1)
    }

    fn get_edge(&mut self, from: usize, to: usize) -> usize {
        if let Some(&i) = self.edge_index.get(&(from, to)) {
            return i;
        }
        self.edges.push(ResultEdge {
            id: format!("{} -> {}", self.nodes[from].id, self.nodes[to].id),
            from,
            to,
            from_results: OnsiteResults::new(),
        });
        self.edge_index.insert((from, to), self.edges.len() - 1);
        self.edges.len() - 1
    }

    /// Orders edges by upstream pathway and process name, then downstream
    /// pathway and process name.
    fn sort_edges(&mut self) {
        let nodes = &self.nodes;
        self.edges.sort_by(|a, b| {
            let (af, at) = (&nodes[a.from], &nodes[a.to]);
            let (bf, bt) = (&nodes[b.from], &nodes[b.to]);
            af.pathway_name
                .cmp(&bf.pathway_name)
                .then_with(|| af.process_name.cmp(&bf.process_name))
                .then_with(|| at.pathway_name.cmp(&bt.pathway_name))
                .then_with(|| at.process_name.cmp(&bt.process_name))
        });
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.from, e.to), i))
            .collect();
    }

    /// Per-edge, per-subprocess breakdown as rows of text cells, preceded by
    /// a header row and a totals row.
    pub fn table(&self) -> Vec<Vec<String>> {
        let totals = self.sum();
        let mut out = Vec::with_capacity(self.edges.len() + 2);

        let mut header: Vec<String> = [
            "Pathway",
            "Process",
            "Subprocess",
            "Downstream pathway",
            "Downstream process",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for (k, v) in totals.emissions.iter().chain(&totals.resources) {
            header.push(format!("{} ({})", k.name, v.dimensions()));
        }
        header.push("SCC".to_string());
        out.push(header);

        let mut row = vec!["Totals".to_string()];
        row.extend(std::iter::repeat_n(String::new(), 4));
        for v in totals.emissions.values().chain(totals.resources.values()) {
            row.push(format_g(v.value()));
        }
        row.push("--".to_string());
        out.push(row);

        for e in &self.edges {
            let from = &self.nodes[e.from];
            let to = &self.nodes[e.to];
            let r = &e.from_results;
            let subprocesses: BTreeSet<&SubProcess> =
                r.emissions.keys().chain(r.resources.keys()).collect();
            for sp in subprocesses {
                let mut row = vec![
                    from.pathway_name.clone(),
                    from.process_name.clone(),
                    sp.name.clone(),
                    to.pathway_name.clone(),
                    to.process_name.clone(),
                ];
                for k in totals.emissions.keys() {
                    let v = r.emissions.get(sp).and_then(|m| m.get(k));
                    row.push(v.map(|v| format_g(v.value())).unwrap_or_default());
                }
                for k in totals.resources.keys() {
                    let v = r.resources.get(sp).and_then(|m| m.get(k));
                    row.push(v.map(|v| format_g(v.value())).unwrap_or_default());
                }
                row.push(sp.scc.clone());
                out.push(row);
            }
        }
        out
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.edges {
            let from = &self.nodes[e.from];
            let to = &self.nodes[e.to];
            write!(
                f,
                "-----({}, {}) --> ({}, {})-----\n{}",
                from.pathway_name, from.process_name, to.pathway_name, to.process_name, e.from_results
            )?;
        }
        Ok(())
    }
}

/// Formats a number the way C's `%g` does with the shortest exact digits:
/// exponent notation below 1e-4 and from 1e6 up.
pub fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{v:e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        format!("{v}")
    }
}

struct Solver<'a> {
    db: &'a Database,
    cache: &'a OnsiteCache,
    config: SolverConfig,
    results: Results,
}

impl Solver<'_> {
    /// Visits `proc` producing `amount` of `output` for `down_proc`.
    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        proc: &ProcessRef,
        down_proc: &ProcessRef,
        path: &PathwayRef,
        down_path: &PathwayRef,
        output: &str,
        down_output: &str,
        amount: Quantity,
        depth: usize,
    ) -> Result<()> {
        assert!(
            depth <= self.config.max_nest_depth,
            "exceeded max nest depth {} at {proc} in {path} producing {output}; \
             the process graph does not converge",
            self.config.max_nest_depth
        );
        if amount.value() == 0.0 {
            return Ok(());
        }
        trace!(depth, process = %proc, pathway = %path, output, amount = %amount, "visiting");

        let n = self.results.get_node(proc, path, output, self.db)?;
        let for_n = self.results.get_node(down_proc, down_path, down_output, self.db)?;
        let e = self.results.get_edge(n, for_n);

        let node = &mut self.results.nodes[n];
        node.add_required_by(for_n, amount)?;
        let req_sum = node.required_sum()?;
        let old = std::mem::replace(&mut node.old_req_sum, req_sum);

        let process = self.db.process(proc)?;
        let onsite = process
            .onsite_results(path, output, self.db, self.cache)?
            .scale_copy(amount);
        self.results.edges[e].from_results.add(&onsite);

        if let (Some(old), Some(new)) = (old, req_sum) {
            let change = (new.value() - old.value()).abs() / old.value().abs();
            if change < self.config.tolerance {
                debug!(process = %proc, pathway = %path, output, change, "converged");
                return Ok(());
            }
        }

        for (up_proc, up_path, up_output, up_amount) in onsite.requirements() {
            self.visit(up_proc, proc, up_path, path, up_output, output, up_amount, depth + 1)?;
        }

        if depth == 0 {
            let end = self.results.get_edge(for_n, for_n);
            let resource = self.db.output_resource(output)?;
            let r = &mut self.results.edges[end].from_results;
            r.add_resource(SubProcess::end_use(), resource, amount, self.db)?;
            r.add_requirement(proc.clone(), path.clone(), output, amount, self.db)?;
        }
        Ok(())
    }
}

/// Solves the life cycle of `amount` of the target's main output.
pub fn solve_graph(
    db: &Database,
    cache: &OnsiteCache,
    target: Target<'_>,
    amount: Quantity,
) -> Result<Results> {
    let (proc, path, output) = target.main_process_and_output(db)?;
    let resource = db.output_resource(&output)?;
    let amt = db.to_default_units(resource, amount)?;
    amt.check(db.default_dimensions(resource))?;

    let mut solver = Solver {
        db,
        cache,
        config: db.settings().solver,
        results: Results::default(),
    };
    solver.visit(&proc, &ProcessRef::EndUse, &path, &path, &output, &output, amt, 0)?;

    let mut results = solver.results;
    results.sort_edges();
    info!(
        target = target.name(),
        nodes = results.nodes.len(),
        edges = results.edges.len(),
        "solved life cycle"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::Dataset;
    use crate::units::JOULE;

    const CHAIN: &str = r#"
        [[gases]]
        id = "G1"
        name = "Test Gas"

        [[resources]]
        id = "R1"
        name = "Test Fuel"
        state = "energy"

        [[technologies]]
        id = "T1"
        name = "Burner"
        input_resource = "R1"
        scc = "0102"

        [[technologies.emissions]]
        gas = "G1"
        method = "explicit"
        value = { value = "0.5", unit = "kg/J" }

        [[stationary_processes]]
        id = "P1"
        name = "Extraction"

        [[stationary_processes.outputs]]
        id = "O1"
        resource = "R1"
        amount = { value = "1", unit = "J" }

        [[stationary_processes.inputs]]
        id = "I1"
        resource = "R1"
        source = "well"
        amount = { value = "0.1", unit = "J" }

        [[stationary_processes.inputs.technologies]]
        technology = "T1"
        share = { value = "1" }

        [[stationary_processes]]
        id = "P2"
        name = "Refining"

        [[stationary_processes.outputs]]
        id = "O2"
        resource = "R1"
        amount = { value = "1", unit = "J" }

        [[stationary_processes.inputs]]
        id = "I2"
        resource = "R1"
        source = "previous"
        amount = { value = "2", unit = "J" }

        [[pathways]]
        id = "W1"
        name = "Test Chain"
        main_output = "PO1"
        outputs = [{ id = "PO1", resource = "R1" }]
        vertices = [
            { id = "V1", kind = "process", model = "P1" },
            { id = "V2", kind = "process", model = "P2" },
        ]
        edges = [
            { from_vertex = "V1", output = "O1", to_vertex = "V2", input = "I2" },
            { from_vertex = "V2", output = "O2", to_vertex = "PO1", input = "PO1" },
        ]
    "#;

    fn chain_db() -> Database {
        let data: Dataset = toml::from_str(CHAIN).unwrap();
        Database::new(data, &Settings::default()).unwrap()
    }

    fn solve(db: &Database, amount: f64) -> Results {
        let cache = OnsiteCache::new();
        let target = db.target_by_name("Test Chain").unwrap();
        solve_graph(db, &cache, target, Quantity::new(amount, JOULE)).unwrap()
    }

    #[test]
    fn test_chain_totals() {
        let db = chain_db();
        let r = solve(&db, 1.0);
        let sum = r.sum();
        // Refining needs 2 J per J, extraction burns 0.1 J per J at 0.5 kg/J.
        let emis = sum.emission("G1").unwrap();
        assert!((emis.value() - 2.0 * 0.1 * 0.5).abs() < 1e-12);
        // P2 consumes 2 - 1 net, P1 consumes 0.1 - 1 net for each of 2 J, end use 1.
        let res = sum.resource("R1").unwrap();
        assert!((res.value() - (1.0 + 2.0 * (0.1 - 1.0) + 1.0)).abs() < 1e-12);
        assert_eq!(r.nodes().len(), 3);
        assert_eq!(r.edges().len(), 3);
    }

    #[test]
    fn test_sum_for_node() {
        let db = chain_db();
        let r = solve(&db, 1.0);
        let extraction = r
            .nodes()
            .iter()
            .find(|n| n.process_name == "Extraction")
            .unwrap();
        let totals = r.sum_for(extraction).flatten_subprocess();
        assert!((totals.emission("G1").unwrap().value() - 0.1).abs() < 1e-12);
        assert_eq!(extraction.required_sum().unwrap(), Some(Quantity::new(2.0, JOULE)));
    }

    #[test]
    fn test_nodes_are_matched_on_the_triple() {
        let db = chain_db();
        let mut r = Results::default();
        let p = ProcessRef::Stationary("P1".into());
        let a = r.get_node(&p, &PathwayRef::Pathway("23".into()), "4", &db).unwrap();
        let b = r.get_node(&p, &PathwayRef::Pathway("2".into()), "34", &db).unwrap();
        assert_ne!(a, b);
        assert_ne!(r.nodes()[a].id, r.nodes()[b].id);
        assert_eq!(r.get_node(&p, &PathwayRef::Pathway("2".into()), "34", &db).unwrap(), b);
        assert_eq!(r.node(&p, &PathwayRef::Pathway("23".into()), "4").unwrap().output, "4");
        assert!(r.node(&p, &PathwayRef::Pathway("234".into()), "").is_none());
    }

    #[test]
    fn test_zero_amount_records_nothing() {
        let db = chain_db();
        let r = solve(&db, 0.0);
        assert!(r.nodes().is_empty());
        assert!(r.edges().is_empty());
        assert_eq!(r.sum(), Totals::default());
    }

    #[test]
    fn test_edges_are_sorted_and_printed() {
        let db = chain_db();
        let r = solve(&db, 1.0);
        let names: Vec<_> = r
            .edges()
            .iter()
            .map(|e| r.upstream_node(e).process_name.as_str())
            .collect();
        assert_eq!(names, ["End use", "Extraction", "Refining"]);
        let text = r.to_string();
        assert!(text.starts_with("-----(Test Chain, End use) --> (Test Chain, End use)-----\n"));
        assert!(text.contains("-----(Test Chain, Extraction) --> (Test Chain, Refining)-----"));
    }

    #[test]
    fn test_table_layout() {
        let db = chain_db();
        let table = solve(&db, 1.0).table();
        assert_eq!(
            table[0],
            [
                "Pathway",
                "Process",
                "Subprocess",
                "Downstream pathway",
                "Downstream process",
                "Test Gas (kg)",
                "Test Fuel (kg m^2 s^-2)",
                "SCC"
            ]
        );
        assert_eq!(table[1][0], "Totals");
        assert_eq!(table[1][5], "0.1");
        assert_eq!(table[1][7], "--");
        let burner = table.iter().find(|row| row[2] == "Burner").unwrap();
        assert_eq!(burner[1], "Extraction");
        assert_eq!(burner[6], "");
        assert_eq!(burner[7], "0102");
        assert!(table.iter().all(|row| row.len() == 8));
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(5000.0), "5000");
        assert_eq!(format_g(3.6e6), "3.6e+06");
        assert_eq!(format_g(0.0011428), "0.0011428");
        assert_eq!(format_g(-2e-5), "-2e-05");
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(f64::NAN), "NaN");
    }

    #[test]
    #[should_panic(expected = "exceeded max nest depth")]
    fn test_divergent_loop_panics() {
        let mut data: Dataset = toml::from_str(CHAIN).unwrap();
        // Refining now feeds itself more than it makes.
        data.pathways[0].edges[0].from_vertex = "V2".into();
        data.pathways[0].edges[0].output = "O2".into();
        let settings = Settings {
            solver: SolverConfig {
                max_nest_depth: 50,
                ..SolverConfig::default()
            },
            ..Settings::default()
        };
        let db = Database::new(data, &settings).unwrap();
        solve(&db, 1.0);
    }
}
