//! Per-process emissions, resource use and upstream requirements
//!
//! [`OnsiteResults`] is the unit of bookkeeping passed between processes and
//! the solver. All three maps accumulate additively. Ordered maps keep
//! iteration, printing and tables deterministic.

use std::collections::BTreeMap;
use std::fmt;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Gas, Resource};
use crate::process::{PathwayRef, ProcessRef};
use crate::units::{KILOGRAM, Quantity};

/// SCC code used for aggregate and end-use rows.
pub const SCC_NONE: &str = "0000000000";
/// SCC code for non-combustion emissions and transport losses.
pub const SCC_NON_COMBUSTION: &str = "0028888801";

/// Part of a process an emission or resource use is attributed to,
/// named together with its source classification code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubProcess {
    pub name: String,
    pub scc: String,
}

impl SubProcess {
    pub fn new(name: impl Into<String>, scc: impl Into<String>) -> Self {
        SubProcess {
            name: name.into(),
            scc: scc.into(),
        }
    }

    /// The process as a whole.
    pub fn none() -> Self {
        SubProcess::new("--", "--")
    }

    pub fn total() -> Self {
        SubProcess::new("Total", SCC_NONE)
    }

    pub fn end_use() -> Self {
        SubProcess::new("End use", SCC_NONE)
    }

    pub fn non_combustion() -> Self {
        SubProcess::new("Non-combustion", SCC_NON_COMBUSTION)
    }

    pub fn losses(scc: impl Into<String>) -> Self {
        SubProcess::new("Losses", scc)
    }
}

impl fmt::Display for SubProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.scc)
    }
}

/// Gas or resource key. Ordered by name first, so tables and listings come
/// out alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub name: String,
    pub id: String,
}

impl From<&Gas> for EntityKey {
    fn from(g: &Gas) -> Self {
        EntityKey {
            name: g.name.clone(),
            id: g.id.clone(),
        }
    }
}

impl From<&Resource> for EntityKey {
    fn from(r: &Resource) -> Self {
        EntityKey {
            name: r.name.clone(),
            id: r.id.clone(),
        }
    }
}

pub type Amounts = BTreeMap<EntityKey, Quantity>;
pub type Requirements = BTreeMap<ProcessRef, BTreeMap<PathwayRef, BTreeMap<String, Quantity>>>;

fn add_into(map: &mut Amounts, key: EntityKey, q: Quantity) {
    map.entry(key)
        .and_modify(|v| *v += q)
        .or_insert(q);
}

fn merge_amounts(into: &mut Amounts, from: &Amounts) {
    for (k, v) in from {
        add_into(into, k.clone(), *v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnsiteResults {
    pub emissions: BTreeMap<SubProcess, Amounts>,
    pub resources: BTreeMap<SubProcess, Amounts>,
    pub requirements: Requirements,
}

impl OnsiteResults {
    pub fn new() -> Self {
        OnsiteResults::default()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty() && self.resources.is_empty() && self.requirements.is_empty()
    }

    /// Adds an emission. Panics unless `amount` is a mass.
    pub fn add_emission(&mut self, sub: SubProcess, gas: &Gas, amount: Quantity) {
        assert!(
            amount.dimensions() == KILOGRAM,
            "emission of {} ({}) must be a mass but has dimensions [{}]",
            gas.name,
            gas.id,
            amount.dimensions()
        );
        add_into(self.emissions.entry(sub).or_default(), gas.into(), amount);
    }

    /// Adds resource use, stored in the resource's default units.
    pub fn add_resource(
        &mut self,
        sub: SubProcess,
        resource: &Resource,
        amount: Quantity,
        db: &Database,
    ) -> Result<()> {
        let amount = db.to_default_units(resource, amount)?;
        add_into(self.resources.entry(sub).or_default(), resource.into(), amount);
        Ok(())
    }

    pub fn sub_resource(
        &mut self,
        sub: SubProcess,
        resource: &Resource,
        amount: Quantity,
        db: &Database,
    ) -> Result<()> {
        self.add_resource(sub, resource, -amount, db)
    }

    /// Records that `amount` of `output` is needed from `process` running in
    /// `path`. Zero amounts are dropped. Panics on NaN or infinite amounts.
    pub fn add_requirement(
        &mut self,
        process: ProcessRef,
        path: PathwayRef,
        output: &str,
        amount: Quantity,
        db: &Database,
    ) -> Result<()> {
        assert!(
            amount.is_finite(),
            "requirement of {amount} for output {output} of {process} in {path} is not finite"
        );
        if amount.value() == 0.0 {
            return Ok(());
        }
        let resource = db.output_resource(output)?;
        let amount = db.to_default_units(resource, amount)?;
        self.requirements
            .entry(process)
            .or_default()
            .entry(path)
            .or_default()
            .entry(output.to_string())
            .and_modify(|v| *v += amount)
            .or_insert(amount);
        Ok(())
    }

    /// Iterates over requirements as (process, pathway, output, amount).
    pub fn requirements(&self) -> impl Iterator<Item = (&ProcessRef, &PathwayRef, &str, Quantity)> {
        self.requirements.iter().flat_map(|(proc, paths)| {
            paths.iter().flat_map(move |(path, outputs)| {
                outputs
                    .iter()
                    .map(move |(output, amt)| (proc, path, output.as_str(), *amt))
            })
        })
    }

    /// Merges `other` into this result.
    pub fn add(&mut self, other: &OnsiteResults) {
        for (sub, gases) in &other.emissions {
            merge_amounts(self.emissions.entry(sub.clone()).or_default(), gases);
        }
        for (sub, resources) in &other.resources {
            merge_amounts(self.resources.entry(sub.clone()).or_default(), resources);
        }
        for (proc, paths) in &other.requirements {
            let paths_into = self.requirements.entry(proc.clone()).or_default();
            for (path, outputs) in paths {
                let outputs_into = paths_into.entry(path.clone()).or_default();
                for (output, amt) in outputs {
                    outputs_into
                        .entry(output.clone())
                        .and_modify(|v| *v += *amt)
                        .or_insert(*amt);
                }
            }
        }
    }

    fn apply(&mut self, f: impl Fn(Quantity) -> Quantity) {
        let values = self
            .emissions
            .values_mut()
            .chain(self.resources.values_mut())
            .flat_map(|m| m.values_mut());
        for v in values {
            *v = f(*v);
        }
        for v in self
            .requirements
            .values_mut()
            .flat_map(|p| p.values_mut())
            .flat_map(|o| o.values_mut())
        {
            *v = f(*v);
        }
    }

    pub fn scale_copy(&self, factor: Quantity) -> OnsiteResults {
        let mut out = self.clone();
        out.mul(factor);
        out
    }

    pub fn mul(&mut self, factor: Quantity) {
        self.apply(|v| v * factor);
    }

    pub fn div(&mut self, factor: Quantity) {
        self.apply(|v| v / factor);
    }

    /// Emissions and resource use summed over subprocesses.
    pub fn flatten_subprocess(&self) -> Totals {
        let mut totals = Totals::default();
        for gases in self.emissions.values() {
            merge_amounts(&mut totals.emissions, gases);
        }
        for resources in self.resources.values() {
            merge_amounts(&mut totals.resources, resources);
        }
        totals
    }
}

fn write_amounts(f: &mut fmt::Formatter<'_>, indent: &str, amounts: &Amounts) -> fmt::Result {
    for (k, v) in amounts {
        writeln!(f, "{indent}{}: {v}", k.name)?;
    }
    Ok(())
}

impl fmt::Display for OnsiteResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "Nothing happens");
        }
        if !self.emissions.is_empty() {
            writeln!(f, "Emissions:")?;
            for (sub, gases) in &self.emissions {
                writeln!(f, "  {sub}:")?;
                write_amounts(f, "    ", gases)?;
            }
        }
        if !self.resources.is_empty() {
            writeln!(f, "Resources:")?;
            for (sub, resources) in &self.resources {
                writeln!(f, "  {sub}:")?;
                write_amounts(f, "    ", resources)?;
            }
        }
        if !self.requirements.is_empty() {
            writeln!(f, "Requirements:")?;
            for (proc, path, output, amt) in self.requirements() {
                writeln!(f, "  {proc} {path} {output}: {amt}")?;
            }
        }
        Ok(())
    }
}

/// Emissions and resource use without the subprocess breakdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub emissions: Amounts,
    pub resources: Amounts,
}

impl Totals {
    pub fn emission(&self, gas_id: &str) -> Option<Quantity> {
        self.emissions
            .iter()
            .find(|(k, _)| k.id == gas_id)
            .map(|(_, v)| *v)
    }

    pub fn resource(&self, resource_id: &str) -> Option<Quantity> {
        self.resources
            .iter()
            .find(|(k, _)| k.id == resource_id)
            .map(|(_, v)| *v)
    }

    /// The totals as results under a single "Total" subprocess.
    pub fn into_results(self) -> OnsiteResults {
        let mut r = OnsiteResults::new();
        if !self.emissions.is_empty() {
            r.emissions.insert(SubProcess::total(), self.emissions);
        }
        if !self.resources.is_empty() {
            r.resources.insert(SubProcess::total(), self.resources);
        }
        r
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.emissions.is_empty() && self.resources.is_empty() {
            return writeln!(f, "Nothing happens");
        }
        writeln!(f, "Emissions:")?;
        write_amounts(f, "  ", &self.emissions)?;
        writeln!(f, "Resources:")?;
        write_amounts(f, "  ", &self.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::Dataset;
    use crate::units::{JOULE, METER3};

    fn db() -> Database {
        let data: Dataset = toml::from_str(
            r#"
            [[gases]]
            id = "G1"
            name = "CO2"

            [[resources]]
            id = "R1"
            name = "Crude"
            state = "liquid"
            density = { value = "800", unit = "kg/m^3" }

            [[stationary_processes]]
            id = "P1"
            name = "Extraction"

            [[stationary_processes.outputs]]
            id = "O1"
            resource = "R1"
            amount = { value = "1", unit = "kg" }
            "#,
        )
        .unwrap();
        Database::new(data, &Settings::default()).unwrap()
    }

    fn sample(db: &Database, scale: f64) -> OnsiteResults {
        let gas = db.gas("G1").unwrap();
        let crude = db.resource("R1").unwrap();
        let mut r = OnsiteResults::new();
        r.add_emission(SubProcess::none(), gas, Quantity::new(2.0 * scale, KILOGRAM));
        r.add_emission(SubProcess::non_combustion(), gas, Quantity::new(scale, KILOGRAM));
        r.add_resource(SubProcess::none(), crude, Quantity::new(scale, METER3), db)
            .unwrap();
        r.add_requirement(
            ProcessRef::Stationary("P1".into()),
            PathwayRef::Pathway("W".into()),
            "O1",
            Quantity::new(3.0 * scale, KILOGRAM),
            db,
        )
        .unwrap();
        r
    }

    #[test]
    fn test_resources_are_stored_in_default_units() {
        let db = db();
        let r = sample(&db, 1.0);
        let crude = &r.resources[&SubProcess::none()];
        let v = crude.values().next().unwrap();
        assert_eq!(*v, Quantity::new(800.0, KILOGRAM));
    }

    #[test]
    fn test_add_accumulates_congruent_keys() {
        let db = db();
        let mut a = sample(&db, 1.0);
        a.add(&sample(&db, 2.0));
        assert_eq!(a, sample(&db, 3.0));
    }

    #[test]
    fn test_scale_then_divide_restores_values() {
        let db = db();
        let r = sample(&db, 1.0);
        let k = Quantity::new(4.0, JOULE);
        let mut scaled = r.scale_copy(k);
        let (_, _, _, amt) = scaled.requirements().next().unwrap();
        assert_eq!(amt.value(), 12.0);
        scaled.div(k);
        assert_eq!(scaled, r);
    }

    #[test]
    fn test_flatten_merges_subprocesses() {
        let db = db();
        let totals = sample(&db, 1.0).flatten_subprocess();
        assert_eq!(totals.emission("G1"), Some(Quantity::new(3.0, KILOGRAM)));
        assert_eq!(totals.clone().into_results().flatten_subprocess(), totals);
    }

    #[test]
    fn test_zero_requirements_are_dropped() {
        let db = db();
        let mut r = OnsiteResults::new();
        r.add_requirement(
            ProcessRef::Stationary("P1".into()),
            PathwayRef::Mix,
            "O1",
            Quantity::new(0.0, KILOGRAM),
            &db,
        )
        .unwrap();
        assert!(r.is_empty());
        assert_eq!(r.to_string(), "Nothing happens\n");
    }

    #[test]
    #[should_panic(expected = "is not finite")]
    fn test_nan_requirement_panics() {
        let db = db();
        let mut r = OnsiteResults::new();
        let _ = r.add_requirement(
            ProcessRef::Stationary("P1".into()),
            PathwayRef::Mix,
            "O1",
            Quantity::new(f64::NAN, KILOGRAM),
            &db,
        );
    }

    #[test]
    #[should_panic(expected = "must be a mass")]
    fn test_non_mass_emission_panics() {
        let db = db();
        let gas = db.gas("G1").unwrap();
        OnsiteResults::new().add_emission(SubProcess::none(), gas, Quantity::new(1.0, JOULE));
    }

    #[test]
    fn test_display_sections() {
        let db = db();
        let text = sample(&db, 1.0).to_string();
        assert!(text.starts_with("Emissions:\n"));
        assert!(text.contains("Non-combustion (0028888801):"));
        assert!(text.contains("Resources:"));
        assert!(text.contains("StationaryP1 PathwayW O1: 3 kg"));
    }
}
