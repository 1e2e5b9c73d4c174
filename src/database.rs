//! Validated, read-only snapshot of a dataset
//!
//! A [`Database`] owns a [`Dataset`], indexes every record by id and checks
//! all cross references up front, so lookups during a solve only fail for
//! ids that come from outside the dataset. It also evaluates parameter
//! expressions and converts resource amounts between units.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{LcaError, Result};
use crate::expr::{Evaluator, Param};
use crate::models::{
    Dataset, FactorMethod, Gas, Input, InputSource, Mix, Mode, ModeKind, Pathway, Resource,
    StationaryProcess, Supply, Technology, TransportationProcess, Vehicle, VertexKind,
};
use crate::process::{DRIVING_OUTPUT, DRIVING_RESOURCE, Process, ProcessRef, Target};
use crate::units::{
    DOLLAR, DOLLAR_PER_J, DOLLAR_PER_KG, DOLLAR_PER_M3, J_PER_KG, J_PER_M3, JOULE, KILOGRAM,
    METER, METER3, Quantity,
};

/// Gases whose carbon is subtracted before a carbon balance.
const CARBON_SPECIES: [&str; 3] = ["VOC", "CO", "CH4"];

#[derive(Debug, Clone)]
struct OutputOwner {
    resource: String,
    process: ProcessRef,
}

#[derive(Debug)]
pub struct Database {
    data: Dataset,
    settings: Settings,
    vars: BTreeMap<String, String>,
    driving: Resource,
    resources: HashMap<String, usize>,
    gases: HashMap<String, usize>,
    technologies: HashMap<String, usize>,
    modes: HashMap<String, usize>,
    stationary: HashMap<String, usize>,
    transportation: HashMap<String, usize>,
    mixes: HashMap<String, usize>,
    vehicles: HashMap<String, usize>,
    pathways: HashMap<String, usize>,
    outputs: HashMap<String, OutputOwner>,
}

fn index<T>(
    items: &[T],
    kind: &'static str,
    id: impl Fn(&T) -> &str,
) -> Result<HashMap<String, usize>> {
    let mut map = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if map.insert(id(item).to_string(), i).is_some() {
            return Err(LcaError::InvalidConfig(format!(
                "duplicate {kind} id '{}'",
                id(item)
            )));
        }
    }
    Ok(map)
}

fn driving_resource() -> Resource {
    Resource {
        id: DRIVING_RESOURCE.to_string(),
        name: "Driving".to_string(),
        state: "distance".to_string(),
        density: None,
        hhv: None,
        lhv: None,
        market_value: None,
        c_ratio: None,
        s_ratio: None,
        compatible: Vec::new(),
        evaporation: Vec::new(),
    }
}

impl Database {
    pub fn new(data: Dataset, settings: &Settings) -> Result<Database> {
        settings.validate()?;

        let mut vars = BTreeMap::new();
        for p in &data.parameters {
            if vars.insert(p.name.clone(), p.value.clone()).is_some() {
                return Err(LcaError::InvalidConfig(format!(
                    "duplicate parameter '{}'",
                    p.name
                )));
            }
        }

        let mut outputs = HashMap::new();
        let mut register = |id: &str, resource: &str, process: ProcessRef| -> Result<()> {
            let owner = OutputOwner {
                resource: resource.to_string(),
                process,
            };
            match outputs.insert(id.to_string(), owner) {
                Some(_) => Err(LcaError::InvalidConfig(format!("duplicate output id '{id}'"))),
                None => Ok(()),
            }
        };
        for p in &data.stationary_processes {
            let r = ProcessRef::Stationary(p.id.clone());
            for o in &p.outputs {
                register(&o.id, &o.resource, r.clone())?;
            }
            for c in p.coproducts.iter().flat_map(|c| &c.items) {
                register(&c.id, &c.resource, r.clone())?;
            }
        }
        for p in &data.transportation_processes {
            register(
                &p.output.id,
                &p.output.resource,
                ProcessRef::Transportation(p.id.clone()),
            )?;
        }
        for m in &data.mixes {
            register(&m.output_id, &m.resource, ProcessRef::Mix(m.id.clone()))?;
        }

        let db = Database {
            resources: index(&data.resources, "resource", |r| r.id.as_str())?,
            gases: index(&data.gases, "gas", |g| g.id.as_str())?,
            technologies: index(&data.technologies, "technology", |t| t.id.as_str())?,
            modes: index(&data.modes, "mode", |m| m.id.as_str())?,
            stationary: index(&data.stationary_processes, "stationary process", |p| {
                p.id.as_str()
            })?,
            transportation: index(&data.transportation_processes, "transportation process", |p| {
                p.id.as_str()
            })?,
            mixes: index(&data.mixes, "mix", |m| m.id.as_str())?,
            vehicles: index(&data.vehicles, "vehicle", |v| v.id.as_str())?,
            pathways: index(&data.pathways, "pathway", |p| p.id.as_str())?,
            outputs,
            vars,
            driving: driving_resource(),
            settings: settings.clone(),
            data,
        };
        db.validate()?;
        info!(counts = %db.data.counts(), "database loaded");
        Ok(db)
    }

    fn validate(&self) -> Result<()> {
        for r in &self.data.resources {
            for c in &r.compatible {
                if !self.resources.contains_key(c) {
                    warn!(resource = %r.id, compatible = %c, "ignoring unknown compatible resource");
                }
            }
            for e in &r.evaporation {
                self.gas(&e.gas)?;
            }
        }
        for t in &self.data.technologies {
            self.resource(&t.input_resource)?;
            for ef in &t.emissions {
                self.gas(&ef.gas)?;
            }
        }
        for p in &self.data.stationary_processes {
            for o in &p.outputs {
                self.resource(&o.resource)?;
            }
            let group_inputs = p
                .input_groups
                .iter()
                .flat_map(|g| g.shares.iter().chain(&g.inputs));
            for input in p.inputs.iter().chain(group_inputs) {
                self.validate_input(input)?;
            }
            for c in p.coproducts.iter().flat_map(|c| &c.items) {
                self.resource(&c.resource)?;
                for d in &c.displaced {
                    self.resource(&d.resource)?;
                    self.validate_supply(&d.supply)?;
                }
            }
            for e in &p.other_emissions {
                self.gas(&e.gas)?;
            }
        }
        for p in &self.data.transportation_processes {
            self.validate_input(&p.input)?;
            self.resource(&p.output.resource)?;
            for s in &p.steps {
                let mode = self.mode(&s.mode)?;
                if !mode.fuel_shares.iter().any(|f| f.id == s.fuel_share) {
                    return Err(LcaError::not_found(
                        "fuel share",
                        format!("{} in mode {}", s.fuel_share, mode.id),
                    ));
                }
            }
        }
        for m in &self.data.modes {
            for p in &m.payloads {
                self.resource(&p.resource)?;
            }
            if let ModeKind::Pipeline { intensities } = &m.kind {
                for r in intensities.iter().filter_map(|i| i.resource.as_deref()) {
                    self.resource(r)?;
                }
            }
            for f in m.fuel_shares.iter().flat_map(|s| &s.fuels) {
                self.resource(&f.resource)?;
                self.validate_supply(&f.supply)?;
                self.technology(&f.tech_to)?;
                self.technology(&f.tech_from)?;
            }
        }
        for m in &self.data.mixes {
            self.resource(&m.resource)?;
            for s in &m.pathways {
                self.pathway(&s.source)?;
            }
            for s in &m.mixes {
                self.mix(&s.source)?;
            }
        }
        for v in &self.data.vehicles {
            for m in &v.modes {
                self.resource(&m.fuel_resource)?;
                self.pathway(&m.fuel_pathway)?;
                for e in &m.emissions {
                    self.gas(&e.gas)?;
                }
            }
            for m in &v.materials {
                self.resource(&m.resource)?;
                self.validate_supply(&m.supply)?;
            }
            for e in &v.noncombustion {
                self.gas(&e.gas)?;
            }
        }
        for p in &self.data.pathways {
            self.validate_pathway(p)?;
        }
        Ok(())
    }

    fn validate_input(&self, input: &Input) -> Result<()> {
        self.resource(&input.resource)?;
        match &input.source {
            InputSource::Mix { mix } => {
                self.mix(mix)?;
            }
            InputSource::Pathway { pathway } => {
                self.pathway(pathway)?;
            }
            InputSource::Previous | InputSource::Well => {}
        }
        for t in &input.technologies {
            self.technology(&t.technology)?;
        }
        for e in &input.emission_ratios {
            self.gas(&e.gas)?;
        }
        Ok(())
    }

    fn validate_supply(&self, supply: &Supply) -> Result<()> {
        match supply {
            Supply::Pathway(id) => self.pathway(id).map(|_| ()),
            Supply::Mix(id) => self.mix(id).map(|_| ()),
        }
    }

    fn validate_pathway(&self, p: &Pathway) -> Result<()> {
        if !p.outputs.iter().any(|o| o.id == p.main_output) {
            return Err(LcaError::not_found(
                "pathway output",
                format!("{} in pathway {}", p.main_output, p.name),
            ));
        }
        for o in &p.outputs {
            self.resource(&o.resource)?;
        }
        for v in &p.vertices {
            match v.kind {
                VertexKind::Process => {
                    if !self.stationary.contains_key(&v.model)
                        && !self.transportation.contains_key(&v.model)
                    {
                        return Err(LcaError::not_found("process", v.model.clone()));
                    }
                }
                VertexKind::Pathway => {
                    self.pathway(&v.model)?;
                }
                VertexKind::Mix => {
                    self.mix(&v.model)?;
                }
            }
        }
        let is_vertex = |id: &str| p.vertices.iter().any(|v| v.id == id);
        for e in &p.edges {
            // Edges into a pathway output end at the output id.
            let to_output = p.outputs.iter().any(|o| o.id == e.to_vertex);
            if !is_vertex(&e.from_vertex) {
                return Err(LcaError::not_found(
                    "vertex",
                    format!("{} in pathway {}", e.from_vertex, p.name),
                ));
            }
            if !is_vertex(&e.to_vertex) && !to_output {
                return Err(LcaError::not_found(
                    "vertex",
                    format!("{} in pathway {}", e.to_vertex, p.name),
                ));
            }
        }
        Ok(())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resource(&self, id: &str) -> Result<&Resource> {
        if id == DRIVING_RESOURCE {
            return Ok(&self.driving);
        }
        self.resources
            .get(id)
            .map(|&i| &self.data.resources[i])
            .ok_or_else(|| LcaError::not_found("resource", id))
    }

    pub fn gas(&self, id: &str) -> Result<&Gas> {
        self.gases
            .get(id)
            .map(|&i| &self.data.gases[i])
            .ok_or_else(|| LcaError::not_found("gas", id))
    }

    pub fn technology(&self, id: &str) -> Result<&Technology> {
        self.technologies
            .get(id)
            .map(|&i| &self.data.technologies[i])
            .ok_or_else(|| LcaError::not_found("technology", id))
    }

    pub fn mode(&self, id: &str) -> Result<&Mode> {
        self.modes
            .get(id)
            .map(|&i| &self.data.modes[i])
            .ok_or_else(|| LcaError::not_found("mode", id))
    }

    pub fn stationary(&self, id: &str) -> Result<&StationaryProcess> {
        self.stationary
            .get(id)
            .map(|&i| &self.data.stationary_processes[i])
            .ok_or_else(|| LcaError::not_found("stationary process", id))
    }

    pub fn transportation(&self, id: &str) -> Result<&TransportationProcess> {
        self.transportation
            .get(id)
            .map(|&i| &self.data.transportation_processes[i])
            .ok_or_else(|| LcaError::not_found("transportation process", id))
    }

    pub fn mix(&self, id: &str) -> Result<&Mix> {
        self.mixes
            .get(id)
            .map(|&i| &self.data.mixes[i])
            .ok_or_else(|| LcaError::not_found("mix", id))
    }

    pub fn vehicle(&self, id: &str) -> Result<&Vehicle> {
        self.vehicles
            .get(id)
            .map(|&i| &self.data.vehicles[i])
            .ok_or_else(|| LcaError::not_found("vehicle", id))
    }

    pub fn pathway(&self, id: &str) -> Result<&Pathway> {
        self.pathways
            .get(id)
            .map(|&i| &self.data.pathways[i])
            .ok_or_else(|| LcaError::not_found("pathway", id))
    }

    /// Resolves a reference to the process record it names.
    pub fn process(&self, r: &ProcessRef) -> Result<Process<'_>> {
        Ok(match r {
            ProcessRef::Stationary(id) => Process::Stationary(self.stationary(id)?),
            ProcessRef::Transportation(id) => Process::Transportation(self.transportation(id)?),
            ProcessRef::Mix(id) => Process::Mix(self.mix(id)?),
            ProcessRef::Vehicle(id) => Process::Vehicle(self.vehicle(id)?),
            ProcessRef::EndUse => Process::EndUse,
        })
    }

    /// Process with the given id, stationary or transportation.
    pub fn process_by_id(&self, id: &str) -> Result<Process<'_>> {
        if let Ok(p) = self.stationary(id) {
            return Ok(Process::Stationary(p));
        }
        self.transportation(id)
            .map(Process::Transportation)
            .map_err(|_| LcaError::not_found("process", id))
    }

    /// The resource produced by an output or coproduct.
    pub fn output_resource(&self, output_id: &str) -> Result<&Resource> {
        if output_id == DRIVING_OUTPUT {
            return Ok(&self.driving);
        }
        let owner = self
            .outputs
            .get(output_id)
            .ok_or_else(|| LcaError::not_found("output", output_id))?;
        self.resource(&owner.resource)
    }

    /// The process that owns an output or coproduct.
    pub fn output_owner(&self, output_id: &str) -> Result<&ProcessRef> {
        self.outputs
            .get(output_id)
            .map(|o| &o.process)
            .ok_or_else(|| LcaError::not_found("output", output_id))
    }

    /// Pathway, mix or vehicle with the given name (or id).
    pub fn target_by_name(&self, name: &str) -> Result<Target<'_>> {
        if let Some(p) = self.data.pathways.iter().find(|p| p.name == name || p.id == name) {
            return Ok(Target::Pathway(p));
        }
        if let Some(m) = self.data.mixes.iter().find(|m| m.name == name || m.id == name) {
            return Ok(Target::Mix(m));
        }
        if let Some(v) = self.data.vehicles.iter().find(|v| v.name == name || v.id == name) {
            return Ok(Target::Vehicle(v));
        }
        Err(LcaError::not_found("pathway, mix or vehicle", name))
    }

    pub fn eval(&self, param: &Param) -> Result<Quantity> {
        self.eval_at(param, self.settings.year)
    }

    pub fn eval_at(&self, param: &Param, year: f64) -> Result<Quantity> {
        Evaluator::new(&self.vars, year).eval_param(param)
    }

    pub fn eval_opt(&self, param: Option<&Param>) -> Result<Option<Quantity>> {
        param.map(|p| self.eval(p)).transpose()
    }

    /// Analysis year for vehicle data.
    pub fn vehicle_year(&self) -> f64 {
        self.settings.year - self.settings.vehicle_lag
    }

    fn missing(resource: &Resource, from: impl std::fmt::Display) -> LcaError {
        LcaError::UnitConversion {
            resource: format!("{} ({})", resource.name, resource.id),
            from: from.to_string(),
        }
    }

    pub fn density(&self, r: &Resource) -> Result<Option<Quantity>> {
        self.eval_opt(r.density.as_ref())
    }

    pub fn market_value(&self, r: &Resource) -> Result<Option<Quantity>> {
        self.eval_opt(r.market_value.as_ref())
    }

    fn heating_value(&self, r: &Resource) -> Result<Option<Quantity>> {
        let hv = if self.settings.use_lhv { &r.lhv } else { &r.hhv };
        self.eval_opt(hv.as_ref())
    }

    /// Heating value per unit mass (J/kg), or `None` when the resource
    /// lacks the factors to compute it.
    pub fn heating_value_mass(&self, r: &Resource) -> Result<Option<Quantity>> {
        let Some(hv) = self.heating_value(r)? else {
            return Ok(None);
        };
        let d = hv.dimensions();
        if d == J_PER_KG {
            Ok(Some(hv))
        } else if d == J_PER_M3 {
            Ok(self.density(r)?.map(|rho| hv / rho))
        } else {
            Err(Self::missing(r, format_args!("heating value in [{d}]")))
        }
    }

    /// Heating value per unit volume (J/m^3), or `None` when the resource
    /// lacks the factors to compute it.
    pub fn heating_value_volume(&self, r: &Resource) -> Result<Option<Quantity>> {
        let Some(hv) = self.heating_value(r)? else {
            return Ok(None);
        };
        let d = hv.dimensions();
        if d == J_PER_M3 {
            Ok(Some(hv))
        } else if d == J_PER_KG {
            Ok(self.density(r)?.map(|rho| hv * rho))
        } else {
            Err(Self::missing(r, format_args!("heating value in [{d}]")))
        }
    }

    fn require(&self, r: &Resource, factor: Option<Quantity>, what: &str) -> Result<Quantity> {
        factor.ok_or_else(|| Self::missing(r, format_args!("without {what}")))
    }

    fn from_dollars(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let mv = self.market_value(r)?;
        Ok(amt / self.require(r, mv, "market value")?)
    }

    /// Converts to the resource's default units: energy for "energy" state
    /// resources, distance for distance, mass for everything else. Missing
    /// conversion factors leave the amount unchanged.
    pub fn to_default_units(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let d = amt.dimensions();
        if d == DOLLAR {
            let converted = self.from_dollars(r, amt)?;
            return self.to_default_units(r, converted);
        }
        if r.state == "energy" {
            if d == JOULE {
                Ok(amt)
            } else if d == KILOGRAM {
                Ok(self.heating_value_mass(r)?.map_or(amt, |hv| amt * hv))
            } else if d == METER3 {
                Ok(self.heating_value_volume(r)?.map_or(amt, |hv| amt * hv))
            } else {
                Err(Self::missing(r, format_args!("[{d}] to default units")))
            }
        } else if d == KILOGRAM || d == METER {
            Ok(amt)
        } else if d == METER3 {
            Ok(self.density(r)?.map_or(amt, |rho| amt * rho))
        } else if d == JOULE {
            Ok(self.heating_value_mass(r)?.map_or(amt, |hv| amt / hv))
        } else {
            Err(Self::missing(r, format_args!("[{d}] to default units")))
        }
    }

    /// Dimensions of the resource's default units.
    pub fn default_dimensions(&self, r: &Resource) -> crate::units::Dimensions {
        match r.state.as_str() {
            "energy" => JOULE,
            "distance" => METER,
            _ => KILOGRAM,
        }
    }

    pub fn to_mass(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let d = amt.dimensions();
        if d == KILOGRAM {
            Ok(amt)
        } else if d == METER3 {
            Ok(amt * self.require(r, self.density(r)?, "density")?)
        } else if d == JOULE {
            Ok(amt / self.require(r, self.heating_value_mass(r)?, "heating value")?)
        } else if d == DOLLAR {
            let converted = self.from_dollars(r, amt)?;
            self.to_mass(r, converted)
        } else {
            Err(Self::missing(r, format_args!("[{d}] to mass")))
        }
    }

    pub fn to_volume(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let d = amt.dimensions();
        if d == METER3 {
            Ok(amt)
        } else if d == KILOGRAM {
            Ok(amt / self.require(r, self.density(r)?, "density")?)
        } else if d == JOULE {
            Ok(amt / self.require(r, self.heating_value_volume(r)?, "heating value")?)
        } else if d == DOLLAR {
            let converted = self.from_dollars(r, amt)?;
            self.to_volume(r, converted)
        } else {
            Err(Self::missing(r, format_args!("[{d}] to volume")))
        }
    }

    pub fn to_energy(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let d = amt.dimensions();
        if d == JOULE {
            Ok(amt)
        } else if d == KILOGRAM {
            Ok(amt * self.require(r, self.heating_value_mass(r)?, "heating value")?)
        } else if d == METER3 {
            Ok(amt * self.require(r, self.heating_value_volume(r)?, "heating value")?)
        } else if d == DOLLAR {
            let converted = self.from_dollars(r, amt)?;
            self.to_energy(r, converted)
        } else {
            Err(Self::missing(r, format_args!("[{d}] to energy")))
        }
    }

    pub fn to_market_value(&self, r: &Resource, amt: Quantity) -> Result<Quantity> {
        let mv = self.market_value(r)?;
        let mv = self.require(r, mv, "market value")?;
        let d = mv.dimensions();
        if d == DOLLAR_PER_M3 {
            Ok(self.to_volume(r, amt)? * mv)
        } else if d == DOLLAR_PER_KG {
            Ok(self.to_mass(r, amt)? * mv)
        } else if d == DOLLAR_PER_J {
            Ok(self.to_energy(r, amt)? * mv)
        } else {
            Err(Self::missing(r, format_args!("market value in [{d}]")))
        }
    }

    fn ratio(&self, param: Option<&Param>) -> Result<Quantity> {
        Ok(self.eval_opt(param)?.unwrap_or(Quantity::dimensionless(0.0)))
    }

    /// Emission factors of a technology per unit of its input resource's
    /// energy, or per unit mass when given explicitly in kg.
    pub fn emission_factors<'a>(&'a self, tech: &'a Technology) -> Result<Vec<(&'a Gas, Quantity)>> {
        let mut factors = Vec::with_capacity(tech.emissions.len());
        for ef in &tech.emissions {
            let gas = self.gas(&ef.gas)?;
            let value = match &ef.method {
                FactorMethod::Explicit { value } => self.eval(value)?,
                FactorMethod::SulfurBalance => self.sulfur_balance(tech, gas)?,
                FactorMethod::CarbonBalance => self.carbon_balance(tech, gas)?,
            };
            factors.push((gas, value));
        }
        Ok(factors)
    }

    fn fuel_heating_value(&self, tech: &Technology) -> Result<(&Resource, Quantity)> {
        let fuel = self.resource(&tech.input_resource)?;
        let hv = self.heating_value_mass(fuel)?;
        Ok((fuel, self.require(fuel, hv, "heating value")?))
    }

    fn sulfur_balance(&self, tech: &Technology, gas: &Gas) -> Result<Quantity> {
        let (fuel, hv) = self.fuel_heating_value(tech)?;
        let gas_ratio = self.eval_opt(gas.s_ratio.as_ref())?.ok_or_else(|| {
            LcaError::InvalidConfig(format!("gas {} has no sulfur ratio", gas.name))
        })?;
        Ok(self.ratio(fuel.s_ratio.as_ref())? / hv / gas_ratio)
    }

    fn carbon_balance(&self, tech: &Technology, gas: &Gas) -> Result<Quantity> {
        let (fuel, hv) = self.fuel_heating_value(tech)?;
        let gas_ratio = self.eval_opt(gas.c_ratio.as_ref())?.ok_or_else(|| {
            LcaError::InvalidConfig(format!("gas {} has no carbon ratio", gas.name))
        })?;
        let mut carbon = self.ratio(fuel.c_ratio.as_ref())? / hv;
        for ef in &tech.emissions {
            let other = self.gas(&ef.gas)?;
            if !CARBON_SPECIES.contains(&other.name.as_str()) {
                continue;
            }
            let factor = match &ef.method {
                FactorMethod::Explicit { value } => self.eval(value)?,
                FactorMethod::SulfurBalance => self.sulfur_balance(tech, other)?,
                FactorMethod::CarbonBalance => {
                    return Err(LcaError::InvalidConfig(format!(
                        "technology {} computes {} by carbon balance",
                        tech.name, other.name
                    )));
                }
            };
            carbon -= factor * self.ratio(other.c_ratio.as_ref())?;
        }
        Ok(carbon / gas_ratio)
    }
}
