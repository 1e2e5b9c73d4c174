//! Data models for the process database
//!
//! Records are plain data. They deserialize from TOML dataset files and are
//! stored in SQLite by [`crate::db`]. All cross references are by string id
//! and are checked when a [`crate::database::Database`] is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LcaError, Result};
use crate::expr::Param;

fn yes() -> bool {
    true
}

/// A named expression that other values can reference as `[name]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// An emitted pollutant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gas {
    pub id: String,
    pub name: String,
    pub c_ratio: Option<Param>,
    pub s_ratio: Option<Param>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaporationShare {
    pub gas: String,
    pub share: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    /// "energy", "liquid", "gas", "solid", "distance"...
    pub state: String,
    pub density: Option<Param>,
    pub hhv: Option<Param>,
    pub lhv: Option<Param>,
    pub market_value: Option<Param>,
    pub c_ratio: Option<Param>,
    pub s_ratio: Option<Param>,
    #[serde(default)]
    pub compatible: Vec<String>,
    #[serde(default)]
    pub evaporation: Vec<EvaporationShare>,
}

impl Resource {
    /// Two resources are compatible when they share an id, when either name
    /// contains the other, or when either lists the other as compatible.
    pub fn is_compatible(&self, other: &Resource) -> bool {
        self.id == other.id
            || self.name.contains(&other.name)
            || other.name.contains(&self.name)
            || self.compatible.iter().any(|c| *c == other.id)
            || other.compatible.iter().any(|c| *c == self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FactorMethod {
    Explicit { value: Param },
    CarbonBalance,
    SulfurBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    pub gas: String,
    #[serde(flatten)]
    pub method: FactorMethod,
}

/// A combustion or processing technology with per-energy emission factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub id: String,
    pub name: String,
    pub input_resource: String,
    #[serde(default)]
    pub scc: String,
    #[serde(default)]
    pub emissions: Vec<EmissionFactor>,
}

/// A process output. Output ids are unique across the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub id: String,
    pub resource: String,
    pub amount: Param,
    pub loss: Option<Param>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum InputSource {
    /// The upstream vertex of the requesting pathway.
    Previous,
    Mix { mix: String },
    Well,
    Pathway { pathway: String },
}

impl InputSource {
    pub fn tag(&self) -> &'static str {
        match self {
            InputSource::Previous => "previous",
            InputSource::Mix { .. } => "mix",
            InputSource::Well => "well",
            InputSource::Pathway { .. } => "pathway",
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            InputSource::Mix { mix } => Some(mix),
            InputSource::Pathway { pathway } => Some(pathway),
            InputSource::Previous | InputSource::Well => None,
        }
    }

    pub fn from_parts(tag: &str, reference: Option<String>) -> Result<Self> {
        let missing = || LcaError::InvalidConfig(format!("input source '{tag}' needs a reference"));
        match tag {
            "previous" => Ok(InputSource::Previous),
            "well" => Ok(InputSource::Well),
            "mix" => Ok(InputSource::Mix {
                mix: reference.ok_or_else(missing)?,
            }),
            "pathway" => Ok(InputSource::Pathway {
                pathway: reference.ok_or_else(missing)?,
            }),
            other => Err(LcaError::InvalidConfig(format!("unknown input source '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyShare {
    pub technology: String,
    pub share: Param,
}

/// Fraction of the input mass emitted as a gas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRatio {
    pub gas: String,
    pub rate: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub id: String,
    pub resource: String,
    #[serde(flatten)]
    pub source: InputSource,
    /// Amount for stand-alone inputs and explicit group inputs.
    pub amount: Option<Param>,
    /// Share for inputs listed under a group's shares.
    pub share: Option<Param>,
    /// When false only emissions are counted for this input.
    #[serde(default = "yes")]
    pub accounted: bool,
    #[serde(default)]
    pub technologies: Vec<TechnologyShare>,
    #[serde(default)]
    pub emission_ratios: Vec<EmissionRatio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupKind {
    Efficiency { efficiency: Param },
    Amount { amount: Param },
}

impl GroupKind {
    pub fn tag(&self) -> &'static str {
        match self {
            GroupKind::Efficiency { .. } => "efficiency",
            GroupKind::Amount { .. } => "amount",
        }
    }

    pub fn value(&self) -> &Param {
        match self {
            GroupKind::Efficiency { efficiency } => efficiency,
            GroupKind::Amount { amount } => amount,
        }
    }

    pub fn from_parts(tag: &str, value: Param) -> Result<Self> {
        match tag {
            "efficiency" => Ok(GroupKind::Efficiency { efficiency: value }),
            "amount" => Ok(GroupKind::Amount { amount: value }),
            other => Err(LcaError::InvalidConfig(format!("unknown input group type '{other}'"))),
        }
    }
}

/// Inputs sharing a common efficiency or adding up to a single amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputGroup {
    #[serde(flatten)]
    pub kind: GroupKind,
    #[serde(default)]
    pub shares: Vec<Input>,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationMethod {
    Mass,
    Energy,
    Market,
    Volume,
    /// Everything goes to the main output.
    #[default]
    None,
}

impl AllocationMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            AllocationMethod::Mass => "Mass",
            AllocationMethod::Energy => "Energy",
            AllocationMethod::Market => "Market",
            AllocationMethod::Volume => "Volume",
            AllocationMethod::None => "",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "Mass" => Ok(AllocationMethod::Mass),
            "Energy" => Ok(AllocationMethod::Energy),
            "Market" => Ok(AllocationMethod::Market),
            "Volume" => Ok(AllocationMethod::Volume),
            "" | "None" => Ok(AllocationMethod::None),
            other => Err(LcaError::InvalidConfig(format!("unknown allocation method '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoproductMethod {
    Allocation,
    Displacement,
}

impl CoproductMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            CoproductMethod::Allocation => "allocation",
            CoproductMethod::Displacement => "displacement",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "allocation" => Ok(CoproductMethod::Allocation),
            "displacement" => Ok(CoproductMethod::Displacement),
            other => Err(LcaError::InvalidConfig(format!("unknown coproduct method '{other}'"))),
        }
    }
}

/// Where a displaced product, transport fuel or vehicle material comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Supply {
    Pathway(String),
    Mix(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacedProduct {
    pub resource: String,
    pub supply: Supply,
    pub ratio: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coproduct {
    pub id: String,
    pub resource: String,
    pub amount: Param,
    pub method: CoproductMethod,
    #[serde(default)]
    pub displaced: Vec<DisplacedProduct>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Coproducts {
    #[serde(default)]
    pub allocation_method: AllocationMethod,
    #[serde(default)]
    pub items: Vec<Coproduct>,
}

/// Emissions not tied to any input (typically non-combustion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherEmission {
    pub gas: String,
    pub amount: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationaryProcess {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub scc: String,
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub input_groups: Vec<InputGroup>,
    pub coproducts: Option<Coproducts>,
    #[serde(default)]
    pub other_emissions: Vec<OtherEmission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub mode: String,
    pub fuel_share: String,
    pub distance: Param,
    pub share: Param,
    #[serde(default)]
    pub backhaul: bool,
    pub loss: Option<Param>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportationProcess {
    pub id: String,
    pub name: String,
    pub input: Input,
    pub output: Output,
    pub moisture: Option<Param>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Energy intensity of a pipeline, by resource or by resource state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineIntensity {
    pub resource: Option<String>,
    pub state: Option<String>,
    pub intensity: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModeKind {
    Tanker {
        speed: Param,
        load_factor_to: Param,
        load_factor_from: Param,
        /// Brake specific fuel consumption [kg/J].
        typical_fc: Param,
        bsfc_adjustment: Param,
        /// Power when unloaded [W].
        typical_power: Param,
        /// Extra power per payload mass [W/kg].
        power_factor: Param,
    },
    Truck {
        fuel_economy_to: Param,
        fuel_economy_from: Param,
    },
    Pipeline {
        #[serde(default)]
        intensities: Vec<PipelineIntensity>,
    },
    Rail {
        energy_intensity: Param,
    },
    Connector,
}

impl ModeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ModeKind::Tanker { .. } => "tanker",
            ModeKind::Truck { .. } => "truck",
            ModeKind::Pipeline { .. } => "pipeline",
            ModeKind::Rail { .. } => "rail",
            ModeKind::Connector => "connector",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub resource: String,
    pub amount: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fuel {
    pub resource: String,
    pub supply: Supply,
    pub share: Param,
    pub tech_to: String,
    pub tech_from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelShare {
    pub id: String,
    pub name: String,
    pub fuels: Vec<Fuel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: ModeKind,
    #[serde(default)]
    pub payloads: Vec<Payload>,
    #[serde(default)]
    pub fuel_shares: Vec<FuelShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareType {
    Energy,
    Mass,
    Volume,
}

impl ShareType {
    pub fn tag(&self) -> &'static str {
        match self {
            ShareType::Energy => "energy",
            ShareType::Mass => "mass",
            ShareType::Volume => "volume",
        }
    }

    /// Unit label of one unit of output for this share type.
    pub fn unit(&self) -> &'static str {
        match self {
            ShareType::Energy => "J",
            ShareType::Mass => "kg",
            ShareType::Volume => "m^3",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "energy" => Ok(ShareType::Energy),
            "mass" => Ok(ShareType::Mass),
            "volume" => Ok(ShareType::Volume),
            other => Err(LcaError::InvalidConfig(format!("unknown mix share type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixShare {
    /// Pathway id (for pathway shares) or mix id (for mix shares).
    pub source: String,
    pub share: Param,
}

/// A weighted blend of pathways and other mixes producing one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mix {
    pub id: String,
    pub name: String,
    pub share_type: ShareType,
    pub resource: String,
    pub output_id: String,
    #[serde(default)]
    pub pathways: Vec<MixShare>,
    #[serde(default)]
    pub mixes: Vec<MixShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEmission {
    pub gas: String,
    /// Emission per distance driven [kg/m].
    pub value: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleMode {
    pub name: String,
    pub vmt_share: Param,
    pub fuel_resource: String,
    pub fuel_pathway: String,
    /// Energy per distance [J/m].
    pub consumption: Param,
    pub charging_efficiency: Param,
    #[serde(default)]
    pub emissions: Vec<VehicleEmission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub resource: String,
    pub supply: Supply,
    /// Amount per unit.
    pub quantity: Param,
    pub replacements: Param,
    /// Units per vehicle.
    pub units: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub scc: String,
    pub modes: Vec<VehicleMode>,
    pub lifetime_distance: Param,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub noncombustion: Vec<VehicleEmission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexKind {
    Process,
    Pathway,
    Mix,
}

impl VertexKind {
    pub fn tag(&self) -> &'static str {
        match self {
            VertexKind::Process => "process",
            VertexKind::Pathway => "pathway",
            VertexKind::Mix => "mix",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "process" => Ok(VertexKind::Process),
            "pathway" => Ok(VertexKind::Pathway),
            "mix" => Ok(VertexKind::Mix),
            other => Err(LcaError::InvalidConfig(format!("unknown vertex type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub kind: VertexKind,
    /// Id of the process, pathway or mix this vertex stands for.
    pub model: String,
}

/// Connects an upstream vertex to either a downstream input or a pathway output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_vertex: String,
    pub output: String,
    /// Downstream vertex, or the pathway output id for edges leaving the pathway.
    pub to_vertex: String,
    /// Input id of the downstream process, or id of a pathway output.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayOutput {
    pub id: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    pub id: String,
    pub name: String,
    pub main_output: String,
    pub outputs: Vec<PathwayOutput>,
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

/// Everything the calculator knows about: the unit of import, storage and loading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub parameters: Vec<Parameter>,
    pub gases: Vec<Gas>,
    pub resources: Vec<Resource>,
    pub technologies: Vec<Technology>,
    pub stationary_processes: Vec<StationaryProcess>,
    pub transportation_processes: Vec<TransportationProcess>,
    pub modes: Vec<Mode>,
    pub mixes: Vec<Mix>,
    pub vehicles: Vec<Vehicle>,
    pub pathways: Vec<Pathway>,
}

impl Dataset {
    /// Appends all records of `other`.
    pub fn merge(&mut self, other: Dataset) {
        self.parameters.extend(other.parameters);
        self.gases.extend(other.gases);
        self.resources.extend(other.resources);
        self.technologies.extend(other.technologies);
        self.stationary_processes.extend(other.stationary_processes);
        self.transportation_processes
            .extend(other.transportation_processes);
        self.modes.extend(other.modes);
        self.mixes.extend(other.mixes);
        self.vehicles.extend(other.vehicles);
        self.pathways.extend(other.pathways);
    }

    pub fn counts(&self) -> DatasetCounts {
        DatasetCounts {
            parameters: self.parameters.len(),
            gases: self.gases.len(),
            resources: self.resources.len(),
            technologies: self.technologies.len(),
            processes: self.stationary_processes.len() + self.transportation_processes.len(),
            modes: self.modes.len(),
            mixes: self.mixes.len(),
            vehicles: self.vehicles.len(),
            pathways: self.pathways.len(),
        }
    }
}

/// Record counts per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetCounts {
    pub parameters: usize,
    pub gases: usize,
    pub resources: usize,
    pub technologies: usize,
    pub processes: usize,
    pub modes: usize,
    pub mixes: usize,
    pub vehicles: usize,
    pub pathways: usize,
}

impl fmt::Display for DatasetCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} parameters, {} gases, {} resources, {} technologies, {} processes, \
             {} modes, {} mixes, {} vehicles, {} pathways",
            self.parameters,
            self.gases,
            self.resources,
            self.technologies,
            self.processes,
            self.modes,
            self.mixes,
            self.vehicles,
            self.pathways
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, name: &str, compatible: &[&str]) -> Resource {
        Resource {
            id: id.to_string(),
            name: name.to_string(),
            state: "liquid".to_string(),
            density: None,
            hhv: None,
            lhv: None,
            market_value: None,
            c_ratio: None,
            s_ratio: None,
            compatible: compatible.iter().map(|s| s.to_string()).collect(),
            evaporation: Vec::new(),
        }
    }

    #[test]
    fn test_compatibility() {
        let diesel = resource("1", "Diesel", &[]);
        let low_s = resource("2", "Low-Sulfur Diesel", &[]);
        let gasoline = resource("3", "Gasoline", &["4"]);
        let blend = resource("4", "Blendstock", &[]);

        assert!(diesel.is_compatible(&diesel));
        assert!(diesel.is_compatible(&low_s));
        assert!(low_s.is_compatible(&diesel));
        assert!(gasoline.is_compatible(&blend));
        assert!(blend.is_compatible(&gasoline));
        assert!(!diesel.is_compatible(&gasoline));
    }

    #[test]
    fn test_tags_round_trip_through_parsers() {
        for m in [
            AllocationMethod::Mass,
            AllocationMethod::Energy,
            AllocationMethod::Market,
            AllocationMethod::Volume,
            AllocationMethod::None,
        ] {
            assert_eq!(AllocationMethod::parse(m.tag()).unwrap(), m);
        }
        assert!(matches!(
            AllocationMethod::parse("Weight"),
            Err(LcaError::InvalidConfig(_))
        ));
        assert!(GroupKind::from_parts("ratio", Param::new(1, "")).is_err());
        assert_eq!(
            InputSource::from_parts("mix", Some("M1".into())).unwrap(),
            InputSource::Mix { mix: "M1".into() }
        );
        assert!(InputSource::from_parts("pathway", None).is_err());
    }

    #[test]
    fn test_dataset_from_toml() {
        let text = r#"
            [[gases]]
            id = "G1"
            name = "CO2"

            [[stationary_processes]]
            id = "P1"
            name = "Refining"

            [[stationary_processes.outputs]]
            id = "O1"
            resource = "R1"
            amount = { value = "1", unit = "J" }

            [[stationary_processes.inputs]]
            id = "I1"
            resource = "R1"
            source = "pathway"
            pathway = "PW1"
            amount = { value = "2", unit = "J" }

            [[stationary_processes.input_groups]]
            type = "efficiency"
            efficiency = { value = "0.5" }

            [[modes]]
            id = "M1"
            name = "Truck"
            kind = "truck"
            fuel_economy_to = { value = "4e-4", unit = "m/m^3" }
            fuel_economy_from = { value = "4e-4", unit = "m/m^3" }
        "#;
        let data: Dataset = toml::from_str(text).unwrap();
        assert_eq!(data.gases.len(), 1);
        let p = &data.stationary_processes[0];
        assert_eq!(
            p.inputs[0].source,
            InputSource::Pathway {
                pathway: "PW1".into()
            }
        );
        assert!(p.inputs[0].accounted);
        assert!(matches!(p.input_groups[0].kind, GroupKind::Efficiency { .. }));
        assert!(matches!(data.modes[0].kind, ModeKind::Truck { .. }));
        assert_eq!(data.counts().processes, 1);
    }
}
