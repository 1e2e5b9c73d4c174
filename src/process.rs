//! Process references and dispatch over process kinds
//!
//! [`ProcessRef`] and [`PathwayRef`] are owned, comparable handles used as
//! map keys in results. [`Process`] borrows the record from a
//! [`Database`] and dispatches onsite computation to the module for its kind.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::cache::OnsiteCache;
use crate::database::Database;
use crate::error::{LcaError, Result};
use crate::models::{Mix, Pathway, Resource, StationaryProcess, TransportationProcess, Vehicle};
use crate::onsite::OnsiteResults;
use crate::{mix, stationary, transport, vehicle};

/// Output id of the distance driven by a vehicle.
pub const DRIVING_OUTPUT: &str = "Driving";
/// Resource id of the distance driven by a vehicle.
pub const DRIVING_RESOURCE: &str = "DrivingRes";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessRef {
    Stationary(String),
    Transportation(String),
    Mix(String),
    Vehicle(String),
    /// Consumer of the functional unit.
    EndUse,
}

impl ProcessRef {
    pub fn id_str(&self) -> String {
        match self {
            ProcessRef::Stationary(id) => format!("Stationary{id}"),
            ProcessRef::Transportation(id) => format!("Trans{id}"),
            ProcessRef::Mix(id) => format!("Mix{id}"),
            ProcessRef::Vehicle(id) => format!("Vehicle{id}"),
            ProcessRef::EndUse => "End use".to_string(),
        }
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_str())
    }
}

/// The pathway context a process runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathwayRef {
    Pathway(String),
    /// Context of every mix.
    Mix,
    /// Context of every vehicle.
    Driving,
}

impl PathwayRef {
    pub fn id_str(&self) -> String {
        match self {
            PathwayRef::Pathway(id) => format!("Pathway{id}"),
            PathwayRef::Mix => "Mix".to_string(),
            PathwayRef::Driving => "Driving".to_string(),
        }
    }

    pub fn name(&self, db: &Database) -> String {
        match self {
            PathwayRef::Pathway(id) => db
                .pathway(id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|_| id.clone()),
            PathwayRef::Mix => "Mix".to_string(),
            PathwayRef::Driving => "Driving".to_string(),
        }
    }

    /// The pathway record, for processes that need their pathway's edges.
    pub fn resolve<'a>(&self, db: &'a Database) -> Result<&'a Pathway> {
        match self {
            PathwayRef::Pathway(id) => db.pathway(id),
            other => Err(LcaError::InvalidConfig(format!(
                "process needs a pathway context but runs in '{}'",
                other.id_str()
            ))),
        }
    }
}

impl fmt::Display for PathwayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_str())
    }
}

/// A process record borrowed from the database.
#[derive(Debug, Clone, Copy)]
pub enum Process<'a> {
    Stationary(&'a StationaryProcess),
    Transportation(&'a TransportationProcess),
    Mix(&'a Mix),
    Vehicle(&'a Vehicle),
    EndUse,
}

impl<'a> Process<'a> {
    pub fn reference(&self) -> ProcessRef {
        match self {
            Process::Stationary(p) => ProcessRef::Stationary(p.id.clone()),
            Process::Transportation(p) => ProcessRef::Transportation(p.id.clone()),
            Process::Mix(m) => ProcessRef::Mix(m.id.clone()),
            Process::Vehicle(v) => ProcessRef::Vehicle(v.id.clone()),
            Process::EndUse => ProcessRef::EndUse,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Process::Stationary(p) => &p.name,
            Process::Transportation(p) => &p.name,
            Process::Mix(m) => &m.name,
            Process::Vehicle(v) => &v.name,
            Process::EndUse => "End use",
        }
    }

    /// Id of the output of this process that produces `resource`.
    pub fn get_output(&self, resource: &Resource, db: &Database) -> Result<String> {
        let not_found = || {
            LcaError::not_found(
                "output",
                format!("{} from process '{}'", resource.name, self.name()),
            )
        };
        match self {
            Process::Stationary(p) => stationary::get_output(p, resource, db)?.ok_or_else(not_found),
            Process::Transportation(p) => {
                if db.resource(&p.output.resource)?.is_compatible(resource) {
                    Ok(p.output.id.clone())
                } else {
                    Err(not_found())
                }
            }
            Process::Mix(m) => {
                if db.resource(&m.resource)?.is_compatible(resource) {
                    Ok(m.output_id.clone())
                } else {
                    Err(not_found())
                }
            }
            Process::Vehicle(_) => Ok(DRIVING_OUTPUT.to_string()),
            Process::EndUse => Err(not_found()),
        }
    }

    pub fn main_output(&self) -> Result<String> {
        match self {
            Process::Stationary(p) => match p.outputs.as_slice() {
                [o] => Ok(o.id.clone()),
                outputs => Err(LcaError::InvalidConfig(format!(
                    "process '{}' has {} outputs and no single main output",
                    p.name,
                    outputs.len()
                ))),
            },
            Process::Transportation(p) => Ok(p.output.id.clone()),
            Process::Mix(m) => Ok(m.output_id.clone()),
            Process::Vehicle(_) => Ok(DRIVING_OUTPUT.to_string()),
            Process::EndUse => Err(LcaError::InvalidConfig(
                "end use has no output".to_string(),
            )),
        }
    }

    /// Onsite results per unit of `output`, computed without the cache.
    pub fn compute_onsite(
        &self,
        path: &PathwayRef,
        output: &str,
        db: &Database,
    ) -> Result<OnsiteResults> {
        debug!(process = self.name(), pathway = %path, output, "computing onsite results");
        match self {
            Process::Stationary(p) => stationary::onsite_results(p, path.resolve(db)?, output, db),
            Process::Transportation(p) => transport::onsite_results(p, path.resolve(db)?, output, db),
            Process::Mix(m) => mix::onsite_results(m, output, db),
            Process::Vehicle(v) => vehicle::onsite_results(v, db),
            Process::EndUse => Ok(OnsiteResults::new()),
        }
    }

    /// Onsite results per unit of `output`, shared through `cache`.
    pub fn onsite_results(
        &self,
        path: &PathwayRef,
        output: &str,
        db: &Database,
        cache: &OnsiteCache,
    ) -> Result<Arc<OnsiteResults>> {
        let key = (self.reference(), path.clone(), output.to_string());
        cache.get_or_compute(key, || self.compute_onsite(path, output, db))
    }
}

/// Something a life cycle can be solved for.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Pathway(&'a Pathway),
    Mix(&'a Mix),
    Vehicle(&'a Vehicle),
}

impl<'a> Target<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Target::Pathway(p) => &p.name,
            Target::Mix(m) => &m.name,
            Target::Vehicle(v) => &v.name,
        }
    }

    /// The process producing the main output, its pathway context and the output id.
    pub fn main_process_and_output(&self, db: &Database) -> Result<(ProcessRef, PathwayRef, String)> {
        match self {
            Target::Pathway(p) => {
                let (process, output) = p.main_process_and_output(db)?;
                Ok((process, PathwayRef::Pathway(p.id.clone()), output))
            }
            Target::Mix(m) => Ok((
                ProcessRef::Mix(m.id.clone()),
                PathwayRef::Mix,
                m.output_id.clone(),
            )),
            Target::Vehicle(v) => Ok((
                ProcessRef::Vehicle(v.id.clone()),
                PathwayRef::Driving,
                DRIVING_OUTPUT.to_string(),
            )),
        }
    }
}
