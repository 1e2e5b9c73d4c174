//! Pathway graph resolution
//!
//! Pathways connect vertices (processes, nested pathways, mixes) by edges.
//! These functions answer which process produces a pathway output and where
//! an input of a process comes from.

use crate::database::Database;
use crate::error::{LcaError, Result};
use crate::models::{Input, InputSource, Pathway, Resource, Supply, Vertex, VertexKind};
use crate::process::{PathwayRef, ProcessRef};

impl Pathway {
    pub fn vertex(&self, id: &str) -> Result<&Vertex> {
        self.vertices
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| LcaError::not_found("vertex", format!("{id} in pathway {}", self.name)))
    }

    /// The upstream vertex of the edge ending at `input`, which is either an
    /// input id of a downstream process or a pathway output id.
    pub fn vertex_for_input(&self, input: &str) -> Result<&Vertex> {
        let edge = self.edges.iter().find(|e| e.input == input).ok_or_else(|| {
            LcaError::not_found("edge", format!("to {input} in pathway {}", self.name))
        })?;
        self.vertex(&edge.from_vertex)
    }

    /// The process a vertex stands for and the pathway it runs in.
    pub fn vertex_process(
        &self,
        v: &Vertex,
        resource: &Resource,
        db: &Database,
    ) -> Result<(ProcessRef, PathwayRef)> {
        match v.kind {
            VertexKind::Process => {
                let process = db.process_by_id(&v.model)?.reference();
                Ok((process, PathwayRef::Pathway(self.id.clone())))
            }
            VertexKind::Pathway => {
                let nested = db.pathway(&v.model)?;
                let process = nested.output_process(resource, db)?;
                Ok((process, PathwayRef::Pathway(nested.id.clone())))
            }
            VertexKind::Mix => Ok((ProcessRef::Mix(v.model.clone()), PathwayRef::Mix)),
        }
    }

    /// The process producing the pathway output compatible with `resource`.
    pub fn output_process(&self, resource: &Resource, db: &Database) -> Result<ProcessRef> {
        for o in &self.outputs {
            if db.resource(&o.resource)?.is_compatible(resource) {
                let v = self.vertex_for_input(&o.id)?;
                return Ok(self.vertex_process(v, resource, db)?.0);
            }
        }
        Err(LcaError::not_found(
            "pathway output",
            format!("{} from pathway {}", resource.name, self.name),
        ))
    }

    /// Process and process output id producing `resource` in this pathway.
    pub fn output_for(&self, resource: &Resource, db: &Database) -> Result<(ProcessRef, String)> {
        let process = self.output_process(resource, db)?;
        let output = db.process(&process)?.get_output(resource, db)?;
        Ok((process, output))
    }

    /// The process producing the main output and that process's own main output.
    pub fn main_process_and_output(&self, db: &Database) -> Result<(ProcessRef, String)> {
        let main = self
            .outputs
            .iter()
            .find(|o| o.id == self.main_output)
            .ok_or_else(|| LcaError::not_found("pathway output", self.main_output.clone()))?;
        let resource = db.resource(&main.resource)?;
        let v = self.vertex_for_input(&main.id)?;
        let (process, _) = self.vertex_process(v, resource, db)?;
        let output = db.process(&process)?.main_output()?;
        Ok((process, output))
    }
}

/// Upstream process, pathway and output id supplying `input` to a process
/// running in `path`, or `None` for inputs drawn from the well.
pub fn input_source(
    input: &Input,
    path: &Pathway,
    db: &Database,
) -> Result<Option<(ProcessRef, PathwayRef, String)>> {
    let resource = db.resource(&input.resource)?;
    let (process, pathway) = match &input.source {
        InputSource::Well => return Ok(None),
        InputSource::Previous => {
            let v = path.vertex_for_input(&input.id)?;
            path.vertex_process(v, resource, db)?
        }
        InputSource::Mix { mix } => (ProcessRef::Mix(mix.clone()), PathwayRef::Mix),
        InputSource::Pathway { pathway } => {
            let p = db.pathway(pathway)?;
            (p.output_process(resource, db)?, PathwayRef::Pathway(p.id.clone()))
        }
    };
    let output = db.process(&process)?.get_output(resource, db)?;
    Ok(Some((process, pathway, output)))
}

/// Process, pathway and output id supplying `resource` from a pathway or mix.
pub fn supply_source(
    supply: &Supply,
    resource: &Resource,
    db: &Database,
) -> Result<(ProcessRef, PathwayRef, String)> {
    match supply {
        Supply::Pathway(id) => {
            let p = db.pathway(id)?;
            let (process, output) = p.output_for(resource, db)?;
            Ok((process, PathwayRef::Pathway(p.id.clone()), output))
        }
        Supply::Mix(id) => {
            let process = ProcessRef::Mix(id.clone());
            let output = db.process(&process)?.get_output(resource, db)?;
            Ok((process, PathwayRef::Mix, output))
        }
    }
}
