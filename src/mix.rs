//! Onsite results of mixes
//!
//! A mix has no emissions of its own. One unit of its output requires each
//! member pathway or member mix in proportion to its share.

use crate::database::Database;
use crate::error::{LcaError, Result};
use crate::models::{Mix, ShareType};
use crate::onsite::OnsiteResults;
use crate::process::{PathwayRef, ProcessRef};
use crate::units::Quantity;

/// Onsite results of `m` per unit of its output.
pub fn onsite_results(m: &Mix, output_id: &str, db: &Database) -> Result<OnsiteResults> {
    if output_id != m.output_id {
        return Err(LcaError::not_found(
            "output",
            format!("{output_id} of mix {}", m.name),
        ));
    }
    let resource = db.resource(&m.resource)?;
    let output = Quantity::from_label(1.0, m.share_type.unit())?;
    let amount = match m.share_type {
        ShareType::Energy => db.to_energy(resource, output)?,
        ShareType::Mass => db.to_mass(resource, output)?,
        ShareType::Volume => db.to_volume(resource, output)?,
    };

    let mut r = OnsiteResults::new();
    for s in &m.pathways {
        let path = db.pathway(&s.source)?;
        let (process, out) = path.output_for(resource, db)?;
        let share = db.eval(&s.share)?;
        r.add_requirement(process, PathwayRef::Pathway(path.id.clone()), &out, share * amount, db)?;
    }
    for s in &m.mixes {
        let member = db.mix(&s.source)?;
        let share = db.eval(&s.share)?;
        r.add_requirement(
            ProcessRef::Mix(member.id.clone()),
            PathwayRef::Mix,
            &member.output_id,
            share * amount,
            db,
        )?;
    }

    r.div(db.to_default_units(resource, output)?);
    Ok(r)
}
