//! Onsite results of vehicles, per meter driven

use crate::database::Database;
use crate::error::Result;
use crate::models::Vehicle;
use crate::onsite::{OnsiteResults, SubProcess};
use crate::pathway::supply_source;
use crate::process::PathwayRef;
use crate::units::{DIMLESS, METER, Quantity};

/// Onsite results of driving `v` one meter. Vehicle data is evaluated at
/// the analysis year minus the configured vehicle lag.
pub fn onsite_results(v: &Vehicle, db: &Database) -> Result<OnsiteResults> {
    let year = db.vehicle_year();
    let fu = Quantity::new(1.0, METER);
    let operation = SubProcess::new("operation", &v.scc);
    let mut r = OnsiteResults::new();

    for m in &v.modes {
        let share = db.eval_at(&m.vmt_share, year)?;
        for e in &m.emissions {
            let value = db.eval_at(&e.value, year)?;
            r.add_emission(operation.clone(), db.gas(&e.gas)?, value * share * fu);
        }

        let fuel = db.resource(&m.fuel_resource)?;
        let path = db.pathway(&m.fuel_pathway)?;
        let (process, output) = path.output_for(fuel, db)?;
        let energy = db.eval_at(&m.consumption, year)? / db.eval_at(&m.charging_efficiency, year)?;
        r.add_requirement(
            process,
            PathwayRef::Pathway(path.id.clone()),
            &output,
            energy * share * fu,
            db,
        )?;
    }

    let lifetime = db.eval_at(&v.lifetime_distance, year)?;
    let one = Quantity::new(1.0, DIMLESS);
    for mat in &v.materials {
        let resource = db.resource(&mat.resource)?;
        let (process, pathway, output) = supply_source(&mat.supply, resource, db)?;
        let per_vehicle = db.eval_at(&mat.quantity, year)? * db.eval_at(&mat.units, year)?;
        let per_lifetime = per_vehicle * db.eval_at(&mat.replacements, year)?.try_add(&one)?;
        r.add_requirement(process, pathway, &output, per_lifetime / (lifetime / fu), db)?;
    }

    for e in &v.noncombustion {
        let value = db.eval_at(&e.value, year)?;
        r.add_emission(operation.clone(), db.gas(&e.gas)?, value * fu);
    }

    r.div(fu);
    Ok(r)
}
