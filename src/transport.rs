//! Onsite results of transportation processes
//!
//! A transportation process moves one input resource through a sequence of
//! steps. Each step uses a mode (tanker, truck, pipeline, rail, connector)
//! whose energy intensity, times the wet mass moved and the distance, gives
//! the fuel burned.

use crate::database::Database;
use crate::error::{LcaError, Result};
use crate::models::{Fuel, Mode, ModeKind, Pathway, Resource, Step, TransportationProcess};
use crate::onsite::{OnsiteResults, SCC_NON_COMBUSTION, SubProcess};
use crate::pathway::{input_source, supply_source};
use crate::units::{J_PER_M_KG, JOULE, KILOGRAM, Quantity};

fn payload(mode: &Mode, material: &Resource, db: &Database) -> Result<Quantity> {
    let p = mode
        .payloads
        .iter()
        .find(|p| p.resource == material.id)
        .ok_or_else(|| {
            LcaError::not_found("payload", format!("{} in mode {}", material.name, mode.name))
        })?;
    db.eval(&p.amount)
}

fn heating_value_volume(fuel: &Resource, db: &Database) -> Result<Quantity> {
    db.heating_value_volume(fuel)?.ok_or_else(|| LcaError::UnitConversion {
        resource: format!("{} ({})", fuel.name, fuel.id),
        from: "volume without heating value".to_string(),
    })
}

/// Energy per mass moved per distance, outbound and on the return trip.
pub fn energy_intensity(
    mode: &Mode,
    material: &Resource,
    fuel: &Fuel,
    db: &Database,
) -> Result<(Quantity, Quantity)> {
    let zero = Quantity::zero(J_PER_M_KG);
    match &mode.kind {
        ModeKind::Tanker {
            speed,
            load_factor_to,
            load_factor_from,
            typical_fc,
            bsfc_adjustment,
            typical_power,
            power_factor,
        } => {
            let speed = db.eval(speed)?;
            let fc = db.eval(typical_fc)?;
            let fc_adj = db.eval(bsfc_adjustment)?;
            let payload = payload(mode, material, db)?;
            let power = db.eval(typical_power)?.try_add(&(db.eval(power_factor)? * payload))?;

            let fuel_res = db.resource(&fuel.resource)?;
            let density = db.density(fuel_res)?.ok_or_else(|| LcaError::UnitConversion {
                resource: format!("{} ({})", fuel_res.name, fuel_res.id),
                from: "volume without density".to_string(),
            })?;
            let hv = heating_value_volume(fuel_res, db)? / density;

            let leg = |load_factor: Quantity| -> Result<Quantity> {
                let ec = (fc_adj / load_factor).try_add(&fc)? * hv;
                let ei = ec * power * load_factor / (payload * speed);
                ei.check(J_PER_M_KG)?;
                Ok(ei)
            };
            let to = leg(db.eval(load_factor_to)?)?;
            let from = leg(db.eval(load_factor_from)?)?;
            Ok((to, from))
        }
        ModeKind::Truck {
            fuel_economy_to,
            fuel_economy_from,
        } => {
            let payload = payload(mode, material, db)?;
            let hv = heating_value_volume(db.resource(&fuel.resource)?, db)?;
            let to = hv / db.eval(fuel_economy_to)? / payload;
            let from = hv / db.eval(fuel_economy_from)? / payload;
            to.check(J_PER_M_KG)?;
            Ok((to, from))
        }
        ModeKind::Pipeline { intensities } => {
            let by_resource = intensities
                .iter()
                .find(|i| i.resource.as_deref() == Some(material.id.as_str()));
            let by_state = || {
                intensities
                    .iter()
                    .find(|i| i.state.as_deref() == Some(material.state.as_str()))
            };
            let ei = by_resource.or_else(by_state).ok_or_else(|| {
                LcaError::not_found(
                    "pipeline energy intensity",
                    format!("{} in mode {}", material.name, mode.name),
                )
            })?;
            Ok((db.eval(&ei.intensity)?, zero))
        }
        ModeKind::Rail { energy_intensity } => Ok((db.eval(energy_intensity)?, zero)),
        ModeKind::Connector => Ok((zero, zero)),
    }
}

fn fuel_share<'a>(step: &Step, mode: &'a Mode) -> Result<&'a [Fuel]> {
    mode.fuel_shares
        .iter()
        .find(|f| f.id == step.fuel_share)
        .map(|f| f.fuels.as_slice())
        .ok_or_else(|| {
            LcaError::not_found("fuel share", format!("{} in mode {}", step.fuel_share, mode.id))
        })
}

/// Fuel use, upstream fuel requirement and combustion emissions of one leg.
fn add_fuel_use(
    r: &mut OnsiteResults,
    fuel: &Fuel,
    tech_id: &str,
    energy: Quantity,
    db: &Database,
) -> Result<()> {
    energy.check(JOULE)?;
    let fuel_res = db.resource(&fuel.resource)?;
    let tech = db.technology(tech_id)?;
    let sub = SubProcess::new(&tech.name, &tech.scc);
    r.add_resource(sub.clone(), fuel_res, energy, db)?;
    let (process, pathway, output) = supply_source(&fuel.supply, fuel_res, db)?;
    r.add_requirement(process, pathway, &output, energy, db)?;
    for (gas, factor) in db.emission_factors(tech)? {
        let e = energy * factor;
        e.check(KILOGRAM)?;
        r.add_emission(sub.clone(), gas, e);
    }
    Ok(())
}

/// Onsite results of `p` per unit of its output when running in `path`.
pub fn onsite_results(
    p: &TransportationProcess,
    path: &Pathway,
    output_id: &str,
    db: &Database,
) -> Result<OnsiteResults> {
    if p.output.id != output_id {
        return Err(LcaError::not_found(
            "output",
            format!("{output_id} of process {}", p.name),
        ));
    }
    let mut r = OnsiteResults::new();
    let losses = SubProcess::losses(SCC_NON_COMBUSTION);

    let material = db.resource(&p.input.resource)?;
    let input_amount = p.input.amount.as_ref().ok_or_else(|| {
        LcaError::InvalidConfig(format!("input {} of process {} has no amount", p.input.id, p.name))
    })?;
    let dry = db.to_default_units(material, db.eval(input_amount)?)?;
    r.add_resource(SubProcess::none(), material, dry, db)?;
    let (process, pathway, output) = input_source(&p.input, path, db)?.ok_or_else(|| {
        LcaError::InvalidConfig(format!("transported input of {} comes from the well", p.name))
    })?;
    r.add_requirement(process, pathway, &output, dry, db)?;

    let moisture = db
        .eval_opt(p.moisture.as_ref())?
        .unwrap_or(Quantity::dimensionless(0.0));
    moisture.check(crate::units::DIMLESS)?;
    let wet = db.to_mass(material, dry.scaled(1.0 / (1.0 - moisture.value())))?;

    let mut step_losses: Option<Quantity> = None;
    for step in &p.steps {
        let distance = db.eval(&step.distance)?;
        let share = db.eval(&step.share)?;
        let mode = db.mode(&step.mode)?;
        for fuel in fuel_share(step, mode)? {
            let (ei_to, ei_from) = energy_intensity(mode, material, fuel, db)?;
            let fuel_share = db.eval(&fuel.share)?;
            let energy_to = wet * ei_to * distance * share * fuel_share;
            add_fuel_use(&mut r, fuel, &fuel.tech_to, energy_to, db)?;
            if step.backhaul {
                let energy_from = wet * ei_from * distance * share * fuel_share;
                add_fuel_use(&mut r, fuel, &fuel.tech_from, energy_from, db)?;
            }
        }

        let loss = db
            .eval_opt(step.loss.as_ref())?
            .unwrap_or(Quantity::dimensionless(0.0));
        if loss.value() != 0.0 {
            for e in &material.evaporation {
                r.add_emission(losses.clone(), db.gas(&e.gas)?, loss * wet * db.eval(&e.share)?);
            }
        }
        let lost = loss * wet;
        step_losses = Some(match step_losses {
            Some(sum) => sum.try_add(&lost)?,
            None => lost,
        });
    }

    let output_res = db.resource(&p.output.resource)?;
    let before_loss = db.eval(&p.output.amount)?;
    let output_loss = db
        .eval_opt(p.output.loss.as_ref())?
        .unwrap_or(Quantity::dimensionless(0.0));
    let output_amount = before_loss - before_loss * output_loss;

    let mut delivered = db.to_default_units(material, output_amount)?;
    if let Some(lost) = step_losses {
        delivered = delivered.try_sub(&db.to_default_units(material, lost)?)?;
    }
    r.sub_resource(SubProcess::none(), material, delivered, db)?;

    if output_loss.value() != 0.0 {
        let mass = db.to_mass(output_res, before_loss)?;
        for e in &output_res.evaporation {
            r.add_emission(losses.clone(), db.gas(&e.gas)?, mass * output_loss * db.eval(&e.share)?);
        }
    }

    r.div(db.to_default_units(output_res, output_amount)?);
    Ok(r)
}
