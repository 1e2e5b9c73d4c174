//! Onsite results of stationary processes
//!
//! A stationary process turns inputs (stand-alone or in efficiency/amount
//! groups) into one or more outputs and coproducts. Results are computed
//! for one output at a time and returned per unit of that output.

use crate::database::Database;
use crate::error::{LcaError, Result};
use crate::models::{
    AllocationMethod, Coproduct, CoproductMethod, Gas, GroupKind, Input, InputGroup, Output,
    Pathway, Resource, StationaryProcess,
};
use crate::onsite::{EntityKey, OnsiteResults, SubProcess};
use crate::pathway::{input_source, supply_source};
use crate::units::{KILOGRAM, Quantity};

/// An output or coproduct results can be requested for.
#[derive(Debug, Clone, Copy)]
enum Product<'a> {
    Output(&'a Output),
    Coproduct(&'a Coproduct),
}

impl<'a> Product<'a> {
    fn id(&self) -> &'a str {
        match self {
            Product::Output(o) => &o.id,
            Product::Coproduct(c) => &c.id,
        }
    }

    fn resource<'d>(&self, db: &'d Database) -> Result<&'d Resource> {
        match self {
            Product::Output(o) => db.resource(&o.resource),
            Product::Coproduct(c) => db.resource(&c.resource),
        }
    }

    fn is_coproduct(&self) -> bool {
        matches!(self, Product::Coproduct(_))
    }

    fn amount_before_loss(&self, db: &Database) -> Result<Quantity> {
        match self {
            Product::Output(o) => db.eval(&o.amount),
            Product::Coproduct(c) => db.eval(&c.amount),
        }
    }

    fn loss(&self, db: &Database) -> Result<Quantity> {
        match self {
            Product::Output(o) => Ok(db
                .eval_opt(o.loss.as_ref())?
                .unwrap_or(Quantity::dimensionless(0.0))),
            Product::Coproduct(_) => Ok(Quantity::dimensionless(0.0)),
        }
    }

    /// Amount produced after losses.
    fn amount(&self, db: &Database) -> Result<Quantity> {
        let val = self.amount_before_loss(db)?;
        Ok(val - val * self.loss(db)?)
    }

    fn loss_emissions<'d>(&self, db: &'d Database) -> Result<Vec<(&'d Gas, Quantity)>> {
        let loss = self.loss(db)?;
        if loss.value() == 0.0 {
            return Ok(Vec::new());
        }
        let resource = self.resource(db)?;
        let mass = db.to_mass(resource, self.amount_before_loss(db)?)?;
        let mut out = Vec::with_capacity(resource.evaporation.len());
        for e in &resource.evaporation {
            out.push((db.gas(&e.gas)?, mass * loss * db.eval(&e.share)?));
        }
        Ok(out)
    }

    /// Amount used to weigh this product against the others when allocating.
    /// Without an allocation method everything goes to outputs and nothing
    /// to coproducts.
    fn allocation_amount(&self, method: AllocationMethod, db: &Database) -> Result<Quantity> {
        let resource = self.resource(db)?;
        let amt = self.amount(db)?;
        match method {
            AllocationMethod::Mass => db.to_mass(resource, amt),
            AllocationMethod::Energy => db.to_energy(resource, amt),
            AllocationMethod::Market => db.to_market_value(resource, amt),
            AllocationMethod::Volume => db.to_volume(resource, amt),
            AllocationMethod::None if self.is_coproduct() => Ok(Quantity::zero(amt.dimensions())),
            AllocationMethod::None => Ok(amt),
        }
    }
}

fn find_product<'a>(p: &'a StationaryProcess, id: &str) -> Result<Product<'a>> {
    if let Some(o) = p.outputs.iter().find(|o| o.id == id) {
        return Ok(Product::Output(o));
    }
    p.coproducts
        .iter()
        .flat_map(|c| &c.items)
        .find(|c| c.id == id)
        .map(Product::Coproduct)
        .ok_or_else(|| LcaError::not_found("output", format!("{id} of process {}", p.name)))
}

/// Output (or allocated coproduct) of `p` producing `resource`.
pub fn get_output(
    p: &StationaryProcess,
    resource: &Resource,
    db: &Database,
) -> Result<Option<String>> {
    for o in &p.outputs {
        if db.resource(&o.resource)?.is_compatible(resource) {
            return Ok(Some(o.id.clone()));
        }
    }
    for c in p.coproducts.iter().flat_map(|c| &c.items) {
        if c.method == CoproductMethod::Allocation && db.resource(&c.resource)?.is_compatible(resource)
        {
            return Ok(Some(c.id.clone()));
        }
    }
    Ok(None)
}

fn input_amount(input: &Input, db: &Database) -> Result<Quantity> {
    let amount = input
        .amount
        .as_ref()
        .ok_or_else(|| LcaError::InvalidConfig(format!("input {} has no amount", input.id)))?;
    db.eval(amount)
}

fn input_share(input: &Input, db: &Database) -> Result<Quantity> {
    let share = input
        .share
        .as_ref()
        .ok_or_else(|| LcaError::InvalidConfig(format!("input {} has no share", input.id)))?;
    db.eval(share)
}

/// Total amount an input group requires.
fn group_value(group: &InputGroup, product: Product<'_>, db: &Database) -> Result<Quantity> {
    match &group.kind {
        GroupKind::Efficiency { efficiency } => {
            let gross = product.amount_before_loss(db)? / db.eval(efficiency)?;
            let mut explicit: Option<Quantity> = None;
            for input in &group.inputs {
                let amt = input_amount(input, db)?;
                explicit = Some(match explicit {
                    Some(sum) => sum.try_add(&amt)?,
                    None => amt,
                });
            }
            match explicit {
                Some(sum) => Ok(gross.try_sub(&sum)?),
                None => Ok(gross),
            }
        }
        GroupKind::Amount { amount } => db.eval(amount),
    }
}

/// Inputs of a group with the amount each one requires.
fn group_requirements<'a>(
    group: &'a InputGroup,
    product: Product<'_>,
    db: &Database,
) -> Result<Vec<(&'a Input, Quantity)>> {
    let total = group_value(group, product, db)?;
    let mut out = Vec::with_capacity(group.shares.len() + group.inputs.len());
    for input in &group.shares {
        out.push((input, total * input_share(input, db)?));
    }
    for input in &group.inputs {
        out.push((input, input_amount(input, db)?));
    }
    Ok(out)
}

/// Resource use, upstream requirement and emissions of using `amount` of an input.
fn add_input(
    r: &mut OnsiteResults,
    input: &Input,
    amount: Quantity,
    path: &Pathway,
    db: &Database,
) -> Result<()> {
    let resource = db.resource(&input.resource)?;
    let amount_default = db.to_default_units(resource, amount)?;

    if input.accounted {
        r.add_resource(SubProcess::none(), resource, amount_default, db)?;
        if let Some((process, pathway, output)) = input_source(input, path, db)? {
            r.add_requirement(process, pathway, &output, amount_default, db)?;
        }
    }

    for ts in &input.technologies {
        let tech = db.technology(&ts.technology)?;
        let fuel = db.resource(&tech.input_resource)?;
        let share = db.eval(&ts.share)?;
        let sub = SubProcess::new(&tech.name, &tech.scc);
        let mut energy = None;
        for (gas, factor) in db.emission_factors(tech)? {
            if factor.dimensions() == KILOGRAM {
                r.add_emission(sub.clone(), gas, factor * share);
            } else {
                let e = match energy {
                    Some(e) => e,
                    None => {
                        let e = db.to_energy(fuel, amount)?;
                        energy = Some(e);
                        e
                    }
                };
                r.add_emission(sub.clone(), gas, factor * e * share);
            }
        }
    }

    for er in &input.emission_ratios {
        let gas = db.gas(&er.gas)?;
        let mass = db.to_mass(resource, amount)?;
        r.add_emission(SubProcess::non_combustion(), gas, db.eval(&er.rate)? * mass);
    }
    Ok(())
}

/// Credits displaced products, then scales the results down to the share
/// allocated to `product`.
fn coproducts(
    r: &mut OnsiteResults,
    p: &StationaryProcess,
    product: Product<'_>,
    db: &Database,
) -> Result<()> {
    let Some(cps) = &p.coproducts else {
        return Ok(());
    };

    for cp in cps.items.iter().filter(|c| c.method == CoproductMethod::Displacement) {
        let amount = db.eval(&cp.amount)?;
        for d in &cp.displaced {
            let resource = db.resource(&d.resource)?;
            let (process, pathway, output) = supply_source(&d.supply, resource, db)?;
            let displaced = -(amount * db.eval(&d.ratio)?);
            r.add_requirement(process, pathway, &output, displaced, db)?;
        }
    }

    let method = cps.allocation_method;
    let own = product.allocation_amount(method, db)?;
    let mut total = own;
    for o in p.outputs.iter().filter(|o| o.id != product.id()) {
        total.add_assign_checked(&Product::Output(o).allocation_amount(method, db)?)?;
    }
    for cp in cps
        .items
        .iter()
        .filter(|c| c.method == CoproductMethod::Allocation && c.id != product.id())
    {
        total.add_assign_checked(&Product::Coproduct(cp).allocation_amount(method, db)?)?;
    }
    r.mul(own / total);
    Ok(())
}

/// Onsite results of `p` per unit of `output_id` when running in `path`.
pub fn onsite_results(
    p: &StationaryProcess,
    path: &Pathway,
    output_id: &str,
    db: &Database,
) -> Result<OnsiteResults> {
    let product = find_product(p, output_id)?;
    let mut r = OnsiteResults::new();

    for e in &p.other_emissions {
        r.add_emission(SubProcess::non_combustion(), db.gas(&e.gas)?, db.eval(&e.amount)?);
    }
    for input in &p.inputs {
        add_input(&mut r, input, input_amount(input, db)?, path, db)?;
    }
    for group in &p.input_groups {
        for (input, amount) in group_requirements(group, product, db)? {
            add_input(&mut r, input, amount, path, db)?;
        }
    }
    for (gas, amount) in product.loss_emissions(db)? {
        r.add_emission(SubProcess::losses(&p.scc), gas, amount);
    }

    coproducts(&mut r, p, product, db)?;

    let resource = product.resource(db)?;
    let output_amount = db.to_default_units(resource, product.amount(db)?)?;

    // Only primary outputs that are also consumed here get subtracted.
    if !product.is_coproduct()
        && r
            .resources
            .get(&SubProcess::none())
            .is_some_and(|m| m.contains_key(&EntityKey::from(resource)))
    {
        r.sub_resource(SubProcess::none(), resource, output_amount, db)?;
    }

    r.div(output_amount);
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Param;
    use crate::models::InputSource;
    use crate::units::JOULE;

    fn input(id: &str, amount: Option<f64>, share: Option<f64>) -> Input {
        Input {
            id: id.into(),
            resource: "R1".into(),
            source: InputSource::Well,
            amount: amount.map(|a| Param::new(a, "J")),
            share: share.map(|s| Param::new(s, "")),
            accounted: true,
            technologies: Vec::new(),
            emission_ratios: Vec::new(),
        }
    }

    #[test]
    fn test_efficiency_group_subtracts_explicit_inputs() {
        let db = Database::new(Default::default(), &Default::default()).unwrap();
        let output = Output {
            id: "O1".into(),
            resource: "R1".into(),
            amount: Param::new(1, "J"),
            loss: None,
        };
        let group = InputGroup {
            kind: GroupKind::Efficiency {
                efficiency: Param::new(0.5, ""),
            },
            shares: vec![input("S1", None, Some(0.25)), input("S2", None, Some(0.75))],
            inputs: vec![input("I1", Some(0.4), None)],
        };
        let reqs = group_requirements(&group, Product::Output(&output), &db).unwrap();
        let values: Vec<f64> = reqs.iter().map(|(_, q)| q.value()).collect();
        assert_eq!(reqs[0].1.dimensions(), JOULE);
        assert!((values[0] - 0.4).abs() < 1e-12);
        assert!((values[1] - 1.2).abs() < 1e-12);
        assert!((values[2] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_output_amount_after_loss() {
        let db = Database::new(Default::default(), &Default::default()).unwrap();
        let output = Output {
            id: "O1".into(),
            resource: "R1".into(),
            amount: Param::new(2, "kg"),
            loss: Some(Param::new(0.1, "")),
        };
        let p = Product::Output(&output);
        assert_eq!(p.amount_before_loss(&db).unwrap().value(), 2.0);
        assert!((p.amount(&db).unwrap().value() - 1.8).abs() < 1e-12);
    }
}
