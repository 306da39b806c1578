use crate::{
    engine::{System, SystemContext},
    error::SimulationError,
    rng::SystemRng,
    world::{Household, World},
};

/// Folds households into settlement totals and checks the state the step
/// left behind.
pub struct BookkeepingSystem;

impl BookkeepingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookkeepingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BookkeepingSystem {
    fn name(&self) -> &str {
        "bookkeeping"
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<(), SimulationError> {
        let max_age = world.vital_rates.max_age();
        for household in &world.households {
            check_household(household, max_age)?;
        }
        world.refresh_aggregates();
        Ok(())
    }
}

fn check_household(household: &Household, max_age: u16) -> Result<(), SimulationError> {
    let id = household.id().raw();
    let fail = |what: String| Err(SimulationError::Invariant(format!("household {id}: {what}")));

    if household.occupant_count() != household.occupants.len() {
        return fail(format!(
            "occupant count {} does not match {} occupants",
            household.occupant_count(),
            household.occupants.len()
        ));
    }
    if household.laborer_count() > household.occupant_count() {
        return fail(format!(
            "{} laborers among {} occupants",
            household.laborer_count(),
            household.occupant_count()
        ));
    }
    if let Some(occupant) = household.occupants.iter().find(|o| o.age > max_age) {
        return fail(format!("occupant aged {} past {max_age}", occupant.age));
    }
    for (name, value) in [
        ("land", household.land),
        ("storage", household.storage),
        ("yield memory", household.yield_memory),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return fail(format!("{name} is {value}"));
        }
    }
    for (name, value) in [
        ("food ratio", household.food_ratio),
        ("farming fraction", household.farming_fraction),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return fail(format!("{name} {value} outside [0, 1]"));
        }
    }
    Ok(())
}
