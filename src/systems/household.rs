use rayon::prelude::*;
use tracing::warn;

use crate::{
    engine::{System, SystemContext},
    error::SimulationError,
    household::{provision, SettlementView},
    rng::SystemRng,
    world::World,
};

/// Labor, land, farming and consumption for every household, in parallel.
/// All households of a settlement see the same settlement view.
pub struct HouseholdSystem;

impl HouseholdSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HouseholdSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for HouseholdSystem {
    fn name(&self) -> &str {
        "household"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<(), SimulationError> {
        let params = &*world.params;
        let views: Vec<SettlementView> = world
            .settlements
            .iter()
            .map(|settlement| SettlementView::of(settlement, params))
            .collect();

        let capped = world
            .households
            .par_iter_mut()
            .map(|household| {
                let view = views.get(household.settlement().index()).ok_or_else(|| {
                    SimulationError::Invariant(format!(
                        "household {} belongs to unknown settlement {}",
                        household.id().raw(),
                        household.settlement().raw()
                    ))
                })?;
                let outcome = provision(household, view, params);
                Ok(usize::from(outcome.land.requirement.capped))
            })
            .collect::<Result<Vec<_>, SimulationError>>()?
            .into_iter()
            .sum::<usize>();

        if capped > 0 {
            warn!(
                step = ctx.step,
                households = capped,
                "expected yield is zero; land requirement capped"
            );
        }
        Ok(())
    }
}
