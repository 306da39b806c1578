use rayon::prelude::*;
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    error::SimulationError,
    household::{birth_death, Vitals},
    rng::{StreamId, SystemRng},
    world::World,
};

const DEMOGRAPHY_STREAM: StreamId = 2;

/// Births, deaths and aging. Each household draws from its own generator
/// seeded by household id and step.
pub struct DemographySystem;

impl DemographySystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DemographySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for DemographySystem {
    fn name(&self) -> &str {
        "demography"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<(), SimulationError> {
        let params = &*world.params;
        let rates = &*world.vital_rates;
        let totals = world
            .households
            .par_iter_mut()
            .map(|household| {
                let mut rng = ctx.entity_rng(DEMOGRAPHY_STREAM, household.id().raw() as u64);
                birth_death(household, rates, params, &mut rng)
            })
            .reduce(Vitals::default, |a, b| Vitals {
                births: a.births + b.births,
                deaths: a.deaths + b.deaths,
            });
        debug!(
            step = ctx.step,
            births = totals.births,
            deaths = totals.deaths,
            "demography"
        );
        Ok(())
    }
}
