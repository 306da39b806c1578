use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    error::SimulationError,
    response::{climatic_yield, infrastructure_performance},
    rng::SystemRng,
    world::World,
};

/// Reads each settlement's climate for the step and turns last step's land
/// and maintenance into irrigation and a climatic yield shared by all of the
/// settlement's households.
pub struct EnvironmentSystem;

impl EnvironmentSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnvironmentSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for EnvironmentSystem {
    fn name(&self) -> &str {
        "environment"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<(), SimulationError> {
        let params = &*world.params;
        for settlement in &mut world.settlements {
            let reading = settlement.environment.climate.sample(ctx.step, rng);
            let state = &mut settlement.state;
            state.precipitation = reading.precipitation;
            state.runoff = reading.runoff;
            state.infrastructure = infrastructure_performance(
                state.total_maintenance,
                params.psi,
                params.epsilon,
                params.max_capacity,
            );
            state.irrigation_water = if state.total_land > 0.0 {
                state.infrastructure * state.runoff / state.total_land
            } else {
                0.0
            };
            state.climatic_yield =
                climatic_yield(state.precipitation + state.irrigation_water, params);
            trace!(
                step = ctx.step,
                settlement = %settlement.name,
                precipitation = state.precipitation,
                irrigation = state.irrigation_water,
                climatic_yield = state.climatic_yield,
                "environment updated"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::{Climate, ClimateAnomaly};
    use crate::config::ModelParameters;
    use crate::rng::RngManager;
    use crate::vital_rates::VitalRates;
    use crate::world::{Individual, SettlementEnvironment};

    fn run_once(world: &mut World, step: u64) {
        let mut rng = RngManager::new(3);
        let ctx = SystemContext {
            step,
            seed: 3,
        };
        EnvironmentSystem::new()
            .run(&ctx, world, &mut rng.stream("environment"))
            .unwrap();
    }

    fn world(climate: Climate) -> World {
        let mut world =
            World::new(ModelParameters::default(), VitalRates::pre_industrial()).unwrap();
        let village = world
            .spawn_settlement("village", (0.0, 0.0), SettlementEnvironment::new(climate, 1.0))
            .unwrap();
        world
            .spawn_household(village, vec![Individual::new(30); 4])
            .unwrap();
        world
    }

    #[test]
    fn no_land_means_no_irrigation() {
        let mut world = world(Climate::constant(1.0, 0.5));
        world.settlements[0].state.total_maintenance = 1.0;
        run_once(&mut world, 1);
        let state = world.settlements()[0].state;
        assert_eq!(state.infrastructure, 1.0);
        assert_eq!(state.irrigation_water, 0.0);
        assert_eq!(state.climatic_yield, climatic_yield(1.0, world.params()));
    }

    #[test]
    fn maintained_infrastructure_irrigates_land() {
        let mut world = world(Climate::constant(0.5, 2.0));
        world.settlements[0].state.total_maintenance = 1.0;
        world.settlements[0].state.total_land = 4.0;
        run_once(&mut world, 1);
        let state = world.settlements()[0].state;
        assert_eq!(state.irrigation_water, 0.5);
        assert_eq!(state.climatic_yield, climatic_yield(1.0, world.params()));
    }

    #[test]
    fn drought_window_applies_to_the_step() {
        let climate = Climate::constant(1.0, 0.0).with_anomaly(ClimateAnomaly {
            start: 5,
            end: 6,
            precipitation_factor: 0.5,
            runoff_factor: 1.0,
        });
        let mut world = world(climate);
        run_once(&mut world, 5);
        assert_eq!(world.settlements()[0].state.precipitation, 0.5);
        run_once(&mut world, 7);
        assert_eq!(world.settlements()[0].state.precipitation, 1.0);
    }

    #[test]
    fn zero_rainfall_gives_zero_yield() {
        let mut world = world(Climate::constant(0.0, 0.0));
        run_once(&mut world, 1);
        assert_eq!(world.settlements()[0].state.climatic_yield, 0.0);
    }
}
