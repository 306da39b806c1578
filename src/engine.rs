use std::path::PathBuf;

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::{
    error::{EngineError, SimulationError},
    rng::{self, RngManager, StreamId, SystemRng},
    snapshot::{PopulationSnapshot, SnapshotWriter, TimeSeries},
    systems::{BookkeepingSystem, DemographySystem, EnvironmentSystem, HouseholdSystem},
    world::World,
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    /// Steps between JSON snapshots; zero disables them.
    pub snapshot_interval: u64,
    pub snapshot_dir: PathBuf,
}

impl EngineSettings {
    pub fn new(scenario_name: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            seed,
            snapshot_interval: 0,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Environment coupling, household economy, demography, bookkeeping.
    pub fn with_standard_systems(self) -> Self {
        self.with_system(EnvironmentSystem::new())
            .with_system(HouseholdSystem::new())
            .with_system(DemographySystem::new())
            .with_system(BookkeepingSystem::new())
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval,
            ),
            settings: self.settings,
            phase: RunPhase::Initialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initialized,
    Running,
    Completed,
}

pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
    phase: RunPhase,
}

impl Engine {
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Advances `world` by `steps` and returns every state, the initial one
    /// included. An engine runs once.
    pub fn run(&mut self, world: &mut World, steps: u64) -> Result<TimeSeries, EngineError> {
        self.run_with_hook(world, steps, |_| {})
    }

    pub fn run_with_hook<F>(
        &mut self,
        world: &mut World,
        steps: u64,
        mut hook: F,
    ) -> Result<TimeSeries, EngineError>
    where
        F: FnMut(&PopulationSnapshot),
    {
        if self.phase != RunPhase::Initialized {
            return Err(EngineError::AlreadyCompleted(world.tick()));
        }
        self.phase = RunPhase::Running;
        info!(
            scenario = %self.settings.scenario_name,
            seed = self.settings.seed,
            steps,
            households = world.households().len(),
            population = world.total_population(),
            "starting run"
        );

        let mut series = TimeSeries::new(&self.settings.scenario_name, self.settings.seed);
        series.push(world.snapshot());
        let result = self.advance(world, steps, &mut series, &mut hook);
        self.phase = RunPhase::Completed;
        result?;

        info!(
            scenario = %self.settings.scenario_name,
            steps = world.tick(),
            population = world.total_population(),
            "run completed"
        );
        Ok(series)
    }

    fn advance<F>(
        &mut self,
        world: &mut World,
        steps: u64,
        series: &mut TimeSeries,
        hook: &mut F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(&PopulationSnapshot),
    {
        for _ in 0..steps {
            let step = world.tick() + 1;
            let ctx = SystemContext {
                step,
                seed: self.settings.seed,
            };
            for system in &mut self.systems {
                let mut stream = self.rng.stream(system.name());
                system
                    .run(&ctx, world, &mut stream)
                    .map_err(|source| EngineError::Step {
                        step,
                        system: system.name().to_string(),
                        source,
                    })?;
            }
            world.advance_time();

            let snapshot = world.snapshot();
            debug!(
                step,
                population = snapshot.total_population(),
                land = snapshot.total_land(),
                food_ratio = snapshot.mean_food_ratio().unwrap_or(0.0),
                "step complete"
            );
            self.snapshot_writer
                .maybe_write(&snapshot, &self.settings.scenario_name)?;
            hook(&snapshot);
            series.push(snapshot);
        }
        Ok(())
    }
}

pub struct SystemContext {
    pub step: u64,
    pub seed: u64,
}

impl SystemContext {
    /// Generator for one entity this step, independent of thread scheduling.
    pub fn entity_rng(&self, stream: StreamId, entity: u64) -> ChaCha8Rng {
        rng::entity_rng(self.seed, stream, entity, self.step)
    }
}

pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<(), SimulationError>;
}
