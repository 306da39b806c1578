use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    climate::Climate,
    config::ModelParameters,
    error::ConfigError,
    population::{create_population, AgeDistribution},
    rng::{derive_seed, StreamId},
    vital_rates::VitalRates,
    world::{default_arable_proportion, default_soil_fertility, SettlementEnvironment, World},
};

const POPULATION_STREAM: StreamId = 1;

fn default_steps() -> u64 {
    500
}

fn default_household_count() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_steps")]
    pub steps: u64,
    #[serde(default)]
    pub snapshot_interval: u64,
    #[serde(default)]
    pub parameters: ModelParameters,
    /// Falls back to the pre-industrial schedule when omitted.
    #[serde(default)]
    pub vital_rates: Option<VitalRates>,
    pub settlements: Vec<ScenarioSettlement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSettlement {
    pub name: String,
    #[serde(default)]
    pub location: (f64, f64),
    pub climate: Climate,
    pub cultivable_area: f64,
    #[serde(default = "default_arable_proportion")]
    pub arable_proportion: f64,
    #[serde(default = "default_soil_fertility")]
    pub soil_fertility: f64,
    #[serde(default)]
    pub households: Vec<HouseholdGroup>,
}

impl ScenarioSettlement {
    pub fn environment(&self) -> SettlementEnvironment {
        SettlementEnvironment {
            climate: self.climate.clone(),
            cultivable_area: self.cultivable_area,
            arable_proportion: self.arable_proportion,
            soil_fertility: self.soil_fertility,
        }
    }
}

/// `count` households of `occupants` people each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdGroup {
    #[serde(default = "default_household_count")]
    pub count: usize,
    pub occupants: usize,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub ages: AgeDistribution,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads, parses and validates a scenario file.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario =
            Scenario::parse(&data).with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn parse(yaml: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn vital_rates(&self) -> VitalRates {
        self.vital_rates.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.validate()?;
        if self.settlements.is_empty() {
            return Err(ConfigError::InvalidScenario(
                "at least one settlement is required".into(),
            ));
        }
        let rates = self.vital_rates();
        for settlement in &self.settlements {
            settlement.environment().validate()?;
            for group in &settlement.households {
                group.ages.validate(&rates)?;
            }
        }
        Ok(())
    }

    pub fn household_count(&self) -> usize {
        self.settlements
            .iter()
            .flat_map(|s| &s.households)
            .map(|g| g.count)
            .sum()
    }

    /// Builds the initial world. Ages drawn for the seed population depend
    /// only on `seed`.
    pub fn build_world(&self, seed: u64) -> Result<World, ConfigError> {
        self.validate()?;
        let rates = self.vital_rates();
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, POPULATION_STREAM, 0, 0));
        let mut world = World::new(self.parameters.clone(), rates.clone())?;
        for settlement in &self.settlements {
            let id = world.spawn_settlement(
                settlement.name.clone(),
                settlement.location,
                settlement.environment(),
            )?;
            for group in &settlement.households {
                for _ in 0..group.count {
                    let occupants =
                        create_population(group.occupants, &group.ages, &rates, &mut rng)?;
                    world.spawn_household(id, occupants)?;
                }
            }
        }
        Ok(world)
    }

    pub fn steps(&self, override_steps: Option<u64>) -> u64 {
        override_steps.unwrap_or(self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LandConstraintMode;

    const VILLAGE: &str = r#"
name: village
seed: 9
steps: 20
parameters:
  land_constraint_mode: step
settlements:
  - name: upper
    climate:
      precipitation: {constant: 1.0}
      runoff: {constant: 0.2}
    cultivable_area: 1.0
    households:
      - {count: 2, occupants: 5, ages: {uniform: {min: 0, max: 40}}}
  - name: lower
    location: [3.0, 4.0]
    climate:
      precipitation: {series: [1.0, 0.8]}
      runoff: {constant: 0.0}
    cultivable_area: 0.5
    soil_fertility: 80.0
    households:
      - {occupants: 3}
"#;

    #[test]
    fn parses_and_builds_world() {
        let scenario = Scenario::parse(VILLAGE).unwrap();
        assert_eq!(scenario.parameters.land_constraint_mode, LandConstraintMode::Step);
        assert_eq!(scenario.household_count(), 3);

        let world = scenario.build_world(scenario.seed).unwrap();
        assert_eq!(world.settlements().len(), 2);
        assert_eq!(world.households().len(), 3);
        assert_eq!(world.total_population(), 13);
        assert_eq!(world.settlements()[1].location, (3.0, 4.0));
        assert!(world.households()[2].occupants.iter().all(|o| o.age == 25));
    }

    #[test]
    fn same_seed_same_initial_ages() {
        let scenario = Scenario::parse(VILLAGE).unwrap();
        let a = scenario.build_world(4).unwrap();
        let b = scenario.build_world(4).unwrap();
        assert_eq!(a.households()[0].occupants, b.households()[0].occupants);
    }

    #[test]
    fn bad_configuration_fails_before_running() {
        let bad_mode = VILLAGE.replace("land_constraint_mode: step", "land_constraint_mode: ramp");
        assert!(Scenario::parse(&bad_mode).is_err());

        let bad_psi = VILLAGE.replace(
            "land_constraint_mode: step",
            "psi: 0.95\n  epsilon: 0.1",
        );
        let err = Scenario::parse(&bad_psi).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());

        let negative = VILLAGE.replace("occupants: 3", "occupants: -3");
        assert!(Scenario::parse(&negative).is_err());
    }

    #[test]
    fn scenario_without_settlements_is_rejected() {
        let yaml = "name: empty\nsettlements: []\n";
        assert!(Scenario::parse(yaml).is_err());
    }
}
