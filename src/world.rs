//! Settlement → household → individual hierarchy.
//!
//! Settlements and households live in flat arenas owned by [`World`] and are
//! addressed by stable ids. A settlement lists the ids of its households; a
//! household owns its occupants outright.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::climate::Climate;
use crate::config::{AgeRange, ModelParameters};
use crate::error::ConfigError;
use crate::response;
use crate::snapshot::{HouseholdSnapshot, PopulationSnapshot, SettlementSnapshot};
use crate::vital_rates::VitalRates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettlementId(u32);

impl SettlementId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HouseholdId(u32);

impl HouseholdId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub age: u16,
}

impl Individual {
    pub fn new(age: u16) -> Self {
        Self { age }
    }

    pub fn newborn() -> Self {
        Self { age: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Household {
    id: HouseholdId,
    settlement: SettlementId,
    pub occupants: Vec<Individual>,
    occupant_count: usize,
    laborer_count: usize,
    /// Hectares under cultivation.
    pub land: f64,
    /// Stored food (kg of wheat).
    pub storage: f64,
    /// Expected yield (kg/ha) used for planning.
    pub yield_memory: f64,
    /// Share of labor spent farming; the rest maintains infrastructure.
    pub farming_fraction: f64,
    pub food_ratio: f64,
}

impl Household {
    pub fn new(
        id: HouseholdId,
        settlement: SettlementId,
        occupants: Vec<Individual>,
        yield_memory: f64,
        working_age: AgeRange,
    ) -> Self {
        let mut household = Self {
            id,
            settlement,
            occupants,
            occupant_count: 0,
            laborer_count: 0,
            land: 0.0,
            storage: 0.0,
            yield_memory,
            farming_fraction: 1.0,
            food_ratio: 1.0,
        };
        household.recount(working_age);
        household
    }

    pub fn id(&self) -> HouseholdId {
        self.id
    }

    pub fn settlement(&self) -> SettlementId {
        self.settlement
    }

    pub fn occupant_count(&self) -> usize {
        self.occupant_count
    }

    pub fn laborer_count(&self) -> usize {
        self.laborer_count
    }

    /// Share of labor devoted to infrastructure maintenance.
    pub fn maintenance(&self) -> f64 {
        1.0 - self.farming_fraction
    }

    /// A household with no occupants stays empty for the rest of the run.
    pub fn is_extinct(&self) -> bool {
        self.occupant_count == 0
    }

    /// Recomputes the derived counts from the occupant set.
    pub fn recount(&mut self, working_age: AgeRange) {
        self.occupant_count = self.occupants.len();
        self.laborer_count = self
            .occupants
            .iter()
            .filter(|o| working_age.contains(o.age))
            .count();
    }

    pub fn snapshot(&self) -> HouseholdSnapshot {
        HouseholdSnapshot {
            id: self.id.raw(),
            settlement: self.settlement.raw(),
            occupants: self.occupant_count,
            laborers: self.laborer_count,
            land: self.land,
            storage: self.storage,
            yield_memory: self.yield_memory,
            farming_fraction: self.farming_fraction,
            food_ratio: self.food_ratio,
        }
    }
}

/// Exogenous, per-settlement environment data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementEnvironment {
    pub climate: Climate,
    /// Cultivable area in area units.
    pub cultivable_area: f64,
    #[serde(default = "default_arable_proportion")]
    pub arable_proportion: f64,
    /// Soil fertility in percent of pristine soil.
    #[serde(default = "default_soil_fertility")]
    pub soil_fertility: f64,
}

pub(crate) fn default_arable_proportion() -> f64 {
    1.0
}

pub(crate) fn default_soil_fertility() -> f64 {
    100.0
}

impl SettlementEnvironment {
    pub fn new(climate: Climate, cultivable_area: f64) -> Self {
        Self {
            climate,
            cultivable_area,
            arable_proportion: default_arable_proportion(),
            soil_fertility: default_soil_fertility(),
        }
    }

    /// Hectares that can be brought under cultivation.
    pub fn cultivable_hectares(&self, params: &ModelParameters) -> f64 {
        self.cultivable_area * self.arable_proportion * params.hectares_per_area_unit
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.climate.validate()?;
        if !(self.cultivable_area.is_finite() && self.cultivable_area >= 0.0) {
            return Err(ConfigError::parameter(
                "cultivable_area",
                format!("must be finite and non-negative, got {}", self.cultivable_area),
            ));
        }
        if !(0.0..=1.0).contains(&self.arable_proportion) {
            return Err(ConfigError::parameter(
                "arable_proportion",
                format!("must lie in [0, 1], got {}", self.arable_proportion),
            ));
        }
        if !(self.soil_fertility.is_finite() && self.soil_fertility >= 0.0) {
            return Err(ConfigError::parameter(
                "soil_fertility",
                format!("must be finite and non-negative, got {}", self.soil_fertility),
            ));
        }
        Ok(())
    }
}

/// Coupling state of a settlement, rewritten every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementState {
    pub precipitation: f64,
    pub runoff: f64,
    pub total_land: f64,
    pub total_maintenance: f64,
    pub infrastructure: f64,
    pub irrigation_water: f64,
    pub climatic_yield: f64,
    pub population: usize,
    pub laborers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    id: SettlementId,
    pub name: String,
    pub location: (f64, f64),
    pub environment: SettlementEnvironment,
    households: Vec<HouseholdId>,
    pub state: SettlementState,
}

impl Settlement {
    pub fn id(&self) -> SettlementId {
        self.id
    }

    pub fn households(&self) -> &[HouseholdId] {
        &self.households
    }

    pub fn snapshot(&self) -> SettlementSnapshot {
        SettlementSnapshot {
            id: self.id.raw(),
            name: self.name.clone(),
            population: self.state.population,
            laborers: self.state.laborers,
            total_land: self.state.total_land,
            total_maintenance: self.state.total_maintenance,
            infrastructure: self.state.infrastructure,
            irrigation_water: self.state.irrigation_water,
            precipitation: self.state.precipitation,
            runoff: self.state.runoff,
            climatic_yield: self.state.climatic_yield,
        }
    }
}

/// Complete simulation state. Parameters and vital rates are shared
/// read-only with every worker thread.
#[derive(Debug, Clone)]
pub struct World {
    tick: u64,
    pub(crate) params: Arc<ModelParameters>,
    pub(crate) vital_rates: Arc<VitalRates>,
    pub(crate) settlements: Vec<Settlement>,
    pub(crate) households: Vec<Household>,
}

impl World {
    pub fn new(params: ModelParameters, vital_rates: VitalRates) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            tick: 0,
            params: Arc::new(params),
            vital_rates: Arc::new(vital_rates),
            settlements: Vec::new(),
            households: Vec::new(),
        })
    }

    pub fn spawn_settlement(
        &mut self,
        name: impl Into<String>,
        location: (f64, f64),
        environment: SettlementEnvironment,
    ) -> Result<SettlementId, ConfigError> {
        environment.validate()?;
        let id = SettlementId(self.settlements.len() as u32);
        let mut settlement = Settlement {
            id,
            name: name.into(),
            location,
            environment,
            households: Vec::new(),
            state: SettlementState::default(),
        };
        let reading = settlement.environment.climate.expected(1);
        settlement.state.precipitation = reading.precipitation;
        settlement.state.runoff = reading.runoff;
        settlement.state.climatic_yield = response::climatic_yield(reading.precipitation, &self.params);
        self.settlements.push(settlement);
        Ok(id)
    }

    /// Adds a household whose yield memory starts at the yield its
    /// settlement's soil gives under expected first-step rainfall.
    pub fn spawn_household(
        &mut self,
        settlement: SettlementId,
        occupants: Vec<Individual>,
    ) -> Result<HouseholdId, ConfigError> {
        let max_age = self.vital_rates.max_age();
        if let Some(too_old) = occupants.iter().find(|o| o.age > max_age) {
            return Err(ConfigError::InvalidScenario(format!(
                "occupant age {} exceeds the oldest tabulated age {max_age}",
                too_old.age
            )));
        }
        let id = HouseholdId(self.households.len() as u32);
        let site = self.settlements.get_mut(settlement.index()).ok_or_else(|| {
            ConfigError::InvalidScenario(format!("unknown settlement {}", settlement.raw()))
        })?;
        let yield_memory = response::yield_reduction(
            site.environment.soil_fertility,
            site.state.climatic_yield,
            self.params.fertility_coefficient,
        );
        site.households.push(id);
        let household = Household::new(
            id,
            settlement,
            occupants,
            yield_memory,
            self.params.working_age,
        );
        self.households.push(household);
        self.refresh_aggregates();
        Ok(id)
    }

    /// Number of completed steps.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_time(&mut self) {
        self.tick += 1;
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn vital_rates(&self) -> &VitalRates {
        &self.vital_rates
    }

    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(id.index())
    }

    pub fn households(&self) -> &[Household] {
        &self.households
    }

    pub fn household(&self, id: HouseholdId) -> Option<&Household> {
        self.households.get(id.index())
    }

    pub fn household_mut(&mut self, id: HouseholdId) -> Option<&mut Household> {
        self.households.get_mut(id.index())
    }

    pub fn total_population(&self) -> usize {
        self.households.iter().map(Household::occupant_count).sum()
    }

    /// Folds household land, maintenance and head counts into their
    /// settlements.
    pub fn refresh_aggregates(&mut self) {
        for settlement in &mut self.settlements {
            settlement.state.total_land = 0.0;
            settlement.state.total_maintenance = 0.0;
            settlement.state.population = 0;
            settlement.state.laborers = 0;
        }
        for household in &self.households {
            if let Some(settlement) = self.settlements.get_mut(household.settlement.index()) {
                settlement.state.total_land += household.land;
                settlement.state.total_maintenance += household.maintenance();
                settlement.state.population += household.occupant_count;
                settlement.state.laborers += household.laborer_count;
            }
        }
    }

    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            step: self.tick,
            settlements: self.settlements.iter().map(Settlement::snapshot).collect(),
            households: self.households.iter().map(Household::snapshot).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_one_settlement() -> (World, SettlementId) {
        let mut world =
            World::new(ModelParameters::default(), VitalRates::pre_industrial()).unwrap();
        let id = world
            .spawn_settlement(
                "village",
                (0.0, 0.0),
                SettlementEnvironment::new(Climate::constant(1.0, 0.2), 1.0),
            )
            .unwrap();
        (world, id)
    }

    #[test]
    fn household_counts_follow_occupants() {
        let (mut world, village) = world_with_one_settlement();
        let ages = [3, 14, 15, 40, 64, 65, 80];
        let id = world
            .spawn_household(village, ages.iter().map(|&a| Individual::new(a)).collect())
            .unwrap();
        let household = world.household(id).unwrap();
        assert_eq!(household.occupant_count(), 7);
        assert_eq!(household.laborer_count(), 3);
        assert_eq!(world.settlements()[0].state.population, 7);
        assert_eq!(world.settlements()[0].households(), &[id]);
    }

    #[test]
    fn initial_yield_memory_matches_first_step_climate() {
        let (mut world, village) = world_with_one_settlement();
        let id = world
            .spawn_household(village, vec![Individual::new(25)])
            .unwrap();
        let expected = response::climatic_yield(1.0, world.params());
        assert_eq!(world.household(id).unwrap().yield_memory, expected);
    }

    #[test]
    fn spawning_into_missing_settlement_fails() {
        let (mut world, _) = world_with_one_settlement();
        let missing = SettlementId::new(9);
        assert!(matches!(
            world.spawn_household(missing, vec![Individual::new(20)]),
            Err(ConfigError::InvalidScenario(_))
        ));
    }

    #[test]
    fn occupants_older_than_table_are_rejected() {
        let (mut world, village) = world_with_one_settlement();
        assert!(world
            .spawn_household(village, vec![Individual::new(150)])
            .is_err());
    }

    #[test]
    fn aggregates_sum_households() {
        let (mut world, village) = world_with_one_settlement();
        let a = world.spawn_household(village, vec![Individual::new(20)]).unwrap();
        let b = world.spawn_household(village, vec![Individual::new(30)]).unwrap();
        world.household_mut(a).unwrap().land = 2.5;
        world.household_mut(b).unwrap().land = 1.5;
        world.household_mut(b).unwrap().farming_fraction = 0.75;
        world.refresh_aggregates();
        let state = world.settlements()[0].state;
        assert_eq!(state.total_land, 4.0);
        assert_eq!(state.total_maintenance, 0.25);
        assert_eq!(state.laborers, 2);
    }
}
