//! Per-household update rules.
//!
//! Each step a household runs `allocate_time → allocate_land → farm → eat →
//! birth_death`. Every rule is a plain function of the household and a
//! read-only [`SettlementView`], so households of a settlement can be
//! updated independently of one another.

use rand::Rng;

use crate::config::ModelParameters;
use crate::response::{
    self, fertility_reduction, infrastructure_performance, land_requirement, max_cultivable_land,
    survival_reduction, LandRequirement,
};
use crate::vital_rates::VitalRates;
use crate::world::{Household, Individual, Settlement};

/// What a household knows about its settlement during a step. Totals are
/// those left by the previous step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlementView {
    pub precipitation: f64,
    pub runoff: f64,
    pub climatic_yield: f64,
    pub soil_fertility: f64,
    pub cultivable_hectares: f64,
    pub total_land: f64,
    pub total_maintenance: f64,
}

impl SettlementView {
    pub fn of(settlement: &Settlement, params: &ModelParameters) -> Self {
        Self {
            precipitation: settlement.state.precipitation,
            runoff: settlement.state.runoff,
            climatic_yield: settlement.state.climatic_yield,
            soil_fertility: settlement.environment.soil_fertility,
            cultivable_hectares: settlement.environment.cultivable_hectares(params),
            total_land: settlement.state.total_land,
            total_maintenance: settlement.state.total_maintenance,
        }
    }

    /// Runoff delivered per hectare of settlement land at full capacity.
    fn runoff_per_hectare(&self) -> f64 {
        if self.total_land > 0.0 {
            self.runoff / self.total_land
        } else {
            0.0
        }
    }
}

/// Utility of spending `maintenance` of the household's labor on
/// infrastructure, given the maintenance of the other households.
pub fn utility(
    household: &Household,
    view: &SettlementView,
    others: f64,
    maintenance: f64,
    params: &ModelParameters,
) -> f64 {
    let j = params.labor_elasticity;
    let k = params.water_elasticity;
    let farming_labor =
        (1.0 - maintenance) * household.laborer_count() as f64 * params.max_labor;
    let water = view.precipitation
        + infrastructure_performance(
            others + maintenance,
            params.psi,
            params.epsilon,
            params.max_capacity,
        ) * view.runoff_per_hectare();
    household.yield_memory
        * household.land.max(0.0).powf(1.0 - j - k)
        * farming_labor.max(0.0).powf(j)
        * water.max(0.0).powf(k)
}

/// Share of labor the household puts into farming.
///
/// The utility is maximized separately in each regime of the infrastructure
/// response (below the ramp, on it, above it) and the best regime wins. Ties
/// go to the regime with less maintenance.
pub fn allocate_time(household: &Household, view: &SettlementView, params: &ModelParameters) -> f64 {
    let others = (view.total_maintenance - household.maintenance()).max(0.0);
    let lower = params.psi - params.epsilon;
    let upper = params.psi + params.epsilon;

    let mut candidates = Vec::with_capacity(3);
    if others < lower {
        candidates.push(0.0);
    }
    if params.epsilon > 0.0 {
        let lo = (lower - others).max(0.0);
        let hi = (upper - others).min(1.0);
        if lo <= hi {
            let j = params.labor_elasticity;
            let k = params.water_elasticity;
            let beta = view.runoff_per_hectare() * params.max_capacity / (2.0 * params.epsilon);
            let x = if beta > 0.0 {
                let alpha = view.precipitation + beta * (others - lower);
                ((k * beta - j * alpha) / (beta * (j + k))).clamp(lo, hi)
            } else {
                lo
            };
            candidates.push(x);
        }
    }
    candidates.push((upper - others).clamp(0.0, 1.0));

    let mut best_maintenance = candidates[0];
    let mut best_utility = utility(household, view, others, best_maintenance, params);
    for &x in &candidates[1..] {
        let u = utility(household, view, others, x, params);
        if u > best_utility {
            best_utility = u;
            best_maintenance = x;
        }
    }
    (1.0 - best_maintenance).clamp(0.0, 1.0)
}

/// Settlement area not held by other households at the end of the previous
/// step. Every household sees the same snapshot; claims are not contested
/// within a step.
pub fn available_area(household: &Household, view: &SettlementView) -> f64 {
    let held_by_others = (view.total_land - household.land).max(0.0);
    (view.cultivable_hectares - held_by_others).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandAllocation {
    pub land: f64,
    pub ceiling: f64,
    pub requirement: LandRequirement,
}

/// Land the household wants given its yield memory, capped by what its
/// farming labor can work on the available area.
pub fn allocate_land(
    household: &Household,
    available_area: f64,
    params: &ModelParameters,
) -> LandAllocation {
    let requirement = land_requirement(
        household.occupant_count(),
        household.yield_memory,
        params.fallow,
        params,
    );
    let ceiling = max_cultivable_land(
        household.laborer_count(),
        household.farming_fraction,
        available_area,
        params.fallow,
        params.land_constraint_mode,
        params,
    );
    LandAllocation {
        land: requirement.hectares.min(ceiling).max(0.0),
        ceiling,
        requirement,
    }
}

/// Moves the yield memory toward the realized yield. A window of one (or
/// zero) replaces the memory outright.
pub fn update_yield_memory(memory: f64, realized: f64, memory_length: u32) -> f64 {
    if memory_length <= 1 {
        realized
    } else {
        memory + (realized - memory) / memory_length as f64
    }
}

/// Harvests the household's land and returns the net harvest, which is
/// negative when seed costs exceed the crop.
pub fn farm(household: &mut Household, view: &SettlementView, params: &ModelParameters) -> f64 {
    let realized = response::yield_reduction(
        view.soil_fertility,
        view.climatic_yield,
        params.fertility_coefficient,
    );
    household.yield_memory =
        update_yield_memory(household.yield_memory, realized, params.memory_length);
    let productive_share = 1.0 / params.fallow_factor();
    household.land * realized * productive_share - household.land * params.sowing_rate
}

/// Feeds the household from storage and harvest and returns the food ratio.
///
/// When storage alone covers the requirement, the harvest replaces it and
/// the leftover old stock spoils. Otherwise the shortfall is taken out of
/// the harvest.
pub fn eat(household: &mut Household, harvest: f64, params: &ModelParameters) -> f64 {
    let requirement = household.occupant_count() as f64 * params.wheat_req;
    let old_storage = household.storage;
    let food_ratio = if requirement > 0.0 {
        ((old_storage + harvest) / requirement).clamp(0.0, 1.0)
    } else {
        1.0
    };
    household.storage = if requirement <= old_storage {
        harvest.max(0.0)
    } else {
        (harvest - (requirement - old_storage)).max(0.0)
    };
    household.food_ratio = food_ratio;
    food_ratio
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Provision {
    pub farming_fraction: f64,
    pub land: LandAllocation,
    pub harvest: f64,
    pub food_ratio: f64,
}

/// Runs the economic half of a household step: time, land, farming and
/// consumption.
pub fn provision(
    household: &mut Household,
    view: &SettlementView,
    params: &ModelParameters,
) -> Provision {
    household.farming_fraction = allocate_time(household, view, params);
    let land = allocate_land(household, available_area(household, view), params);
    household.land = land.land;
    let harvest = farm(household, view, params);
    let food_ratio = eat(household, harvest, params);
    Provision {
        farming_fraction: household.farming_fraction,
        land,
        harvest,
        food_ratio,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vitals {
    pub births: usize,
    pub deaths: usize,
}

/// Stochastic births and deaths.
///
/// Births are drawn first from the fertile occupants at their current ages.
/// Every occupant then draws survival; survivors age one year, and anyone
/// aging past the last tabulated age is removed. Newborns join at age 0 and
/// do not face this step's mortality.
pub fn birth_death<R: Rng + ?Sized>(
    household: &mut Household,
    rates: &VitalRates,
    params: &ModelParameters,
    rng: &mut R,
) -> Vitals {
    if household.is_extinct() {
        return Vitals::default();
    }

    let fertility_factor = fertility_reduction(household.food_ratio, params);
    let survival_factor = if params.food_sensitivity {
        survival_reduction(household.food_ratio, params)
    } else {
        1.0
    };

    let mut births = 0;
    for occupant in &household.occupants {
        if !params.fertile_age.contains(occupant.age) {
            continue;
        }
        let p = rates.fertility(occupant.age).unwrap_or(0.0) * 0.5 * fertility_factor;
        if rng.gen::<f64>() < p {
            births += 1;
        }
    }

    let max_age = rates.max_age();
    let before = household.occupants.len();
    household.occupants.retain_mut(|occupant| {
        let survives = match rates.mortality(occupant.age) {
            Some(mortality) => rng.gen::<f64>() < (1.0 - mortality) * survival_factor,
            None => false,
        };
        if survives && occupant.age < max_age {
            occupant.age += 1;
            true
        } else {
            false
        }
    });
    let deaths = before - household.occupants.len();

    household
        .occupants
        .extend(std::iter::repeat(Individual::newborn()).take(births));
    household.recount(params.working_age);
    Vitals { births, deaths }
}
