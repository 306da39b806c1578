use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Policy bounding the land a household's labor can bring under cultivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LandConstraintMode {
    /// Labor alone limits land; available area is ignored.
    Unlimited,
    /// Labor-limited land, hard-capped at the available area.
    Step,
    /// Labor-limited land approaching the available area asymptotically.
    Asymptote,
}

impl LandConstraintMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LandConstraintMode::Unlimited => "unlimited",
            LandConstraintMode::Step => "step",
            LandConstraintMode::Asymptote => "asymptote",
        }
    }
}

impl fmt::Display for LandConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LandConstraintMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlimited" => Ok(LandConstraintMode::Unlimited),
            "step" => Ok(LandConstraintMode::Step),
            "asymptote" => Ok(LandConstraintMode::Asymptote),
            other => Err(ConfigError::UnknownLandConstraintMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for LandConstraintMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LandConstraintMode> for String {
    fn from(value: LandConstraintMode) -> Self {
        value.as_str().to_string()
    }
}

/// Half-open age interval `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u16,
    pub max: u16,
}

impl AgeRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, age: u16) -> bool {
        age >= self.min && age < self.max
    }
}

/// Shape and scale of a gamma-CDF food response curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveShape {
    pub shape: f64,
    pub scale: f64,
}

fn default_working_age() -> AgeRange {
    AgeRange::new(15, 65)
}

fn default_fertile_age() -> AgeRange {
    AgeRange::new(15, 50)
}

fn default_fertility_curve() -> CurveShape {
    CurveShape {
        shape: 15.0,
        scale: 0.05,
    }
}

fn default_survival_curve() -> CurveShape {
    CurveShape {
        shape: 5.0,
        scale: 0.06,
    }
}

/// Fixed model parameters, shared read-only by every household, settlement
/// and replicate for the lifetime of a run.
///
/// Units: yields and food in kg of wheat, land in hectares, labor in
/// person-days per year, cultivable area in area units of
/// `hectares_per_area_unit` hectares each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// Yield scale (kg/ha) of the climatic yield curve.
    pub max_yield: f64,
    /// Slope `a` of the climatic yield curve in log precipitation.
    pub yield_a: f64,
    /// Intercept `b` of the climatic yield curve.
    pub yield_b: f64,
    /// Slope `c` of the soil fertility reduction curve.
    pub fertility_coefficient: f64,
    /// Wheat required per person per year (kg).
    pub wheat_req: f64,
    /// Seed sown per hectare of held land (kg/ha).
    pub sowing_rate: f64,
    /// Share of the harvest set aside as seed when planning land.
    pub seed_proportion: f64,
    /// Person-days needed to farm one hectare for a year.
    pub labor_per_hectare: f64,
    /// Person-days one laborer can work per year.
    pub max_labor: f64,
    /// Maintenance level at which infrastructure reaches half capacity.
    pub psi: f64,
    /// Half-width of the infrastructure performance ramp.
    pub epsilon: f64,
    /// Capacity of fully maintained infrastructure.
    pub max_capacity: f64,
    /// Exponent of farming labor in the household utility.
    pub labor_elasticity: f64,
    /// Exponent of effective water in the household utility.
    pub water_elasticity: f64,
    /// Smoothing window of the yield memory; 1 (or 0) feeds the yield directly.
    pub memory_length: u32,
    /// Biennial fallow: land requirement and labor reach double, half the land produces.
    pub fallow: bool,
    pub land_constraint_mode: LandConstraintMode,
    /// Whether survival responds to the household food ratio.
    pub food_sensitivity: bool,
    pub hectares_per_area_unit: f64,
    #[serde(default = "default_working_age")]
    pub working_age: AgeRange,
    #[serde(default = "default_fertile_age")]
    pub fertile_age: AgeRange,
    #[serde(default = "default_fertility_curve")]
    pub fertility_curve: CurveShape,
    #[serde(default = "default_survival_curve")]
    pub survival_curve: CurveShape,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            max_yield: 1000.0,
            yield_a: 0.6,
            yield_b: 0.8,
            fertility_coefficient: 0.2,
            wheat_req: 250.0,
            sowing_rate: 60.0,
            seed_proportion: 0.2,
            labor_per_hectare: 100.0,
            max_labor: 300.0,
            psi: 0.5,
            epsilon: 0.1,
            max_capacity: 1.0,
            labor_elasticity: 0.2,
            water_elasticity: 0.2,
            memory_length: 1,
            fallow: true,
            land_constraint_mode: LandConstraintMode::Asymptote,
            food_sensitivity: true,
            hectares_per_area_unit: 100.0,
            working_age: default_working_age(),
            fertile_age: default_fertile_age(),
            fertility_curve: default_fertility_curve(),
            survival_curve: default_survival_curve(),
        }
    }
}

impl ModelParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_yield", self.max_yield)?;
        positive("wheat_req", self.wheat_req)?;
        positive("labor_per_hectare", self.labor_per_hectare)?;
        positive("hectares_per_area_unit", self.hectares_per_area_unit)?;
        positive("max_capacity", self.max_capacity)?;
        non_negative("max_labor", self.max_labor)?;
        non_negative("sowing_rate", self.sowing_rate)?;
        non_negative("seed_proportion", self.seed_proportion)?;
        finite("yield_a", self.yield_a)?;
        finite("yield_b", self.yield_b)?;
        finite("fertility_coefficient", self.fertility_coefficient)?;

        non_negative("epsilon", self.epsilon)?;
        finite("psi", self.psi)?;
        if self.psi - self.epsilon < 0.0 || self.psi + self.epsilon > 1.0 {
            return Err(ConfigError::parameter(
                "psi",
                format!(
                    "psi ± epsilon must lie within [0, 1], got [{}, {}]",
                    self.psi - self.epsilon,
                    self.psi + self.epsilon
                ),
            ));
        }

        if !(self.labor_elasticity > 0.0) {
            return Err(ConfigError::parameter(
                "labor_elasticity",
                "must be greater than zero",
            ));
        }
        non_negative("water_elasticity", self.water_elasticity)?;
        if self.labor_elasticity + self.water_elasticity >= 1.0 {
            return Err(ConfigError::parameter(
                "water_elasticity",
                "labor and water elasticities must sum to less than one",
            ));
        }

        for (name, range) in [
            ("working_age", self.working_age),
            ("fertile_age", self.fertile_age),
        ] {
            if range.min >= range.max {
                return Err(ConfigError::parameter(
                    name,
                    format!("empty age range [{}, {})", range.min, range.max),
                ));
            }
        }

        for (name, curve) in [
            ("fertility_curve", self.fertility_curve),
            ("survival_curve", self.survival_curve),
        ] {
            if !(curve.shape > 0.0 && curve.scale > 0.0) || !curve.shape.is_finite() {
                return Err(ConfigError::parameter(
                    name,
                    "shape and scale must be positive and finite",
                ));
            }
        }
        Ok(())
    }

    /// Factor applied to land requirement and labor reach when fallowing.
    pub fn fallow_factor(&self) -> f64 {
        if self.fallow {
            2.0
        } else {
            1.0
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::parameter(name, format!("must be finite, got {value}")))
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::parameter(
            name,
            format!("must be greater than zero, got {value}"),
        ))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::parameter(
            name,
            format!("must not be negative, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ModelParameters::default().validate().unwrap();
    }

    #[test]
    fn infrastructure_ramp_must_fit_unit_interval() {
        let params = ModelParameters {
            psi: 0.95,
            epsilon: 0.1,
            ..ModelParameters::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "psi", .. }));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = "logistic".parse::<LandConstraintMode>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownLandConstraintMode("logistic".to_string())
        );
        assert_eq!(
            " Asymptote ".parse::<LandConstraintMode>().unwrap(),
            LandConstraintMode::Asymptote
        );
    }

    #[test]
    fn yaml_overrides_keep_defaults_for_missing_fields() {
        let params: ModelParameters =
            serde_yaml::from_str("wheat_req: 300.0\nland_constraint_mode: step\n").unwrap();
        assert_eq!(params.wheat_req, 300.0);
        assert_eq!(params.land_constraint_mode, LandConstraintMode::Step);
        assert_eq!(params.max_yield, ModelParameters::default().max_yield);
        assert_eq!(params.working_age, AgeRange::new(15, 65));
    }

    #[test]
    fn unknown_mode_in_yaml_fails_to_load() {
        let result: Result<ModelParameters, _> =
            serde_yaml::from_str("land_constraint_mode: sideways\n");
        assert!(result.is_err());
    }

    #[test]
    fn elasticities_must_leave_room_for_land() {
        let params = ModelParameters {
            labor_elasticity: 0.6,
            water_elasticity: 0.4,
            ..ModelParameters::default()
        };
        assert!(params.validate().is_err());
    }
}
