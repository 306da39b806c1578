//! Response functions linking climate, labor and food to yields, land and
//! vital rates.
//!
//! Every function here is total over its valid input range. Inputs that would
//! leave the domain of a logarithm or a division (no rain, barren soil, no
//! land) are resolved by explicit guards that return a defined value, since
//! they are ordinary states of the simulated world rather than errors.

use std::f64::consts::PI;

use crate::config::{CurveShape, LandConstraintMode, ModelParameters};

/// Land requirement reported when the expected yield is zero.
pub const LAND_REQUIREMENT_CAP: f64 = 1.0e9;

/// Crop yield (kg/ha) produced by a given amount of water,
/// `max_yield * max(0, a ln(p) + b)`. Zero for `p <= 0`.
pub fn climatic_yield(precipitation: f64, params: &ModelParameters) -> f64 {
    if !(precipitation > 0.0) {
        return 0.0;
    }
    params.max_yield * (params.yield_a * precipitation.ln() + params.yield_b).max(0.0)
}

/// Climatic yield reduced by soil fertility (percent of pristine soil),
/// `yield * max(0, c ln(fertility / 100) + 1)`. Zero for `fertility <= 0`.
pub fn yield_reduction(fertility: f64, climatic_yield: f64, coefficient: f64) -> f64 {
    if !(fertility > 0.0) {
        return 0.0;
    }
    climatic_yield * (coefficient * (fertility / 100.0).ln() + 1.0).max(0.0)
}

/// Share of the potential irrigation capacity realized for a given
/// maintenance effort.
///
/// Zero below `psi - epsilon`, `max_capacity` above `psi + epsilon`, and a
/// straight ramp between the two, so the function is continuous at both
/// breakpoints. A zero-width ramp degenerates to a step at `psi`.
pub fn infrastructure_performance(
    maintenance: f64,
    psi: f64,
    epsilon: f64,
    max_capacity: f64,
) -> f64 {
    let lower = psi - epsilon;
    let upper = psi + epsilon;
    if maintenance <= lower {
        0.0
    } else if maintenance >= upper {
        max_capacity
    } else {
        max_capacity * (maintenance - lower) / (upper - lower)
    }
}

/// Land (ha) the farming labor of a household could work with no area limit.
pub fn potential_land(
    laborers: usize,
    farming_fraction: f64,
    fallow: bool,
    params: &ModelParameters,
) -> f64 {
    let fallow_factor = if fallow { 2.0 } else { 1.0 };
    params.max_labor * farming_fraction.clamp(0.0, 1.0) * laborers as f64 * fallow_factor
        / params.labor_per_hectare
}

/// Applies the land constraint policy to a labor-limited potential.
pub fn constrain_land(potential: f64, available_area: f64, mode: LandConstraintMode) -> f64 {
    let potential = potential.max(0.0);
    match mode {
        LandConstraintMode::Unlimited => potential,
        LandConstraintMode::Step => potential.min(available_area.max(0.0)),
        LandConstraintMode::Asymptote => {
            if !(available_area > 0.0) {
                0.0
            } else {
                available_area * (1.0 - (-potential / available_area).exp())
            }
        }
    }
}

/// Upper bound on the land a household can cultivate.
pub fn max_cultivable_land(
    laborers: usize,
    farming_fraction: f64,
    available_area: f64,
    fallow: bool,
    mode: LandConstraintMode,
    params: &ModelParameters,
) -> f64 {
    constrain_land(
        potential_land(laborers, farming_fraction, fallow, params),
        available_area,
        mode,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandRequirement {
    pub hectares: f64,
    /// The expected yield was zero and the requirement was replaced by
    /// [`LAND_REQUIREMENT_CAP`].
    pub capped: bool,
}

/// Land (ha) needed to feed `occupants` and set aside seed at the given yield.
pub fn land_requirement(
    occupants: usize,
    expected_yield: f64,
    fallow: bool,
    params: &ModelParameters,
) -> LandRequirement {
    if occupants == 0 {
        return LandRequirement {
            hectares: 0.0,
            capped: false,
        };
    }
    if !(expected_yield > 0.0) {
        return LandRequirement {
            hectares: LAND_REQUIREMENT_CAP,
            capped: true,
        };
    }
    let fallow_factor = if fallow { 2.0 } else { 1.0 };
    let hectares = params.wheat_req * occupants as f64 * (1.0 + params.seed_proportion)
        / expected_yield
        * fallow_factor;
    LandRequirement {
        hectares: hectares.min(LAND_REQUIREMENT_CAP),
        capped: hectares >= LAND_REQUIREMENT_CAP,
    }
}

/// Multiplier on fertility for a household food ratio.
pub fn fertility_reduction(food_ratio: f64, params: &ModelParameters) -> f64 {
    gamma_response(food_ratio, params.fertility_curve)
}

/// Multiplier on survival for a household food ratio.
pub fn survival_reduction(food_ratio: f64, params: &ModelParameters) -> f64 {
    gamma_response(food_ratio, params.survival_curve)
}

/// Gamma CDF of the food ratio, rescaled to reach exactly 1 at a food ratio
/// of 1. Non-decreasing, 0 at no food.
pub fn gamma_response(food_ratio: f64, curve: CurveShape) -> f64 {
    if !(food_ratio > 0.0) {
        return 0.0;
    }
    if food_ratio >= 1.0 {
        return 1.0;
    }
    let full = regularized_lower_gamma(curve.shape, 1.0 / curve.scale);
    if !(full > 0.0) {
        return 1.0;
    }
    (regularized_lower_gamma(curve.shape, food_ratio / curve.scale) / full).clamp(0.0, 1.0)
}

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let t = x + 7.5;
        let series = LANCZOS[1..]
            .iter()
            .enumerate()
            .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + (i + 1) as f64));
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
    }
}

/// Regularized lower incomplete gamma function P(a, x).
fn regularized_lower_gamma(a: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 500;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    if !(x > 0.0) {
        return 0.0;
    }
    let log_prefactor = -x + a * x.ln() - ln_gamma(a);
    if x < a + 1.0 {
        let mut denom = a;
        let mut term = 1.0 / a;
        let mut sum = term;
        for _ in 0..MAX_ITER {
            denom += 1.0;
            term *= x / denom;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        (sum * log_prefactor.exp()).clamp(0.0, 1.0)
    } else {
        // Lentz continued fraction for Q(a, x)
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / TINY;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < TINY {
                d = TINY;
            }
            c = b + an / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        (1.0 - log_prefactor.exp() * h).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ModelParameters {
        ModelParameters::default()
    }

    #[test]
    fn climatic_yield_is_zero_without_rain() {
        let p = params();
        assert_eq!(climatic_yield(0.0, &p), 0.0);
        assert_eq!(climatic_yield(-3.0, &p), 0.0);
        assert_eq!(climatic_yield(f64::NAN, &p), 0.0);
        assert!((climatic_yield(1.0, &p) - p.max_yield * p.yield_b).abs() < 1e-9);
    }

    #[test]
    fn climatic_yield_never_goes_negative_in_deep_drought() {
        let p = params();
        let threshold = (-p.yield_b / p.yield_a).exp();
        assert_eq!(climatic_yield(threshold * 0.5, &p), 0.0);
        assert!(climatic_yield(threshold * 2.0, &p) > 0.0);
    }

    #[test]
    fn yield_reduction_guards_barren_soil() {
        assert_eq!(yield_reduction(100.0, 800.0, 0.2), 800.0);
        assert_eq!(yield_reduction(0.0, 800.0, 0.2), 0.0);
        let reduced = yield_reduction(50.0, 800.0, 0.2);
        assert!(reduced > 0.0 && reduced < 800.0);
    }

    #[test]
    fn infrastructure_is_continuous_and_bounded() {
        let (psi, eps, cap) = (0.5, 0.1, 1.0);
        let h = 1e-9;
        for breakpoint in [psi - eps, psi + eps] {
            let below = infrastructure_performance(breakpoint - h, psi, eps, cap);
            let at = infrastructure_performance(breakpoint, psi, eps, cap);
            let above = infrastructure_performance(breakpoint + h, psi, eps, cap);
            assert!((below - at).abs() < 1e-6);
            assert!((above - at).abs() < 1e-6);
        }

        let mut last = 0.0;
        for i in 0..=1000 {
            let m = i as f64 / 1000.0;
            let value = infrastructure_performance(m, psi, eps, cap);
            assert!((0.0..=cap).contains(&value));
            assert!(value >= last);
            last = value;
        }
        assert!((infrastructure_performance(psi, psi, eps, cap) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_width_ramp_is_a_step() {
        assert_eq!(infrastructure_performance(0.49, 0.5, 0.0, 2.0), 0.0);
        assert_eq!(infrastructure_performance(0.51, 0.5, 0.0, 2.0), 2.0);
    }

    #[test]
    fn asymptote_is_increasing_and_bounded() {
        let area = 3.5;
        assert_eq!(constrain_land(0.0, area, LandConstraintMode::Asymptote), 0.0);
        let mut last = 0.0;
        for i in 1..=200 {
            let potential = i as f64 * 0.05;
            let land = constrain_land(potential, area, LandConstraintMode::Asymptote);
            assert!(land > last, "not increasing at {potential}");
            assert!(land < area);
            assert!(land <= potential);
            last = land;
        }
        assert_eq!(constrain_land(5.0, 0.0, LandConstraintMode::Asymptote), 0.0);
    }

    #[test]
    fn step_and_unlimited_modes() {
        assert_eq!(constrain_land(5.0, 2.0, LandConstraintMode::Step), 2.0);
        assert_eq!(constrain_land(1.0, 2.0, LandConstraintMode::Step), 1.0);
        assert_eq!(constrain_land(5.0, 2.0, LandConstraintMode::Unlimited), 5.0);
    }

    #[test]
    fn potential_land_scales_with_labor_and_fallow() {
        let p = params();
        let base = potential_land(2, 0.5, false, &p);
        assert!((base - p.max_labor * 0.5 * 2.0 / p.labor_per_hectare).abs() < 1e-12);
        assert!((potential_land(2, 0.5, true, &p) - 2.0 * base).abs() < 1e-12);
        assert_eq!(potential_land(0, 1.0, true, &p), 0.0);
    }

    #[test]
    fn land_requirement_uses_cap_when_harvest_fails() {
        let p = params();
        let failed = land_requirement(4, 0.0, true, &p);
        assert!(failed.capped);
        assert_eq!(failed.hectares, LAND_REQUIREMENT_CAP);

        let empty = land_requirement(0, 0.0, true, &p);
        assert_eq!(empty.hectares, 0.0);
        assert!(!empty.capped);

        let normal = land_requirement(4, 800.0, true, &p);
        let expected = p.wheat_req * 4.0 * (1.0 + p.seed_proportion) / 800.0 * 2.0;
        assert!((normal.hectares - expected).abs() < 1e-9);
        assert!(!normal.capped);
    }

    #[test]
    fn incomplete_gamma_matches_closed_form() {
        // Integer shape: P(3, x) = 1 - e^{-x} (1 + x + x^2 / 2)
        for x in [0.3, 1.0, 2.5, 4.0, 9.0] {
            let expected = 1.0 - (-x as f64).exp() * (1.0 + x + x * x / 2.0);
            assert!((regularized_lower_gamma(3.0, x) - expected).abs() < 1e-10);
        }
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn food_responses_are_monotone_and_normalized() {
        let p = params();
        assert_eq!(fertility_reduction(1.0, &p), 1.0);
        assert_eq!(survival_reduction(1.0, &p), 1.0);
        assert_eq!(fertility_reduction(0.0, &p), 0.0);
        let mut last_f = 0.0;
        let mut last_s = 0.0;
        for i in 0..=100 {
            let ratio = i as f64 / 100.0;
            let f = fertility_reduction(ratio, &p);
            let s = survival_reduction(ratio, &p);
            assert!((0.0..=1.0).contains(&f) && (0.0..=1.0).contains(&s));
            assert!(f >= last_f && s >= last_s);
            last_f = f;
            last_s = s;
        }
        // survival holds up far longer than fertility under shortage
        assert!(survival_reduction(0.5, &p) > fertility_reduction(0.5, &p));
    }
}
