//! Seeding the initial occupants of a household.

use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vital_rates::VitalRates;
use crate::world::Individual;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeDistribution {
    /// Every occupant has the same age.
    Fixed(u16),
    /// Ages drawn uniformly from the inclusive range.
    Uniform { min: u16, max: u16 },
    /// Ages drawn in proportion to survivorship from birth, i.e. the age
    /// structure of a stationary population under the vital rates.
    Stationary,
}

impl Default for AgeDistribution {
    fn default() -> Self {
        AgeDistribution::Fixed(25)
    }
}

impl AgeDistribution {
    pub fn validate(&self, rates: &VitalRates) -> Result<(), ConfigError> {
        let max_age = rates.max_age();
        match *self {
            AgeDistribution::Fixed(age) if age > max_age => Err(ConfigError::InvalidScenario(
                format!("fixed age {age} exceeds the oldest tabulated age {max_age}"),
            )),
            AgeDistribution::Uniform { min, max } if min > max || max > max_age => {
                Err(ConfigError::InvalidScenario(format!(
                    "uniform ages [{min}, {max}] must be ordered and within [0, {max_age}]"
                )))
            }
            AgeDistribution::Stationary if rates.survivorship().iter().all(|l| *l <= 0.0) => {
                Err(ConfigError::InvalidScenario(
                    "vital rates leave no survivors for a stationary age structure".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Draws `n` individuals with ages from `distribution`.
pub fn create_population<R: Rng + ?Sized>(
    n: usize,
    distribution: &AgeDistribution,
    rates: &VitalRates,
    rng: &mut R,
) -> Result<Vec<Individual>, ConfigError> {
    distribution.validate(rates)?;
    let individuals = match *distribution {
        AgeDistribution::Fixed(age) => vec![Individual::new(age); n],
        AgeDistribution::Uniform { min, max } => (0..n)
            .map(|_| Individual::new(rng.gen_range(min..=max)))
            .collect(),
        AgeDistribution::Stationary => {
            let weights = WeightedIndex::new(rates.survivorship())
                .map_err(|err| ConfigError::InvalidScenario(err.to_string()))?;
            (0..n)
                .map(|_| Individual::new(weights.sample(rng) as u16))
                .collect()
        }
    };
    Ok(individuals)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn fixed_ages_are_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let people = create_population(
            6,
            &AgeDistribution::Fixed(25),
            &VitalRates::pre_industrial(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(people, vec![Individual::new(25); 6]);
    }

    #[test]
    fn uniform_ages_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let people = create_population(
            500,
            &AgeDistribution::Uniform { min: 10, max: 20 },
            &VitalRates::pre_industrial(),
            &mut rng,
        )
        .unwrap();
        assert!(people.iter().all(|p| (10..=20).contains(&p.age)));
    }

    #[test]
    fn stationary_structure_is_young_heavy() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let rates = VitalRates::pre_industrial();
        let people =
            create_population(2000, &AgeDistribution::Stationary, &rates, &mut rng).unwrap();
        let under_20 = people.iter().filter(|p| p.age < 20).count();
        let over_60 = people.iter().filter(|p| p.age >= 60).count();
        assert!(under_20 > over_60);
        assert!(people.iter().all(|p| p.age <= rates.max_age()));
    }

    #[test]
    fn ages_beyond_the_table_are_rejected() {
        let rates = VitalRates::pre_industrial();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(create_population(1, &AgeDistribution::Fixed(200), &rates, &mut rng).is_err());
        assert!(AgeDistribution::Uniform { min: 30, max: 10 }
            .validate(&rates)
            .is_err());
    }

    fn parse(yaml: &str) -> AgeDistribution {
        serde_yaml::with::singleton_map::deserialize(serde_yaml::Deserializer::from_str(yaml))
            .unwrap()
    }

    #[test]
    fn distributions_parse_from_yaml() {
        assert_eq!(parse("fixed: 25"), AgeDistribution::Fixed(25));
        assert_eq!(
            parse("uniform: {min: 0, max: 60}"),
            AgeDistribution::Uniform { min: 0, max: 60 }
        );
        assert_eq!(parse("stationary"), AgeDistribution::Stationary);
    }
}
