//! Independent replicate runs of a scenario.
//!
//! Replicates share nothing mutable and run on the rayon pool. A replicate
//! that fails or panics is reported in its slot of the [`ReplicateSet`]
//! without disturbing the others.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    engine::{EngineBuilder, EngineSettings},
    error::ReplicateError,
    rng::{derive_seed, StreamId},
    scenario::Scenario,
    snapshot::TimeSeries,
};

const REPLICATE_STREAM: StreamId = 3;

/// Seed of replicate `replicate` of a run seeded with `base`.
pub fn replicate_seed(base: u64, replicate: u32) -> u64 {
    derive_seed(base, REPLICATE_STREAM, replicate as u64, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateSummary {
    pub final_population: usize,
    pub peak_population: usize,
    pub mean_population: f64,
    /// Mean over steps with at least one occupied household.
    pub mean_food_ratio: Option<f64>,
    /// First step at which no one was left.
    pub extinction_step: Option<u64>,
}

impl ReplicateSummary {
    pub fn from_series(series: &TimeSeries) -> Self {
        let populations = series.population_trajectory();
        let food: Vec<f64> = series.food_ratio_trajectory().into_iter().flatten().collect();
        Self {
            final_population: populations.last().copied().unwrap_or(0),
            peak_population: populations.iter().copied().max().unwrap_or(0),
            mean_population: mean(populations.iter().map(|&p| p as f64)).unwrap_or(0.0),
            mean_food_ratio: mean(food.into_iter()),
            extinction_step: series
                .snapshots
                .iter()
                .find(|s| s.total_population() == 0)
                .map(|s| s.step),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateRun {
    pub replicate: u32,
    pub seed: u64,
    pub summary: ReplicateSummary,
    pub series: TimeSeries,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateSet {
    pub scenario: String,
    pub runs: BTreeMap<u32, Result<ReplicateRun, ReplicateError>>,
}

impl ReplicateSet {
    pub fn successes(&self) -> impl Iterator<Item = &ReplicateRun> {
        self.runs.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReplicateError> {
        self.runs.values().filter_map(|r| r.as_ref().err())
    }

    pub fn get(&self, replicate: u32) -> Option<&Result<ReplicateRun, ReplicateError>> {
        self.runs.get(&replicate)
    }

    /// Mean population at each step across successful replicates.
    pub fn mean_population_trajectory(&self) -> Vec<f64> {
        let trajectories: Vec<Vec<usize>> = self
            .successes()
            .map(|run| run.series.population_trajectory())
            .collect();
        let steps = trajectories.iter().map(Vec::len).min().unwrap_or(0);
        (0..steps)
            .map(|step| {
                mean(trajectories.iter().map(|t| t[step] as f64)).unwrap_or(0.0)
            })
            .collect()
    }

    /// Mean food ratio at each step across replicates that still have
    /// occupants at that step.
    pub fn mean_food_ratio_trajectory(&self) -> Vec<Option<f64>> {
        let trajectories: Vec<Vec<Option<f64>>> = self
            .successes()
            .map(|run| run.series.food_ratio_trajectory())
            .collect();
        let steps = trajectories.iter().map(Vec::len).min().unwrap_or(0);
        (0..steps)
            .map(|step| mean(trajectories.iter().filter_map(|t| t[step])))
            .collect()
    }

    pub fn summaries(&self) -> BTreeMap<u32, ReplicateSummary> {
        self.successes()
            .map(|run| (run.replicate, run.summary.clone()))
            .collect()
    }

    /// Summaries, failures and mean trajectories; full series only when
    /// `with_series` is set.
    pub fn report(&self, with_series: bool) -> ReplicateReport {
        ReplicateReport {
            scenario: self.scenario.clone(),
            summaries: self.summaries(),
            failures: self
                .failures()
                .map(|err| (err.replicate(), err.to_string()))
                .collect(),
            mean_population: self.mean_population_trajectory(),
            mean_food_ratio: self.mean_food_ratio_trajectory(),
            series: with_series.then(|| {
                self.successes()
                    .map(|run| (run.replicate, run.series.clone()))
                    .collect()
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicateReport {
    pub scenario: String,
    pub summaries: BTreeMap<u32, ReplicateSummary>,
    pub failures: BTreeMap<u32, String>,
    pub mean_population: Vec<f64>,
    pub mean_food_ratio: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<BTreeMap<u32, TimeSeries>>,
}

impl ReplicateReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Runs `count` replicates of `job` in parallel, each with its own seed
/// derived from `base_seed`.
pub fn run_isolated<F>(scenario: &str, base_seed: u64, count: u32, job: F) -> ReplicateSet
where
    F: Fn(u32, u64) -> Result<TimeSeries> + Sync,
{
    let runs = (0..count)
        .into_par_iter()
        .map(|replicate| {
            let seed = replicate_seed(base_seed, replicate);
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(replicate, seed))) {
                Ok(Ok(series)) => Ok(ReplicateRun {
                    replicate,
                    seed,
                    summary: ReplicateSummary::from_series(&series),
                    series,
                }),
                Ok(Err(err)) => Err(ReplicateError::Failed {
                    replicate,
                    message: format!("{err:#}"),
                }),
                Err(payload) => Err(ReplicateError::Panicked {
                    replicate,
                    message: panic_message(payload.as_ref()),
                }),
            };
            match &outcome {
                Ok(run) => info!(
                    replicate,
                    seed,
                    final_population = run.summary.final_population,
                    "replicate finished"
                ),
                Err(err) => error!(replicate, seed, %err, "replicate failed"),
            }
            (replicate, outcome)
        })
        .collect();
    ReplicateSet {
        scenario: scenario.to_string(),
        runs,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ReplicateOptions {
    pub replicates: u32,
    pub steps: u64,
    pub base_seed: u64,
    pub snapshot_interval: u64,
    pub snapshot_dir: PathBuf,
}

impl ReplicateOptions {
    pub fn for_scenario(scenario: &Scenario, replicates: u32) -> Self {
        Self {
            replicates,
            steps: scenario.steps,
            base_seed: scenario.seed,
            snapshot_interval: 0,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

/// Runs one replicate of `scenario` to completion.
pub fn run_scenario(scenario: &Scenario, seed: u64, steps: u64) -> Result<TimeSeries> {
    run_with_settings(scenario, EngineSettings::new(scenario.name.clone(), seed), steps)
}

fn run_with_settings(scenario: &Scenario, settings: EngineSettings, steps: u64) -> Result<TimeSeries> {
    let mut world = scenario.build_world(settings.seed)?;
    let mut engine = EngineBuilder::new(settings).with_standard_systems().build();
    Ok(engine.run(&mut world, steps)?)
}

pub fn run_replicates(scenario: &Scenario, options: &ReplicateOptions) -> ReplicateSet {
    info!(
        scenario = %scenario.name,
        replicates = options.replicates,
        steps = options.steps,
        "running replicates"
    );
    run_isolated(
        &scenario.name,
        options.base_seed,
        options.replicates,
        |replicate, seed| {
            let settings = EngineSettings {
                scenario_name: format!("{}/replicate_{replicate:03}", scenario.name),
                seed,
                snapshot_interval: options.snapshot_interval,
                snapshot_dir: options.snapshot_dir.clone(),
            };
            run_with_settings(scenario, settings, options.steps)
        },
    )
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::snapshot::{HouseholdSnapshot, PopulationSnapshot};

    fn series(populations: &[usize]) -> TimeSeries {
        let mut series = TimeSeries::new("test", 0);
        for (step, &occupants) in populations.iter().enumerate() {
            series.push(PopulationSnapshot {
                step: step as u64,
                settlements: Vec::new(),
                households: vec![HouseholdSnapshot {
                    id: 0,
                    settlement: 0,
                    occupants,
                    laborers: occupants,
                    land: 0.0,
                    storage: 0.0,
                    yield_memory: 0.0,
                    farming_fraction: 1.0,
                    food_ratio: 0.5,
                }],
            });
        }
        series
    }

    #[test]
    fn summary_tracks_extinction() {
        let summary = ReplicateSummary::from_series(&series(&[4, 6, 2, 0, 0]));
        assert_eq!(summary.final_population, 0);
        assert_eq!(summary.peak_population, 6);
        assert_eq!(summary.mean_population, 12.0 / 5.0);
        assert_eq!(summary.mean_food_ratio, Some(0.5));
        assert_eq!(summary.extinction_step, Some(3));
    }

    #[test]
    fn failing_replicates_do_not_stop_siblings() {
        let set = run_isolated("test", 1, 4, |replicate, _seed| match replicate {
            1 => panic!("replicate blew up"),
            2 => Err(anyhow!("bad state")),
            _ => Ok(series(&[2, 3])),
        });
        assert_eq!(set.runs.len(), 4);
        assert_eq!(set.successes().count(), 2);
        assert!(matches!(
            set.get(1),
            Some(Err(ReplicateError::Panicked { message, .. })) if message == "replicate blew up"
        ));
        assert!(matches!(
            set.get(2),
            Some(Err(ReplicateError::Failed { replicate: 2, .. }))
        ));
        assert_eq!(set.mean_population_trajectory(), vec![2.0, 3.0]);

        let report = set.report(false);
        assert_eq!(report.summaries.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[&2].contains("bad state"));
    }

    #[test]
    fn replicate_seeds_are_distinct_and_stable() {
        assert_eq!(replicate_seed(7, 0), replicate_seed(7, 0));
        assert_ne!(replicate_seed(7, 0), replicate_seed(7, 1));
    }
}
