// ========================================================================================
//                         Experiment driver: many realizations
// ========================================================================================

use crate::config::{ConfigError, ExperimentConfig};
use crate::fields::{FieldGenerator, GaussianFieldGenerator};
use crate::io::PersistenceError;
use crate::progress::{ExperimentStage, ProgressObserver};
use crate::realization::{
    RealizationData, RealizationOutcome, RealizationSettings, SetDiagnostics,
    simulate_realization,
};
use crate::threshold::ThresholdError;
use crate::types::{Assessment, BoundaryVariant, ByVariant, FieldPair};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Any failure of a run, from reading the configuration to writing the tables.
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Invalid experiment configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Threshold estimation failed: {0}")]
    Threshold(#[from] ThresholdError),
    #[error("Failed to persist results: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Odd 64-bit constant spreading consecutive realization indices across the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// The random stream of one realization, fixed by the base seed and its index alone.
pub fn realization_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add((index as u64).wrapping_mul(SEED_STRIDE)))
}

/// Success indicators of one boundary variant, shaped `[n_reals, n_probabilities]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessTables {
    pub voxelwise: Array2<bool>,
    pub interpolated: Array2<bool>,
}

impl SuccessTables {
    pub fn get(&self, assessment: Assessment) -> ArrayView2<'_, bool> {
        match assessment {
            Assessment::Voxelwise => self.voxelwise.view(),
            Assessment::Interpolated => self.interpolated.view(),
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct ExperimentResults {
    pub probabilities: Vec<f64>,
    pub success: ByVariant<SuccessTables>,
    pub diagnostics: Vec<SetDiagnostics>,
}

impl ExperimentResults {
    pub(crate) fn from_outcomes(probabilities: Vec<f64>, outcomes: &[RealizationOutcome]) -> Self {
        let shape = (outcomes.len(), probabilities.len());
        let table = |variant: BoundaryVariant, assessment: Assessment| {
            Array2::from_shape_fn(shape, |(r, j)| {
                let row = outcomes[r].success.get(variant);
                match assessment {
                    Assessment::Voxelwise => row.voxelwise()[j],
                    Assessment::Interpolated => row.interpolated()[j],
                }
            })
        };
        let tables = |variant| SuccessTables {
            voxelwise: table(variant, Assessment::Voxelwise),
            interpolated: table(variant, Assessment::Interpolated),
        };

        Self {
            success: ByVariant {
                true_boundary: tables(BoundaryVariant::True),
                estimated_boundary: tables(BoundaryVariant::Estimated),
            },
            diagnostics: outcomes.iter().map(|o| o.diagnostics).collect(),
            probabilities,
        }
    }

    pub fn n_reals(&self) -> usize {
        self.diagnostics.len()
    }

    /// Realizations whose bootstrap produced an infinite threshold, so that they count
    /// as successes whatever the data.
    pub fn degenerate_realizations(&self, variant: BoundaryVariant) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.is_degenerate(variant))
            .count()
    }

    pub fn table(&self, variant: BoundaryVariant, assessment: Assessment) -> ArrayView2<'_, bool> {
        self.success.get(variant).get(assessment)
    }

    /// Empirical coverage per probability: the fraction of successful realizations.
    pub fn coverage(&self, variant: BoundaryVariant, assessment: Assessment) -> Array1<f64> {
        coverage_of(self.table(variant, assessment).mapv(f64::from).view())
    }
}

/// Column means of a `[n_reals, n_probabilities]` table of 0/1 values.
pub fn coverage_of(table: ArrayView2<f64>) -> Array1<f64> {
    table
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(table.ncols()))
}

/// A validated experiment, ready to run.
pub struct CoverageExperiment {
    config: ExperimentConfig,
    generators: FieldPair<GaussianFieldGenerator>,
    settings: RealizationSettings,
}

impl CoverageExperiment {
    pub fn new(config: ExperimentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let generators = config.generators();
        let settings = config.realization_settings();
        Ok(Self {
            config,
            generators,
            settings,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Draws the true means and subject data of one realization.
    fn draw(&self, rng: &mut StdRng) -> RealizationData {
        let n_sub = self.config.n_sub;
        RealizationData {
            means: FieldPair::new(
                self.generators.first.mean().to_owned(),
                self.generators.second.mean().to_owned(),
            ),
            data: FieldPair::new(
                self.generators.first.sample(n_sub, rng),
                self.generators.second.sample(n_sub, rng),
            ),
        }
    }

    /// Runs realization `index` on its own random stream.
    pub fn realization(&self, index: usize) -> Result<RealizationOutcome, ThresholdError> {
        let mut rng = realization_rng(self.config.seed, index);
        let input = self.draw(&mut rng);
        let outcome = simulate_realization(&input, &self.settings, &mut rng)?;
        log::debug!(
            "Realization {index}: true-boundary thresholds {:?}",
            outcome
                .brackets
                .true_boundary
                .iter()
                .map(|b| b.half_width())
                .collect::<Vec<_>>()
        );
        Ok(outcome)
    }

    /// Runs every realization in parallel on the current rayon pool.
    pub fn run(
        &self,
        observer: &dyn ProgressObserver,
    ) -> Result<ExperimentResults, ExperimentError> {
        let n_reals = self.config.n_reals;
        log::info!(
            "Running {n_reals} realizations with {} subjects and {} bootstrap draws on {} threads",
            self.config.n_sub,
            self.config.n_boot,
            rayon::current_num_threads()
        );
        let start = Instant::now();

        observer.on_stage_start(ExperimentStage::Realizations, n_reals);
        let completed = AtomicUsize::new(0);
        let outcomes = (0..n_reals)
            .into_par_iter()
            .map(|index| {
                let outcome = self.realization(index);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                observer.on_stage_advance(ExperimentStage::Realizations, done);
                outcome
            })
            .collect::<Result<Vec<_>, _>>()?;
        observer.on_stage_finish(ExperimentStage::Realizations);

        let results =
            ExperimentResults::from_outcomes(self.settings.probabilities.clone(), &outcomes);
        log::info!("Finished {n_reals} realizations in {:.2?}", start.elapsed());
        for variant in BoundaryVariant::ALL {
            let degenerate = results.degenerate_realizations(variant);
            if degenerate > 0 {
                log::warn!(
                    "{degenerate} of {n_reals} realizations had infinite thresholds on the {variant}"
                );
            }
            for assessment in Assessment::ALL {
                log::debug!(
                    "Coverage on the {variant} ({assessment:?}): {:?}",
                    results.coverage(variant, assessment)
                );
            }
        }
        Ok(results)
    }
}
