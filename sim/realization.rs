//! One Monte Carlo realization: from noisy subject data and the true means to the
//! four success indicators per probability.

use crate::bootstrap::{BootstrapTarget, MultiplierBootstrap};
use crate::coverage::{
    CoverageInputs, SuccessRow, intersection_statistic, studentized_mean_statistic,
};
use crate::interpolate::WeightedBoundary;
use crate::threshold::{ThresholdBracket, ThresholdError, estimate_brackets};
use crate::types::{BoundaryVariant, ByVariant, FieldPair};
use ndarray::{Array2, Array3, ArrayView2, Axis, RemoveAxis, Zip};
use rand::Rng;

/// Parameters shared by every realization of an experiment.
#[derive(Debug, Clone)]
pub struct RealizationSettings {
    pub threshold: f64,
    pub n_boot: usize,
    pub probabilities: Vec<f64>,
}

/// Inputs of one realization: the true mean of each field and its noisy subject data,
/// shaped `[n_subjects, rows, cols]`.
#[derive(Debug, Clone)]
pub struct RealizationData {
    pub means: FieldPair<Array2<f64>>,
    pub data: FieldPair<Array3<f64>>,
}

impl RealizationData {
    pub fn n_subjects(&self) -> usize {
        self.data.first.len_of(Axis(0))
    }

    /// The same realization with field 1 and field 2 relabelled.
    pub fn swapped(self) -> Self {
        Self {
            means: self.means.swapped(),
            data: self.data.swapped(),
        }
    }
}

/// Sizes of the true and estimated excursion sets and boundaries of one realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetDiagnostics {
    pub ac1: usize,
    pub ac2: usize,
    pub fc: usize,
    pub gc: usize,
    pub ac1_hat: usize,
    pub ac2_hat: usize,
    pub fc_hat: usize,
    pub fc_boundary_edges: usize,
    pub fc_hat_boundary_edges: usize,
    /// Probabilities whose threshold came out infinite on the true boundary.
    pub infinite_true_thresholds: usize,
    /// Probabilities whose threshold came out infinite on the estimated boundary.
    pub infinite_est_thresholds: usize,
}

impl SetDiagnostics {
    pub fn infinite_thresholds(&self, variant: BoundaryVariant) -> usize {
        match variant {
            BoundaryVariant::True => self.infinite_true_thresholds,
            BoundaryVariant::Estimated => self.infinite_est_thresholds,
        }
    }

    /// Whether a degenerate bootstrap made this realization succeed trivially.
    pub fn is_degenerate(&self, variant: BoundaryVariant) -> bool {
        self.infinite_thresholds(variant) > 0
    }
}

/// Everything a realization reports.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizationOutcome {
    pub success: ByVariant<SuccessRow>,
    pub brackets: ByVariant<Vec<ThresholdBracket>>,
    pub diagnostics: SetDiagnostics,
}

fn pointwise(
    first: ArrayView2<f64>,
    second: ArrayView2<f64>,
    f: fn(f64, f64) -> f64,
) -> Array2<f64> {
    Zip::from(first).and(second).map_collect(|&a, &b| f(a, b))
}

fn excursion_size(field: ArrayView2<f64>, threshold: f64) -> usize {
    field.iter().filter(|&&v| v > threshold).count()
}

/// Runs the full per-realization pipeline.
pub fn simulate_realization<R: Rng + ?Sized>(
    input: &RealizationData,
    settings: &RealizationSettings,
    rng: &mut R,
) -> Result<RealizationOutcome, ThresholdError> {
    let c = settings.threshold;
    let n_subjects = input.n_subjects();
    let data = input.data.as_ref().map(|d| d.view());
    let means = input.means.as_ref().map(|m| m.view());

    // Sample moments; the standard deviation is the population estimator.
    let mean_hat = data.map(|d| {
        d.mean_axis(Axis(0))
            .unwrap_or_else(|| Array2::zeros(d.raw_dim().remove_axis(Axis(0))))
    });
    let sd_hat = data.map(|d| d.std_axis(Axis(0), 0.0));
    let mean_hat_view = mean_hat.as_ref().map(|m| m.view());
    let sd_hat_view = sd_hat.as_ref().map(|s| s.view());

    let true_min = pointwise(means.first, means.second, f64::min);
    let true_max = pointwise(means.first, means.second, f64::max);
    let hat_min = pointwise(mean_hat_view.first, mean_hat_view.second, f64::min);

    let fc_boundary = WeightedBoundary::of_field(true_min.view(), c);
    let fc_hat_boundary = WeightedBoundary::of_field(hat_min.view(), c);

    let mut diagnostics = SetDiagnostics {
        ac1: excursion_size(means.first, c),
        ac2: excursion_size(means.second, c),
        fc: excursion_size(true_min.view(), c),
        gc: excursion_size(true_max.view(), c),
        ac1_hat: excursion_size(mean_hat_view.first, c),
        ac2_hat: excursion_size(mean_hat_view.second, c),
        fc_hat: excursion_size(hat_min.view(), c),
        fc_boundary_edges: fc_boundary.len(),
        fc_hat_boundary_edges: fc_hat_boundary.len(),
        ..SetDiagnostics::default()
    };

    let targets = ByVariant {
        true_boundary: BootstrapTarget::gather(&fc_boundary, data, mean_hat_view, sd_hat_view),
        estimated_boundary: BootstrapTarget::gather(
            &fc_hat_boundary,
            data,
            mean_hat_view,
            sd_hat_view,
        ),
    };
    let replicates = MultiplierBootstrap::new(settings.n_boot).run(&targets, rng);

    let brackets = ByVariant {
        true_boundary: estimate_brackets(&replicates.true_boundary, &settings.probabilities)?,
        estimated_boundary: estimate_brackets(
            &replicates.estimated_boundary,
            &settings.probabilities,
        )?,
    };
    let infinite = |variant| {
        brackets
            .get(variant)
            .iter()
            .filter(|b| b.upper.is_infinite())
            .count()
    };
    diagnostics.infinite_true_thresholds = infinite(BoundaryVariant::True);
    diagnostics.infinite_est_thresholds = infinite(BoundaryVariant::Estimated);
    for variant in BoundaryVariant::ALL {
        if diagnostics.is_degenerate(variant) {
            log::warn!(
                "Degenerate bootstrap standard deviation on the {variant}; {} of {} thresholds are infinite",
                diagnostics.infinite_thresholds(variant),
                settings.probabilities.len()
            );
        }
    }
    log::debug!("Excursion sets: {diagnostics:?}");

    let stat = intersection_statistic(
        studentized_mean_statistic(mean_hat_view.first, sd_hat_view.first, c, n_subjects).view(),
        studentized_mean_statistic(mean_hat_view.second, sd_hat_view.second, c, n_subjects).view(),
    );
    let true_set = true_min.mapv(|v| v > c);
    let inputs = CoverageInputs {
        true_set: true_set.view(),
        statistic: stat.view(),
        true_boundary: &fc_boundary,
    };

    let success = ByVariant {
        true_boundary: inputs.assess(&brackets.true_boundary),
        estimated_boundary: inputs.assess(&brackets.estimated_boundary),
    };

    Ok(RealizationOutcome {
        success,
        brackets,
        diagnostics,
    })
}
