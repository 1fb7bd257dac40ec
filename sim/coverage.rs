//! # Coverage Assessment
//!
//! Given the studentized mean-difference statistic and a bracket `(-a, +a)`, the
//! estimated inner and outer regions are
//!
//! ```text
//! FcHat+ = { stat >= +a }        FcHat- = { stat >= -a }
//! ```
//!
//! A realization covers the true set `Fc` when `FcHat+ ⊆ Fc ⊆ FcHat-` holds at every
//! voxel. The interpolated check asks the same question only at the sub-voxel
//! crossings of the true boundary, where the statistic must lie inside the bracket;
//! it is always conjoined with the voxelwise check.

use crate::interpolate::WeightedBoundary;
use crate::threshold::ThresholdBracket;
use ndarray::{Array1, Array2, ArrayView2, Zip};

/// Per-field statistic `(meanHat - c) / (sdHat * tau)` with `tau = 1 / sqrt(n_subjects)`.
///
/// A voxel with zero standard deviation maps to `+∞`, `-∞` or `0` following the sign
/// of `meanHat - c`.
pub fn studentized_mean_statistic(
    mean: ArrayView2<f64>,
    sd: ArrayView2<f64>,
    threshold: f64,
    n_subjects: usize,
) -> Array2<f64> {
    let tau = 1.0 / (n_subjects as f64).sqrt();
    Zip::from(mean).and(sd).map_collect(|&m, &s| {
        let excess = m - threshold;
        if s > 0.0 {
            excess / (s * tau)
        } else if excess > 0.0 {
            f64::INFINITY
        } else if excess < 0.0 {
            f64::NEG_INFINITY
        } else {
            0.0
        }
    })
}

/// Pointwise minimum of the two per-field statistics, the statistic for the intersection.
pub fn intersection_statistic(first: ArrayView2<f64>, second: ArrayView2<f64>) -> Array2<f64> {
    Zip::from(first)
        .and(second)
        .map_collect(|&a, &b| a.min(b))
}

/// `FcHat+ ⊆ Fc ⊆ FcHat-` over the whole lattice.
pub fn voxelwise_success(
    true_set: ArrayView2<bool>,
    statistic: ArrayView2<f64>,
    bracket: ThresholdBracket,
) -> bool {
    assert_eq!(
        true_set.dim(),
        statistic.dim(),
        "True set and statistic must share the lattice"
    );
    let mut violated = false;
    Zip::from(true_set).and(statistic).for_each(|&inside, &stat| {
        let upper_region = stat >= bracket.upper;
        let lower_region = stat >= bracket.lower;
        violated |= (upper_region && !inside) || (inside && !lower_region);
    });
    !violated
}

/// The interpolated true-boundary statistic lies inside the bracket everywhere.
/// Vacuously true on an empty boundary.
pub fn interpolated_success(boundary_statistic: &Array1<f64>, bracket: ThresholdBracket) -> bool {
    boundary_statistic.iter().all(|&value| bracket.contains(value))
}

/// Success indicators of one realization and boundary variant, one entry per probability.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuccessRow {
    voxelwise: Vec<bool>,
    interpolated: Vec<bool>,
}

impl SuccessRow {
    /// Combines the raw indicators; interpolated success additionally requires
    /// voxelwise success at the same probability.
    pub fn conjoin(voxelwise: Vec<bool>, interpolated_raw: Vec<bool>) -> Self {
        assert_eq!(
            voxelwise.len(),
            interpolated_raw.len(),
            "One indicator per probability is required for both assessments"
        );
        let interpolated = voxelwise
            .iter()
            .zip(&interpolated_raw)
            .map(|(&v, &i)| v && i)
            .collect();
        Self {
            voxelwise,
            interpolated,
        }
    }

    pub fn voxelwise(&self) -> &[bool] {
        &self.voxelwise
    }

    pub fn interpolated(&self) -> &[bool] {
        &self.interpolated
    }

    pub fn len(&self) -> usize {
        self.voxelwise.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxelwise.is_empty()
    }
}

/// The quantities the assessor needs from one realization.
#[derive(Debug, Clone, Copy)]
pub struct CoverageInputs<'a> {
    /// The true intersection `Fc`.
    pub true_set: ArrayView2<'a, bool>,
    /// `min(stat_1, stat_2)` over the lattice.
    pub statistic: ArrayView2<'a, f64>,
    /// The true `Fc` boundary with the crossing weights of `min(mu_1, mu_2)`.
    pub true_boundary: &'a WeightedBoundary,
}

impl CoverageInputs<'_> {
    /// Checks every bracket both ways.
    pub fn assess(&self, brackets: &[ThresholdBracket]) -> SuccessRow {
        let boundary_statistic = self.true_boundary.interpolate_field(self.statistic);
        let voxelwise = brackets
            .iter()
            .map(|&bracket| voxelwise_success(self.true_set, self.statistic, bracket))
            .collect();
        let interpolated = brackets
            .iter()
            .map(|&bracket| interpolated_success(&boundary_statistic, bracket))
            .collect();
        SuccessRow::conjoin(voxelwise, interpolated)
    }
}
