//! # Residual Multiplier Bootstrap
//!
//! Each bootstrap draw flips the sign of every subject's standardized residual with a
//! fair coin, forms the studentized sum at both ends of every boundary edge,
//! interpolates it to the sub-voxel crossing and records
//!
//! ```text
//! sup over edges of max(|g1|, |g2|)
//! ```
//!
//! One sign vector is drawn per iteration and shared by both fields, both ends of
//! every edge and both boundary variants, so the joint dependence of the two fields
//! is kept.
//!
//! Only the boundary slices of the residuals are ever materialised. Because every
//! multiplier squares to one, the sum of squared signed residuals does not depend on
//! the draw and is computed once per realization.

use crate::boundary::{BoundaryValues, SubjectBoundaryValues};
use crate::interpolate::{BoundaryWeights, WeightedBoundary};
use crate::types::{BoundaryVariant, ByVariant, FieldPair};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis, Zip};
use rand::Rng;

/// Bootstrap standard deviations at or below this value are degenerate; the
/// studentized statistic at that location is recorded as `+∞`.
pub const DEGENERATE_SD: f64 = 1e-12;

/// Residual of one observation, standardized by the realization's mean and standard
/// deviation. A voxel whose standard deviation is zero has identical observations, so
/// every residual there is zero.
#[inline]
pub fn standardized_residual(value: f64, mean: f64, sd: f64) -> f64 {
    if sd > 0.0 { (value - mean) / sd } else { 0.0 }
}

/// The studentized bootstrap statistic at one location, given the signed sum of the
/// residuals, their (sign-invariant) sum of squares and the number of subjects.
///
/// The standard deviation uses Bessel's correction.
#[inline]
pub fn studentized_sum(signed_sum: f64, sum_sq: f64, n_subjects: f64) -> f64 {
    let centered = (sum_sq - signed_sum * signed_sum / n_subjects).max(0.0);
    let sd = (centered / (n_subjects - 1.0)).sqrt();
    if !(sd > DEGENERATE_SD) {
        return f64::INFINITY;
    }
    let statistic = signed_sum / n_subjects.sqrt() / sd;
    if statistic.is_finite() {
        statistic
    } else {
        f64::INFINITY
    }
}

/// Draws one Rademacher multiplier per subject.
pub fn rademacher_signs<R: Rng + ?Sized>(n_subjects: usize, rng: &mut R) -> Array1<f64> {
    (0..n_subjects)
        .map(|_| if rng.gen_bool(0.5) { 1.0 } else { -1.0 })
        .collect()
}

/// Standardized residuals of one field at both ends of every boundary edge.
#[derive(Debug, Clone)]
pub struct BoundaryResiduals {
    panel: SubjectBoundaryValues,
    inner_sum_sq: Array1<f64>,
    outer_sum_sq: Array1<f64>,
}

impl BoundaryResiduals {
    /// Slices `data` at the boundary and standardizes it with the realization's
    /// voxelwise mean and standard deviation.
    pub fn gather(
        data: ArrayView3<f64>,
        mean: ArrayView2<f64>,
        sd: ArrayView2<f64>,
        weighted: &WeightedBoundary,
    ) -> Self {
        let boundary = &weighted.boundary;
        let mut panel = boundary.subject_values(data);
        let means = boundary.values(mean);
        let sds = boundary.values(sd);

        standardize(&mut panel.inner, &means.inner, &sds.inner);
        standardize(&mut panel.outer, &means.outer, &sds.outer);

        Self::from_panel(panel)
    }

    /// Wraps residuals that are already standardized.
    pub fn from_panel(panel: SubjectBoundaryValues) -> Self {
        let inner_sum_sq = panel.inner.map_axis(Axis(0), |column| column.dot(&column));
        let outer_sum_sq = panel.outer.map_axis(Axis(0), |column| column.dot(&column));
        Self {
            panel,
            inner_sum_sq,
            outer_sum_sq,
        }
    }

    pub fn n_subjects(&self) -> usize {
        self.panel.n_subjects()
    }

    pub fn n_edges(&self) -> usize {
        self.panel.n_edges()
    }

    /// Studentized bootstrap sums at both ends of every edge for one sign vector.
    pub fn studentized(&self, signs: ArrayView1<f64>) -> BoundaryValues {
        BoundaryValues {
            inner: studentize(&self.panel.inner, &self.inner_sum_sq, signs),
            outer: studentize(&self.panel.outer, &self.outer_sum_sq, signs),
        }
    }
}

fn standardize(values: &mut Array2<f64>, mean: &Array1<f64>, sd: &Array1<f64>) {
    for mut row in values.axis_iter_mut(Axis(0)) {
        Zip::from(&mut row)
            .and(mean)
            .and(sd)
            .for_each(|v, &m, &s| *v = standardized_residual(*v, m, s));
    }
}

fn studentize(residuals: &Array2<f64>, sum_sq: &Array1<f64>, signs: ArrayView1<f64>) -> Array1<f64> {
    let n_subjects = residuals.nrows() as f64;
    let signed_sum = residuals.t().dot(&signs);
    Zip::from(&signed_sum)
        .and(sum_sq)
        .map_collect(|&s, &q| studentized_sum(s, q, n_subjects))
}

/// Everything one boundary variant needs inside the bootstrap loop.
#[derive(Debug, Clone)]
pub struct BootstrapTarget {
    weights: BoundaryWeights,
    residuals: FieldPair<BoundaryResiduals>,
}

impl BootstrapTarget {
    pub fn new(weights: BoundaryWeights, residuals: FieldPair<BoundaryResiduals>) -> Self {
        assert_eq!(
            residuals.first.n_edges(),
            weights.len(),
            "Residuals of field 1 were gathered on a different boundary"
        );
        assert_eq!(
            residuals.second.n_edges(),
            weights.len(),
            "Residuals of field 2 were gathered on a different boundary"
        );
        assert_eq!(
            residuals.first.n_subjects(),
            residuals.second.n_subjects(),
            "Both fields must be observed on the same subjects"
        );
        Self { weights, residuals }
    }

    /// Gathers the residuals of both fields along a weighted boundary.
    pub fn gather(
        weighted: &WeightedBoundary,
        data: FieldPair<ArrayView3<f64>>,
        means: FieldPair<ArrayView2<f64>>,
        sds: FieldPair<ArrayView2<f64>>,
    ) -> Self {
        let residuals = FieldPair::new(
            BoundaryResiduals::gather(data.first, means.first, sds.first, weighted),
            BoundaryResiduals::gather(data.second, means.second, sds.second, weighted),
        );
        Self::new(weighted.weights.clone(), residuals)
    }

    pub fn n_subjects(&self) -> usize {
        self.residuals.first.n_subjects()
    }

    pub fn n_edges(&self) -> usize {
        self.weights.len()
    }

    /// One bootstrap replicate: the supremum over the boundary of the larger
    /// absolute interpolated statistic of the two fields. An empty boundary gives `0`.
    pub fn replicate(&self, signs: ArrayView1<f64>) -> f64 {
        let first = self
            .weights
            .interpolate(&self.residuals.first.studentized(signs));
        let second = self
            .weights
            .interpolate(&self.residuals.second.studentized(signs));

        first
            .iter()
            .zip(second.iter())
            .fold(0.0_f64, |sup, (&g1, &g2)| sup.max(g1.abs().max(g2.abs())))
    }
}

/// The bootstrap loop over `n_boot` independent sign-flip draws.
#[derive(Debug, Clone, Copy)]
pub struct MultiplierBootstrap {
    n_boot: usize,
}

impl MultiplierBootstrap {
    pub fn new(n_boot: usize) -> Self {
        Self { n_boot }
    }

    pub fn n_boot(&self) -> usize {
        self.n_boot
    }

    /// Runs the loop for both boundary variants with shared multipliers and returns
    /// the `n_boot` replicates of each.
    pub fn run<R: Rng + ?Sized>(
        &self,
        targets: &ByVariant<BootstrapTarget>,
        rng: &mut R,
    ) -> ByVariant<Vec<f64>> {
        let n_subjects = targets.true_boundary.n_subjects();
        assert_eq!(
            n_subjects,
            targets.estimated_boundary.n_subjects(),
            "Both boundary variants must be bootstrapped over the same subjects"
        );

        let mut replicates = ByVariant {
            true_boundary: Vec::with_capacity(self.n_boot),
            estimated_boundary: Vec::with_capacity(self.n_boot),
        };

        for _ in 0..self.n_boot {
            let signs = rademacher_signs(n_subjects, rng);
            for variant in BoundaryVariant::ALL {
                let value = targets.get(variant).replicate(signs.view());
                replicates.get_mut(variant).push(value);
            }
        }

        replicates
    }
}
