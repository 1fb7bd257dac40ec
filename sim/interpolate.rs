//! Sub-voxel interpolation weights along a boundary.
//!
//! For an edge whose field values straddle the threshold `c`, the weight
//! `w = (c - v_inner) / (v_outer - v_inner)` places the zero crossing of `field - c`
//! on the segment between the two voxels. Any other field is then read at the
//! crossing as `f_inner + w * (f_outer - f_inner)`.

use crate::boundary::{Boundary, BoundaryValues};
use crate::types::EdgePair;
use ndarray::{Array1, ArrayView2};

/// Denominators smaller than this in magnitude are treated as a tie between the two
/// voxels, and the crossing is placed at the midpoint.
pub const WEIGHT_EPSILON: f64 = 1e-12;

/// The interpolation weight for one straddling pair, clamped to `[0, 1]`.
#[inline]
pub fn crossing_weight(pair: EdgePair, threshold: f64) -> f64 {
    let denominator = pair.outer - pair.inner;
    if !denominator.is_finite() || denominator.abs() < WEIGHT_EPSILON {
        return 0.5;
    }
    let weight = (threshold - pair.inner) / denominator;
    if weight.is_nan() {
        return 0.5;
    }
    weight.clamp(0.0, 1.0)
}

/// One weight per boundary edge, in edge order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryWeights {
    weights: Array1<f64>,
}

impl BoundaryWeights {
    /// Weights from the values of the field that defined the boundary.
    pub fn from_values(values: &BoundaryValues, threshold: f64) -> Self {
        let weights = values
            .pairs()
            .map(|pair| crossing_weight(pair, threshold))
            .collect();
        Self { weights }
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Reads another field's boundary values at the sub-voxel crossings.
    pub fn interpolate(&self, values: &BoundaryValues) -> Array1<f64> {
        assert_eq!(
            values.len(),
            self.weights.len(),
            "Boundary values and weights describe different boundaries"
        );
        values
            .pairs()
            .zip(self.weights.iter())
            .map(|(pair, &weight)| pair.interpolate(weight))
            .collect()
    }
}

/// A boundary together with the crossing weights of the field that defined it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBoundary {
    pub boundary: Boundary,
    pub weights: BoundaryWeights,
}

impl WeightedBoundary {
    /// Locates the boundary of `{field > threshold}` and weighs it with the same field.
    pub fn of_field(field: ArrayView2<f64>, threshold: f64) -> Self {
        let boundary = Boundary::locate(field, threshold);
        let weights = BoundaryWeights::from_values(&boundary.values(field), threshold);
        Self { boundary, weights }
    }

    /// Gathers `field` along the boundary and interpolates it to the crossings.
    pub fn interpolate_field(&self, field: ArrayView2<f64>) -> Array1<f64> {
        self.weights.interpolate(&self.boundary.values(field))
    }

    pub fn len(&self) -> usize {
        self.boundary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    #[test]
    fn weight_locates_the_crossing() {
        let pair = EdgePair {
            inner: 3.0,
            outer: 1.0,
        };
        assert_abs_diff_eq!(crossing_weight(pair, 2.0), 0.5);
        assert_abs_diff_eq!(crossing_weight(pair, 2.5), 0.25);
        assert_abs_diff_eq!(crossing_weight(pair, 1.0), 1.0);
    }

    #[test]
    fn ties_fall_back_to_the_midpoint() {
        let pair = EdgePair {
            inner: 2.0,
            outer: 2.0,
        };
        assert_eq!(crossing_weight(pair, 2.0), 0.5);

        let nearly = EdgePair {
            inner: 2.0 + 1e-14,
            outer: 2.0,
        };
        assert_eq!(crossing_weight(nearly, 2.0), 0.5);
    }

    #[test]
    fn weights_are_clamped_for_pairs_that_do_not_straddle() {
        let pair = EdgePair {
            inner: 3.0,
            outer: 2.0,
        };
        assert_eq!(crossing_weight(pair, 1.0), 1.0);
        assert_eq!(crossing_weight(pair, 5.0), 0.0);
    }

    #[test]
    fn interpolating_the_defining_field_recovers_the_threshold() {
        let field = Array2::from_shape_fn((12, 9), |(r, c)| {
            let x = r as f64 - 5.5;
            let y = c as f64 - 4.0;
            4.0 - 0.1 * (x * x + y * y) + 0.01 * (r * c) as f64
        });
        let threshold = 2.2;
        let weighted = WeightedBoundary::of_field(field.view(), threshold);
        assert!(!weighted.is_empty());

        let recovered = weighted.interpolate_field(field.view());
        assert_eq!(recovered.len(), weighted.len());
        for value in recovered.iter() {
            assert_abs_diff_eq!(*value, threshold, epsilon = 1e-10);
        }
    }

    #[test]
    fn empty_boundaries_interpolate_to_nothing() {
        let field = array![[5.0, 6.0], [7.0, 8.0]];
        let weighted = WeightedBoundary::of_field(field.view(), 0.0);
        assert!(weighted.weights.is_empty());
        assert_eq!(weighted.interpolate_field(field.view()).len(), 0);
    }

    #[test]
    fn a_statistic_of_minus_infinity_stays_negative_at_the_crossing() {
        let field = array![[3.0, 1.0]];
        let weighted = WeightedBoundary::of_field(field.view(), 2.0);
        assert_eq!(weighted.len(), 1);

        let statistic = array![[0.5, f64::NEG_INFINITY]];
        let interpolated = weighted.interpolate_field(statistic.view());
        assert_eq!(interpolated.to_vec(), vec![f64::NEG_INFINITY]);
    }
}
