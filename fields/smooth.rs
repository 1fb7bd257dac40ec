//! Separable Gaussian smoothing of lattice fields.
//!
//! The kernel width is given as a full width at half maximum and truncated at four
//! standard deviations. Samples beyond the lattice edge are read from the mirror
//! image of the field, with the edge sample repeated (`d c b a | a b c d`).

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

const TRUNCATE_SDS: f64 = 4.0;

/// Converts a full width at half maximum into a standard deviation.
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (8.0 * std::f64::consts::LN_2).sqrt()
}

/// A normalized, symmetric one-dimensional Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Array1<f64>,
}

impl GaussianKernel {
    /// Builds the kernel for `fwhm` lattice units. A non-positive width gives the
    /// identity kernel.
    pub fn from_fwhm(fwhm: f64) -> Self {
        let sigma = fwhm_to_sigma(fwhm);
        if !(sigma > 0.0) {
            return Self {
                weights: Array1::ones(1),
            };
        }
        let radius = (TRUNCATE_SDS * sigma + 0.5) as isize;
        let raw: Array1<f64> = (-radius..=radius)
            .map(|offset| {
                let x = offset as f64 / sigma;
                (-0.5 * x * x).exp()
            })
            .collect();
        let total = raw.sum();
        Self {
            weights: raw / total,
        }
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> ArrayView1<f64> {
        self.weights.view()
    }

    /// Sum of squared weights; the variance of white noise after one pass.
    pub fn sum_sq(&self) -> f64 {
        self.weights.dot(&self.weights)
    }

    fn convolve_line(&self, line: ArrayView1<f64>, out: &mut [f64]) {
        let len = line.len();
        let radius = self.radius() as isize;
        for (position, slot) in out.iter_mut().enumerate() {
            *slot = self
                .weights
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    let source = position as isize + k as isize - radius;
                    w * line[reflect(source, len)]
                })
                .sum();
        }
    }

    fn smooth_along(&self, field: ArrayView2<f64>, axis: Axis) -> Array2<f64> {
        let mut out = Array2::zeros(field.raw_dim());
        let mut buffer = vec![0.0; field.len_of(axis)];
        Zip::from(field.lanes(axis))
            .and(out.lanes_mut(axis))
            .for_each(|line, mut target| {
                self.convolve_line(line, &mut buffer);
                target
                    .iter_mut()
                    .zip(&buffer)
                    .for_each(|(t, &v)| *t = v);
            });
        out
    }

    /// Smooths a 2-D field along both axes.
    pub fn smooth(&self, field: ArrayView2<f64>) -> Array2<f64> {
        if self.weights.len() == 1 {
            return field.to_owned();
        }
        let rows_done = self.smooth_along(field, Axis(0));
        self.smooth_along(rows_done.view(), Axis(1))
    }
}

/// Maps an out-of-range index back onto `0..len` by mirroring at the edges.
fn reflect(mut index: isize, len: usize) -> usize {
    let len = len as isize;
    loop {
        if index < 0 {
            index = -index - 1;
        } else if index >= len {
            index = 2 * len - index - 1;
        } else {
            return index as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn sigma_of_unit_fwhm() {
        assert_abs_diff_eq!(fwhm_to_sigma(2.354820045), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = GaussianKernel::from_fwhm(3.0);
        assert_abs_diff_eq!(kernel.weights().sum(), 1.0, epsilon = 1e-12);
        let w = kernel.weights();
        let n = w.len();
        for i in 0..n {
            assert_abs_diff_eq!(w[i], w[n - 1 - i], epsilon = 1e-15);
        }
        assert_eq!(n, 2 * kernel.radius() + 1);
    }

    #[test]
    fn zero_width_is_the_identity() {
        let field = array![[1.0, 2.0], [3.0, 4.0]];
        let kernel = GaussianKernel::from_fwhm(0.0);
        assert_eq!(kernel.smooth(field.view()), field);
        assert_eq!(kernel.sum_sq(), 1.0);
    }

    #[test]
    fn constant_fields_stay_constant() {
        let field = Array2::from_elem((7, 5), 2.5);
        let smoothed = GaussianKernel::from_fwhm(4.0).smooth(field.view());
        for value in smoothed.iter() {
            assert_abs_diff_eq!(*value, 2.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn mirror_indices_repeat_the_edge() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 2), 1);
    }

    #[test]
    fn smoothing_preserves_mass_away_from_edges() {
        let mut field = Array2::zeros((21, 21));
        field[[10, 10]] = 1.0;
        let smoothed = GaussianKernel::from_fwhm(3.0).smooth(field.view());
        assert_abs_diff_eq!(smoothed.sum(), 1.0, epsilon = 1e-12);
        assert!(smoothed[[10, 10]] > smoothed[[10, 11]]);
        assert_abs_diff_eq!(smoothed[[10, 11]], smoothed[[11, 10]], epsilon = 1e-15);
    }
}
