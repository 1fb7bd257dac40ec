//! Synthetic subject data: a deterministic mean signal plus smoothed Gaussian noise.

pub mod noise;
pub mod signal;
pub mod smooth;

pub use noise::{NoiseSampler, NoiseSpec};
pub use signal::{SignalShape, SignalSpec};

use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Specification of one tracked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub signal: SignalSpec,
    pub noise: NoiseSpec,
}

/// Produces the true mean of a field and noisy subject observations of it.
pub trait FieldGenerator: Sync {
    /// The true mean over the lattice.
    fn mean(&self) -> ArrayView2<'_, f64>;

    /// Subject data shaped `[n_subjects, rows, cols]`.
    fn sample<R: Rng + ?Sized>(&self, n_subjects: usize, rng: &mut R) -> Array3<f64>;
}

/// Mean signal plus independent smoothed Gaussian noise per subject.
#[derive(Debug, Clone)]
pub struct GaussianFieldGenerator {
    mean: Array2<f64>,
    noise: NoiseSampler,
}

impl GaussianFieldGenerator {
    pub fn new(spec: &FieldSpec, lattice: (usize, usize)) -> Self {
        Self {
            mean: spec.signal.render(lattice),
            noise: NoiseSampler::new(&spec.noise, lattice),
        }
    }
}

impl FieldGenerator for GaussianFieldGenerator {
    fn mean(&self) -> ArrayView2<'_, f64> {
        self.mean.view()
    }

    fn sample<R: Rng + ?Sized>(&self, n_subjects: usize, rng: &mut R) -> Array3<f64> {
        let mut data = self.noise.sample(n_subjects, rng);
        for mut subject in data.axis_iter_mut(Axis(0)) {
            subject += &self.mean;
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn samples_scatter_around_the_mean() {
        let spec = FieldSpec {
            signal: SignalSpec {
                shape: SignalShape::Square {
                    center: [0.0, 0.0],
                    half_width: 3.0,
                },
                magnitude: 3.0,
                fwhm: 2.0,
            },
            noise: NoiseSpec::Homogeneous { fwhm: 2.0 },
        };
        let generator = GaussianFieldGenerator::new(&spec, (16, 16));
        let data = generator.sample(2000, &mut StdRng::seed_from_u64(4));
        assert_eq!(data.dim(), (2000, 16, 16));

        let sample_mean = data.mean_axis(Axis(0)).unwrap();
        let worst = (&sample_mean - &generator.mean())
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!(worst < 0.2, "largest deviation {worst}");
    }

    #[test]
    fn equal_seeds_give_equal_data() {
        let spec = FieldSpec {
            signal: SignalSpec {
                shape: SignalShape::Circle {
                    center: [0.0, 0.0],
                    radius: 3.0,
                },
                magnitude: 1.0,
                fwhm: 0.0,
            },
            noise: NoiseSpec::Homogeneous { fwhm: 3.0 },
        };
        let generator = GaussianFieldGenerator::new(&spec, (10, 12));
        let a = generator.sample(3, &mut StdRng::seed_from_u64(8));
        let b = generator.sample(3, &mut StdRng::seed_from_u64(8));
        assert_eq!(a, b);
    }
}
