use super::smooth::GaussianKernel;
use ndarray::{Array2, Array3, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Subject noise: white Gaussian noise smoothed within each subject, independent
/// across subjects, rescaled so that each voxel has the requested standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoiseSpec {
    /// Unit standard deviation everywhere.
    Homogeneous {
        #[serde(default)]
        fwhm: f64,
    },
    /// Standard deviation ramping linearly from `low` in the first column to `high`
    /// in the last.
    Heterogeneous {
        #[serde(default)]
        fwhm: f64,
        low: f64,
        high: f64,
    },
}

impl NoiseSpec {
    pub fn fwhm(&self) -> f64 {
        match self {
            Self::Homogeneous { fwhm } | Self::Heterogeneous { fwhm, .. } => *fwhm,
        }
    }

    pub fn is_valid(&self) -> bool {
        let fwhm = self.fwhm();
        let width_ok = fwhm.is_finite() && fwhm >= 0.0;
        match self {
            Self::Homogeneous { .. } => width_ok,
            Self::Heterogeneous { low, high, .. } => {
                width_ok && low.is_finite() && high.is_finite() && *low >= 0.0 && *high >= 0.0
            }
        }
    }

    /// The voxelwise standard deviation of the noise.
    pub fn sd_map(&self, lattice: (usize, usize)) -> Array2<f64> {
        match self {
            Self::Homogeneous { .. } => Array2::ones(lattice),
            Self::Heterogeneous { low, high, .. } => {
                let span = lattice.1.saturating_sub(1).max(1) as f64;
                Array2::from_shape_fn(lattice, |(_, c)| low + (high - low) * c as f64 / span)
            }
        }
    }
}

/// Draws smoothed noise for a fixed lattice, reusing the kernel and scale map.
#[derive(Debug, Clone)]
pub struct NoiseSampler {
    kernel: GaussianKernel,
    scale: Array2<f64>,
}

impl NoiseSampler {
    pub fn new(spec: &NoiseSpec, lattice: (usize, usize)) -> Self {
        let kernel = GaussianKernel::from_fwhm(spec.fwhm());
        // Separable smoothing of unit white noise leaves a variance of sum_sq^2 in
        // the interior, so one division by sum_sq restores unit standard deviation.
        let unit = kernel.sum_sq();
        let scale = spec.sd_map(lattice).mapv(|sd| sd / unit);
        Self { kernel, scale }
    }

    /// Noise shaped `[n_subjects, rows, cols]`.
    pub fn sample<R: Rng + ?Sized>(&self, n_subjects: usize, rng: &mut R) -> Array3<f64> {
        let lattice = self.scale.dim();
        let mut noise = Array3::zeros((n_subjects, lattice.0, lattice.1));
        for mut subject in noise.axis_iter_mut(Axis(0)) {
            let white = Array2::from_shape_fn(lattice, |_| rng.sample::<f64, _>(StandardNormal));
            let smoothed = self.kernel.smooth(white.view());
            subject.assign(&(smoothed * &self.scale));
        }
        noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn interior_sd(noise: &Array3<f64>, r: usize, c: usize) -> f64 {
        let values = noise.slice(ndarray::s![.., r, c]);
        let mean = values.mean().unwrap();
        (values.mapv(|v| (v - mean).powi(2)).sum() / (values.len() as f64 - 1.0)).sqrt()
    }

    #[test]
    fn smoothed_noise_has_unit_variance_in_the_interior() {
        let spec = NoiseSpec::Homogeneous { fwhm: 3.0 };
        let sampler = NoiseSampler::new(&spec, (24, 24));
        let noise = sampler.sample(4000, &mut StdRng::seed_from_u64(21));
        let sd = interior_sd(&noise, 12, 12);
        assert!((sd - 1.0).abs() < 0.05, "sd = {sd}");
    }

    #[test]
    fn heterogeneous_noise_ramps_across_columns() {
        let spec = NoiseSpec::Heterogeneous {
            fwhm: 0.0,
            low: 0.5,
            high: 2.0,
        };
        let map = spec.sd_map((3, 4));
        assert_eq!(map[[0, 0]], 0.5);
        assert_eq!(map[[2, 3]], 2.0);
        assert_eq!(map[[1, 1]], 1.0);

        let noise = NoiseSampler::new(&spec, (3, 4)).sample(4000, &mut StdRng::seed_from_u64(2));
        assert!((interior_sd(&noise, 1, 0) - 0.5).abs() < 0.03);
        assert!((interior_sd(&noise, 1, 3) - 2.0).abs() < 0.1);
    }

    #[test]
    fn negative_widths_are_invalid() {
        assert!(!NoiseSpec::Homogeneous { fwhm: -1.0 }.is_valid());
        assert!(
            !NoiseSpec::Heterogeneous {
                fwhm: 1.0,
                low: -0.1,
                high: 1.0
            }
            .is_valid()
        );
        assert!(NoiseSpec::Homogeneous { fwhm: 3.0 }.is_valid());
    }
}
