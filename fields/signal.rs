use super::smooth::GaussianKernel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// The footprint of a mean signal before smoothing. Centres are offsets, in lattice
/// units, from the middle of the lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalShape {
    Circle { center: [f64; 2], radius: f64 },
    Square { center: [f64; 2], half_width: f64 },
}

impl SignalShape {
    fn contains(&self, offset: [f64; 2]) -> bool {
        match self {
            Self::Circle { center, radius } => {
                let dr = offset[0] - center[0];
                let dc = offset[1] - center[1];
                dr * dr + dc * dc <= radius * radius
            }
            Self::Square { center, half_width } => {
                (offset[0] - center[0]).abs() <= *half_width
                    && (offset[1] - center[1]).abs() <= *half_width
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        let (center, extent) = match self {
            Self::Circle { center, radius } => (center, *radius),
            Self::Square { center, half_width } => (center, *half_width),
        };
        center.iter().all(|v| v.is_finite()) && extent.is_finite() && extent > 0.0
    }
}

/// A deterministic mean field: an indicator of the shape, smoothed, rescaled to a
/// peak of one and multiplied by `magnitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub shape: SignalShape,
    pub magnitude: f64,
    #[serde(default)]
    pub fwhm: f64,
}

impl SignalSpec {
    pub fn render(&self, lattice: (usize, usize)) -> Array2<f64> {
        let mid_row = (lattice.0 as f64 - 1.0) / 2.0;
        let mid_col = (lattice.1 as f64 - 1.0) / 2.0;
        let indicator = Array2::from_shape_fn(lattice, |(r, c)| {
            let offset = [r as f64 - mid_row, c as f64 - mid_col];
            if self.shape.contains(offset) { 1.0 } else { 0.0 }
        });

        let smoothed = GaussianKernel::from_fwhm(self.fwhm).smooth(indicator.view());
        let peak = smoothed.fold(0.0_f64, |acc, &v| acc.max(v));
        if peak > 0.0 {
            smoothed.mapv(|v| self.magnitude * v / peak)
        } else {
            log::warn!("Signal shape {:?} does not cover any voxel of the lattice", self.shape);
            smoothed
        }
    }
}
