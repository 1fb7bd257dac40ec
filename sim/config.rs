use crate::fields::{FieldSpec, GaussianFieldGenerator, NoiseSpec, SignalShape, SignalSpec};
use crate::realization::RealizationSettings;
use crate::types::FieldPair;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors found while reading or validating an experiment description.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The lattice must have at least two rows and two columns, found {rows}x{cols}.")]
    InvalidLattice { rows: usize, cols: usize },
    #[error("At least two subjects are needed for a standard deviation, found {0}.")]
    TooFewSubjects(usize),
    #[error("The number of realizations must be positive.")]
    NoRealizations,
    #[error("The number of bootstrap draws must be positive.")]
    NoBootstrapDraws,
    #[error("No coverage probabilities were requested.")]
    NoProbabilities,
    #[error("Coverage probability {0} lies outside [0, 1].")]
    ProbabilityOutOfRange(f64),
    #[error("The threshold must be finite, found {0}.")]
    NonFiniteThreshold(f64),
    #[error("Field {field} has an invalid signal: {reason}")]
    InvalidSignal { field: usize, reason: String },
    #[error("Field {field} has an invalid noise description.")]
    InvalidNoise { field: usize },
    #[error(
        "Threshold {threshold} lies above the peak {max} of field {field}, so its excursion set is empty."
    )]
    ThresholdAboveSignal {
        field: usize,
        threshold: f64,
        max: f64,
    },
    #[error(
        "Threshold {threshold} lies below the minimum {min} of field {field}, so its excursion set covers the lattice."
    )]
    ThresholdBelowSignal {
        field: usize,
        threshold: f64,
        min: f64,
    },
}

/// Coverage probabilities, listed explicitly or as an evenly spaced grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Probabilities {
    List(Vec<f64>),
    Grid { start: f64, stop: f64, count: usize },
}

impl Probabilities {
    /// The grid includes both ends; a one-point grid is `[start]`.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::List(values) => values.clone(),
            Self::Grid { start, stop, count } => match *count {
                0 => Vec::new(),
                1 => vec![*start],
                n => {
                    let step = (stop - start) / (n - 1) as f64;
                    (0..n)
                        .map(|i| if i + 1 == n { *stop } else { start + step * i as f64 })
                        .collect()
                }
            },
        }
    }
}

impl Default for Probabilities {
    fn default() -> Self {
        Self::Grid {
            start: 0.0,
            stop: 1.0,
            count: 21,
        }
    }
}

fn default_threshold() -> f64 {
    2.0
}

fn default_realizations() -> usize {
    500
}

fn default_bootstrap_draws() -> usize {
    5000
}

fn default_lattice() -> [usize; 2] {
    [100, 100]
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

/// A complete description of one coverage experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Threshold `c` defining the excursion sets.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Subjects per realization.
    pub n_sub: usize,
    #[serde(default = "default_realizations")]
    pub n_reals: usize,
    #[serde(default = "default_bootstrap_draws")]
    pub n_boot: usize,
    #[serde(default)]
    pub probabilities: Probabilities,
    /// Lattice shape as `[rows, cols]`.
    #[serde(default = "default_lattice")]
    pub lattice: [usize; 2],
    #[serde(default)]
    pub seed: u64,
    /// Appended to every result file name.
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    pub first: FieldSpec,
    pub second: FieldSpec,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub n_sub: Option<usize>,
    pub n_reals: Option<usize>,
    pub n_boot: Option<usize>,
    pub seed: Option<u64>,
    pub out_dir: Option<PathBuf>,
}

impl ExperimentConfig {
    /// The two circles of the default setting: radius 30, magnitude 3, centred 20
    /// voxels either side of the middle of a 100x100 lattice.
    pub fn two_circles(n_sub: usize) -> Self {
        let circle = |offset: f64| FieldSpec {
            signal: SignalSpec {
                shape: SignalShape::Circle {
                    center: [offset, 0.0],
                    radius: 30.0,
                },
                magnitude: 3.0,
                fwhm: 5.0,
            },
            noise: NoiseSpec::Homogeneous { fwhm: 3.0 },
        };
        Self {
            threshold: default_threshold(),
            n_sub,
            n_reals: default_realizations(),
            n_boot: default_bootstrap_draws(),
            probabilities: Probabilities::default(),
            lattice: default_lattice(),
            seed: 0,
            tag: String::new(),
            out_dir: default_out_dir(),
            first: circle(-20.0),
            second: circle(20.0),
        }
    }

    /// Loads a configuration from a TOML file. Validation is left to the caller so
    /// that overrides can be applied first.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    /// Saves the configuration in TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(n_sub) = overrides.n_sub {
            self.n_sub = n_sub;
        }
        if let Some(n_reals) = overrides.n_reals {
            self.n_reals = n_reals;
        }
        if let Some(n_boot) = overrides.n_boot {
            self.n_boot = n_boot;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if let Some(out_dir) = &overrides.out_dir {
            self.out_dir = out_dir.clone();
        }
    }

    pub fn lattice_shape(&self) -> (usize, usize) {
        (self.lattice[0], self.lattice[1])
    }

    pub fn fields(&self) -> FieldPair<&FieldSpec> {
        FieldPair::new(&self.first, &self.second)
    }

    pub fn realization_settings(&self) -> RealizationSettings {
        RealizationSettings {
            threshold: self.threshold,
            n_boot: self.n_boot,
            probabilities: self.probabilities.values(),
        }
    }

    /// Checks every parameter, and that the threshold cuts through both mean fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [rows, cols] = self.lattice;
        if rows < 2 || cols < 2 {
            return Err(ConfigError::InvalidLattice { rows, cols });
        }
        if self.n_sub < 2 {
            return Err(ConfigError::TooFewSubjects(self.n_sub));
        }
        if self.n_reals == 0 {
            return Err(ConfigError::NoRealizations);
        }
        if self.n_boot == 0 {
            return Err(ConfigError::NoBootstrapDraws);
        }
        let probabilities = self.probabilities.values();
        if probabilities.is_empty() {
            return Err(ConfigError::NoProbabilities);
        }
        if let Some(&p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ConfigError::ProbabilityOutOfRange(p));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::NonFiniteThreshold(self.threshold));
        }

        for (index, spec) in [(1, &self.first), (2, &self.second)] {
            validate_field(index, spec, self.lattice_shape(), self.threshold)?;
        }
        Ok(())
    }

    /// Generators for both fields. Call after [`ExperimentConfig::validate`].
    pub fn generators(&self) -> FieldPair<GaussianFieldGenerator> {
        let lattice = self.lattice_shape();
        self.fields()
            .map(|spec| GaussianFieldGenerator::new(spec, lattice))
    }
}

fn validate_field(
    field: usize,
    spec: &FieldSpec,
    lattice: (usize, usize),
    threshold: f64,
) -> Result<(), ConfigError> {
    let signal = &spec.signal;
    if !signal.shape.is_valid() {
        return Err(ConfigError::InvalidSignal {
            field,
            reason: "centre and extent must be finite and the extent positive".to_string(),
        });
    }
    if !signal.magnitude.is_finite() || !signal.fwhm.is_finite() || signal.fwhm < 0.0 {
        return Err(ConfigError::InvalidSignal {
            field,
            reason: "magnitude must be finite and the smoothing width non-negative".to_string(),
        });
    }
    if !spec.noise.is_valid() {
        return Err(ConfigError::InvalidNoise { field });
    }

    let mean = signal.render(lattice);
    let (min, max) = mean
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !(max > threshold) {
        return Err(ConfigError::ThresholdAboveSignal {
            field,
            threshold,
            max,
        });
    }
    if min > threshold {
        return Err(ConfigError::ThresholdBelowSignal {
            field,
            threshold,
            min,
        });
    }
    Ok(())
}
