//! Result files on disk.
//!
//! A run appends its four success tables to CSV files, one row per realization and
//! one column per probability, written as `0`/`1`. Appending lets a study be split
//! across invocations with different seeds. A `summary.toml` beside the tables
//! records the coverage of the latest run, and [`summarize`] joins the tables of
//! several sample sizes into per-sample-size coverage tables.

use crate::config::ExperimentConfig;
use crate::pipeline::{ExperimentResults, coverage_of};
use crate::types::{Assessment, BoundaryVariant};
use itertools::Itertools;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error on '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Failed to serialize the run summary: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Failed to parse the run summary: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Success table '{0}' was not found.")]
    MissingTable(PathBuf),
    #[error("Success table '{path}' has rows of {found} columns, expected {expected}.")]
    RaggedTable {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Success table '{path}' holds '{value}', which is not a number.")]
    InvalidCell { path: PathBuf, value: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// `trueSuccess{n_sub}{tag}.csv`, `estSuccess{n_sub}{tag}_intrp.csv` and so on.
pub fn success_file_name(
    variant: BoundaryVariant,
    assessment: Assessment,
    n_sub: usize,
    tag: &str,
) -> String {
    format!(
        "{}Success{n_sub}{tag}{}.csv",
        variant.file_prefix(),
        assessment.file_suffix()
    )
}

/// `coverage_true{tag}.csv`, `coverage_est_intrp{tag}.csv` and so on.
pub fn coverage_file_name(variant: BoundaryVariant, assessment: Assessment, tag: &str) -> String {
    format!(
        "coverage_{}{}{tag}.csv",
        variant.file_prefix(),
        assessment.file_suffix()
    )
}

/// Appends the rows of `table` to `path`, creating the file when needed.
pub fn append_success_table(path: &Path, table: ArrayView2<bool>) -> Result<(), PersistenceError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|&success| if success { "1" } else { "0" }))
            .map_err(csv_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Reads a success table back as `[n_rows, n_probabilities]` 0/1 values.
pub fn read_success_table(path: &Path) -> Result<Array2<f64>, PersistenceError> {
    if !path.exists() {
        return Err(PersistenceError::MissingTable(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error(path))?;

    let mut values = Vec::new();
    let mut width = None;
    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        let expected = *width.get_or_insert(record.len());
        if record.len() != expected {
            return Err(PersistenceError::RaggedTable {
                path: path.to_path_buf(),
                expected,
                found: record.len(),
            });
        }
        for cell in record.iter() {
            let value = cell
                .trim()
                .parse::<f64>()
                .map_err(|_| PersistenceError::InvalidCell {
                    path: path.to_path_buf(),
                    value: cell.to_string(),
                })?;
            values.push(value);
        }
        rows += 1;
    }

    let cols = width.unwrap_or(0);
    Array2::from_shape_vec((rows, cols), values).map_err(|_| PersistenceError::RaggedTable {
        path: path.to_path_buf(),
        expected: cols,
        found: 0,
    })
}

/// Coverage of one run per boundary variant and assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub true_voxelwise: Vec<f64>,
    pub true_interpolated: Vec<f64>,
    pub est_voxelwise: Vec<f64>,
    pub est_interpolated: Vec<f64>,
}

/// Realizations per boundary variant whose thresholds came out infinite. They count as
/// successes at every probability and inflate the coverage they appear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DegenerateCounts {
    pub true_boundary: usize,
    pub estimated_boundary: usize,
}

/// What a run writes to `summary.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub n_sub: usize,
    pub n_reals: usize,
    pub n_boot: usize,
    pub threshold: f64,
    pub seed: u64,
    pub tag: String,
    pub probabilities: Vec<f64>,
    pub coverage: CoverageSummary,
    #[serde(default)]
    pub degenerate_realizations: DegenerateCounts,
}

impl RunSummary {
    pub const FILE_NAME: &'static str = "summary.toml";

    pub fn new(config: &ExperimentConfig, results: &ExperimentResults) -> Self {
        let coverage = |variant, assessment| results.coverage(variant, assessment).to_vec();
        Self {
            n_sub: config.n_sub,
            n_reals: results.n_reals(),
            n_boot: config.n_boot,
            threshold: config.threshold,
            seed: config.seed,
            tag: config.tag.clone(),
            probabilities: results.probabilities.clone(),
            coverage: CoverageSummary {
                true_voxelwise: coverage(BoundaryVariant::True, Assessment::Voxelwise),
                true_interpolated: coverage(BoundaryVariant::True, Assessment::Interpolated),
                est_voxelwise: coverage(BoundaryVariant::Estimated, Assessment::Voxelwise),
                est_interpolated: coverage(BoundaryVariant::Estimated, Assessment::Interpolated),
            },
            degenerate_realizations: DegenerateCounts {
                true_boundary: results.degenerate_realizations(BoundaryVariant::True),
                estimated_boundary: results.degenerate_realizations(BoundaryVariant::Estimated),
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(io_error(path))
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let toml_string = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(toml::from_str(&toml_string)?)
    }
}

/// Appends the four success tables of a run to `out_dir` and rewrites `summary.toml`.
/// Returns the paths written.
pub fn write_results(
    out_dir: &Path,
    config: &ExperimentConfig,
    results: &ExperimentResults,
) -> Result<Vec<PathBuf>, PersistenceError> {
    fs::create_dir_all(out_dir).map_err(io_error(out_dir))?;

    let mut written = Vec::with_capacity(5);
    for variant in BoundaryVariant::ALL {
        for assessment in Assessment::ALL {
            let path = out_dir.join(success_file_name(
                variant,
                assessment,
                config.n_sub,
                &config.tag,
            ));
            append_success_table(&path, results.table(variant, assessment))?;
            written.push(path);
        }
    }

    let summary_path = out_dir.join(RunSummary::FILE_NAME);
    RunSummary::new(config, results).save(&summary_path)?;
    written.push(summary_path);

    log::info!(
        "Wrote {}",
        written.iter().map(|p| p.display()).join(", ")
    );
    Ok(written)
}

/// Joins the success tables of several sample sizes into coverage tables, one per
/// boundary variant and assessment, with a row per sample size. Returns the paths
/// written.
pub fn summarize(
    dir: &Path,
    n_subs: &[usize],
    tag: &str,
    probabilities: &[f64],
) -> Result<Vec<PathBuf>, PersistenceError> {
    let mut written = Vec::with_capacity(4);
    for variant in BoundaryVariant::ALL {
        for assessment in Assessment::ALL {
            let out_path = dir.join(coverage_file_name(variant, assessment, tag));
            let mut writer = csv::Writer::from_path(&out_path).map_err(csv_error(&out_path))?;

            let header = std::iter::once("n_sub".to_string())
                .chain(probabilities.iter().map(|p| format!("{p}")));
            writer.write_record(header).map_err(csv_error(&out_path))?;

            for &n_sub in n_subs {
                let table_path = dir.join(success_file_name(variant, assessment, n_sub, tag));
                let table = read_success_table(&table_path)?;
                if table.ncols() != probabilities.len() {
                    return Err(PersistenceError::RaggedTable {
                        path: table_path,
                        expected: probabilities.len(),
                        found: table.ncols(),
                    });
                }
                let coverage = coverage_of(table.view());
                log::debug!(
                    "{} realizations of {n_sub} subjects in {}",
                    table.nrows(),
                    table_path.display()
                );
                let row = std::iter::once(n_sub.to_string())
                    .chain(coverage.iter().map(|c| format!("{c}")));
                writer.write_record(row).map_err(csv_error(&out_path))?;
            }
            writer.flush().map_err(io_error(&out_path))?;
            written.push(out_path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realization::{RealizationData, RealizationSettings, simulate_realization};
    use crate::types::FieldPair;
    use ndarray::{Array3, array};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    // Subject data equal to the mean in every subject.
    fn noise_free(mean: Array2<f64>) -> RealizationData {
        let (rows, cols) = mean.dim();
        let data = Array3::from_shape_fn((4, rows, cols), |(_, r, c)| mean[[r, c]]);
        RealizationData {
            data: FieldPair::new(data.clone(), data),
            means: FieldPair::new(mean.clone(), mean),
        }
    }

    #[test]
    fn file_names_follow_the_result_layout() {
        assert_eq!(
            success_file_name(BoundaryVariant::True, Assessment::Voxelwise, 40, ""),
            "trueSuccess40.csv"
        );
        assert_eq!(
            success_file_name(BoundaryVariant::Estimated, Assessment::Interpolated, 100, "_v3"),
            "estSuccess100_v3_intrp.csv"
        );
        assert_eq!(
            coverage_file_name(BoundaryVariant::Estimated, Assessment::Interpolated, "_v3"),
            "coverage_est_intrp_v3.csv"
        );
    }

    #[test]
    fn tables_are_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trueSuccess10.csv");
        append_success_table(&path, array![[true, false, true]].view()).unwrap();
        append_success_table(&path, array![[false, false, true], [true, true, true]].view())
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1,0,1\n0,0,1\n1,1,1\n");
        let table = read_success_table(&path).unwrap();
        assert_eq!(
            table,
            array![[1.0, 0.0, 1.0], [0.0, 0.0, 1.0], [1.0, 1.0, 1.0]]
        );
    }

    #[test]
    fn unreadable_tables_are_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("estSuccess5.csv");
        assert!(matches!(
            read_success_table(&missing),
            Err(PersistenceError::MissingTable(_))
        ));

        let ragged = dir.path().join("ragged.csv");
        fs::write(&ragged, "1,0\n1\n").unwrap();
        assert!(read_success_table(&ragged).is_err());

        let garbage = dir.path().join("garbage.csv");
        fs::write(&garbage, "1,yes\n").unwrap();
        assert!(matches!(
            read_success_table(&garbage),
            Err(PersistenceError::InvalidCell { .. })
        ));
    }

    #[test]
    fn summarize_writes_one_row_per_sample_size() {
        let dir = tempdir().unwrap();
        for variant in BoundaryVariant::ALL {
            for assessment in Assessment::ALL {
                for (n_sub, table) in [
                    (20, array![[true, true], [false, true]]),
                    (40, array![[true, true], [true, true], [false, true], [false, false]]),
                ] {
                    let path = dir.path().join(success_file_name(variant, assessment, n_sub, "_t"));
                    append_success_table(&path, table.view()).unwrap();
                }
            }
        }

        let written = summarize(dir.path(), &[20, 40], "_t", &[0.5, 0.95]).unwrap();
        assert_eq!(written.len(), 4);
        let text = fs::read_to_string(dir.path().join("coverage_true_t.csv")).unwrap();
        assert_eq!(text, "n_sub,0.5,0.95\n20,0.5,1\n40,0.5,0.75\n");

        assert!(matches!(
            summarize(dir.path(), &[20], "_t", &[0.5]),
            Err(PersistenceError::RaggedTable { .. })
        ));
    }

    #[test]
    fn the_summary_counts_degenerate_realizations() {
        let settings = RealizationSettings {
            threshold: 1.0,
            n_boot: 8,
            probabilities: vec![0.5, 0.95],
        };
        let square = Array2::from_shape_fn((8, 8), |(r, c)| {
            if (2..6).contains(&r) && (2..6).contains(&c) {
                2.0
            } else {
                0.0
            }
        });
        // A crossing boundary with zero spread has infinite thresholds; a field entirely
        // above the threshold has no boundary and a zero threshold.
        let outcomes = [square, Array2::from_elem((8, 8), 3.0)]
            .into_iter()
            .map(|mean| {
                simulate_realization(&noise_free(mean), &settings, &mut StdRng::seed_from_u64(0))
                    .unwrap()
            })
            .collect::<Vec<_>>();
        let results = ExperimentResults::from_outcomes(settings.probabilities.clone(), &outcomes);
        assert_eq!(results.degenerate_realizations(BoundaryVariant::True), 1);
        assert_eq!(results.degenerate_realizations(BoundaryVariant::Estimated), 1);

        let summary = RunSummary::new(&ExperimentConfig::two_circles(4), &results);
        assert_eq!(
            summary.degenerate_realizations,
            DegenerateCounts {
                true_boundary: 1,
                estimated_boundary: 1
            }
        );

        let dir = tempdir().unwrap();
        let path = dir.path().join(RunSummary::FILE_NAME);
        summary.save(&path).unwrap();
        assert_eq!(RunSummary::load(&path).unwrap(), summary);
    }
}
