use confsets::config::{ExperimentConfig, Probabilities};
use confsets::fields::SignalShape;
use confsets::io::{RunSummary, read_success_table, success_file_name, summarize, write_results};
use confsets::pipeline::CoverageExperiment;
use confsets::progress::{ExperimentStage, NoopProgress, ProgressObserver};
use confsets::types::{Assessment, BoundaryVariant};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

fn small_experiment(n_sub: usize, seed: u64) -> ExperimentConfig {
    let mut config = ExperimentConfig::two_circles(n_sub);
    config.lattice = [32, 32];
    config.n_reals = 6;
    config.n_boot = 60;
    config.seed = seed;
    config.tag = "_small".to_string();
    config.probabilities = Probabilities::List(vec![0.0, 0.5, 0.8, 0.95, 1.0]);
    for (spec, offset) in [(&mut config.first, -4.0), (&mut config.second, 4.0)] {
        spec.signal.shape = SignalShape::Circle {
            center: [offset, 0.0],
            radius: 9.0,
        };
    }
    config
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    advanced: AtomicUsize,
    finished: AtomicUsize,
}

impl ProgressObserver for CountingProgress {
    fn on_stage_start(&self, stage: ExperimentStage, total: usize) {
        assert_eq!(stage, ExperimentStage::Realizations);
        self.started.store(total, Ordering::SeqCst);
    }
    fn on_stage_advance(&self, _: ExperimentStage, completed: usize) {
        self.advanced.fetch_max(completed, Ordering::SeqCst);
    }
    fn on_stage_finish(&self, _: ExperimentStage) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn a_small_experiment_produces_consistent_tables() {
    let experiment = CoverageExperiment::new(small_experiment(15, 42)).unwrap();
    let progress = CountingProgress::default();
    let results = experiment.run(&progress).unwrap();

    assert_eq!(progress.started.load(Ordering::SeqCst), 6);
    assert_eq!(progress.advanced.load(Ordering::SeqCst), 6);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);

    assert_eq!(results.n_reals(), 6);
    for variant in BoundaryVariant::ALL {
        let voxelwise = results.table(variant, Assessment::Voxelwise);
        let interpolated = results.table(variant, Assessment::Interpolated);
        assert_eq!(voxelwise.dim(), (6, 5));
        for (&v, &i) in voxelwise.iter().zip(interpolated.iter()) {
            assert!(!i || v, "interpolated success without voxelwise success");
        }

        // Wider brackets can only help: success is monotone in p within a realization.
        for row in voxelwise.rows() {
            let row: Vec<bool> = row.to_vec();
            assert!(row.windows(2).all(|w| !w[0] || w[1]));
        }

        let coverage = results.coverage(variant, Assessment::Voxelwise);
        assert!(coverage.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    for diagnostics in &results.diagnostics {
        assert!(diagnostics.fc <= diagnostics.ac1.min(diagnostics.ac2));
        assert!(diagnostics.gc >= diagnostics.ac1.max(diagnostics.ac2));
        assert!(diagnostics.fc_boundary_edges > 0);
    }
}

#[test]
fn runs_are_reproducible_and_seed_dependent() {
    let first = CoverageExperiment::new(small_experiment(15, 7))
        .unwrap()
        .run(&NoopProgress)
        .unwrap();
    let second = CoverageExperiment::new(small_experiment(15, 7))
        .unwrap()
        .run(&NoopProgress)
        .unwrap();
    assert_eq!(first.success, second.success);
    assert_eq!(first.diagnostics, second.diagnostics);

    let other = CoverageExperiment::new(small_experiment(15, 8))
        .unwrap()
        .run(&NoopProgress)
        .unwrap();
    assert_ne!(first.diagnostics, other.diagnostics);
}

#[test]
fn single_realizations_match_the_batch() {
    let experiment = CoverageExperiment::new(small_experiment(12, 3)).unwrap();
    let results = experiment.run(&NoopProgress).unwrap();
    let third = experiment.realization(2).unwrap();
    let table = results.table(BoundaryVariant::Estimated, Assessment::Interpolated);
    assert_eq!(
        table.row(2).to_vec(),
        third.success.estimated_boundary.interpolated()
    );
    assert_eq!(results.diagnostics[2], third.diagnostics);
}

#[test]
fn results_are_appended_and_summarized() {
    let dir = tempdir().unwrap();
    for (n_sub, seed) in [(12, 1), (12, 2), (20, 3)] {
        let mut config = small_experiment(n_sub, seed);
        config.out_dir = dir.path().to_path_buf();
        let experiment = CoverageExperiment::new(config).unwrap();
        let results = experiment.run(&NoopProgress).unwrap();
        let written = write_results(dir.path(), experiment.config(), &results).unwrap();
        assert_eq!(written.len(), 5);
    }

    let twelve = read_success_table(&dir.path().join(success_file_name(
        BoundaryVariant::True,
        Assessment::Voxelwise,
        12,
        "_small",
    )))
    .unwrap();
    assert_eq!(twelve.dim(), (12, 5));

    let summary = RunSummary::load(&dir.path().join(RunSummary::FILE_NAME)).unwrap();
    assert_eq!(summary.n_sub, 20);
    assert_eq!(summary.n_reals, 6);
    assert_eq!(summary.probabilities, vec![0.0, 0.5, 0.8, 0.95, 1.0]);
    assert_eq!(summary.coverage.est_interpolated.len(), 5);

    let written = summarize(dir.path(), &[12, 20], "_small", &summary.probabilities).unwrap();
    assert_eq!(written.len(), 4);
    let text = fs::read_to_string(dir.path().join("coverage_est_intrp_small.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "n_sub,0,0.5,0.8,0.95,1");
    assert!(lines[1].starts_with("12,"));
    assert!(lines[2].starts_with("20,"));
}
