//! End-to-end training on separable clusters.

mod common;

use std::fs;
use std::io::Write;
use std::path::Path;

use common::{clusters, on_mesh};
use lrsvm_la::DMat;
use lrsvm_mesh::CommCounter;
use lrsvm_train::{
    accuracy, partition_path, primal_weights, Dataset, DualAscent, DualOutcome, Partition,
    SvdEngine, SvmConfig, Termination, TrainError, TrainSummary, Trainer,
};

fn config() -> SvmConfig {
    SvmConfig::new(1.0, 0.01, 1e-4).with_trials(1)
}

/// SVD and dual ascent on every rank, plus the coordinator's weights.
async fn solve(size: usize, config: SvmConfig) -> Vec<(DualOutcome, Option<DMat>)> {
    let parts = clusters(60, 11).split(size);
    on_mesh(size, move |comm| {
        let part = parts[comm.rank()].clone().into_partition();
        let config = config.clone();
        async move {
            let k = config.rank_for(part.dim());
            let mut volume = CommCounter::new(comm.size());
            let factors = SvdEngine::new(&comm, k, config.power_iterations, config.seed)
                .run(part.x_hat(), &mut volume)
                .await
                .unwrap();
            let outcome = DualAscent::new(&comm, &config)
                .run(&factors, &part, &mut volume)
                .await
                .unwrap();
            let w = outcome.alpha.as_ref().map(|a| primal_weights(&factors, a));
            (comm, (outcome, w))
        }
    })
    .await
}

fn bits(m: &DMat) -> Vec<u64> {
    m.as_slice().iter().map(|x| x.to_bits()).collect()
}

#[tokio::test]
async fn separable_clusters_are_classified() {
    let holdout = clusters(40, 12).into_partition();
    for size in 1..=3 {
        let results = solve(size, config()).await;
        let (outcome, w) = &results[0];
        assert_eq!(outcome.termination, Termination::Converged, "P={size}");
        assert!(outcome.error <= 1e-4);
        assert!(outcome.iterations > 1 && outcome.iterations < 1000, "P={size}: {}", outcome.iterations);

        let w = w.as_ref().expect("coordinator has weights");
        assert_eq!(w.shape(), (3, 1));
        let acc = accuracy(&holdout, w);
        assert_eq!(acc.correct, acc.total, "P={size}");

        for (rank, (_, w)) in results.iter().enumerate().skip(1) {
            assert!(w.is_none(), "rank {rank} should not hold α");
        }
    }
}

#[tokio::test]
async fn ranks_agree_bit_for_bit() {
    let results = solve(3, config()).await;
    let (first, _) = &results[0];
    for (outcome, _) in &results[1..] {
        assert_eq!(outcome.iterations, first.iterations);
        assert_eq!(outcome.error.to_bits(), first.error.to_bits());
        assert_eq!(bits(&outcome.beta), bits(&first.beta));
        assert_eq!(outcome.termination, first.termination);
    }
}

#[tokio::test]
async fn reruns_are_deterministic() {
    let a = solve(2, config()).await;
    let b = solve(2, config()).await;
    assert_eq!(a[0].0.iterations, b[0].0.iterations);
    assert_eq!(bits(&a[0].0.beta), bits(&b[0].0.beta));
    assert_eq!(bits(a[0].1.as_ref().unwrap()), bits(b[0].1.as_ref().unwrap()));
}

#[tokio::test]
async fn iteration_count_barely_depends_on_mesh_size() {
    // Only the summation order differs between mesh sizes.
    let one = solve(1, config()).await[0].0.iterations;
    let three = solve(3, config()).await[0].0.iterations;
    assert!(one.abs_diff(three) <= 2, "P=1: {one}, P=3: {three}");
}

#[tokio::test]
async fn zero_learning_rate_stops_as_non_finite() {
    let results = solve(2, SvmConfig::new(1.0, 0.0, 1e-4)).await;
    for (outcome, _) in &results {
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.error.is_nan());
        assert_eq!(outcome.termination, Termination::NonFinite);
    }
}

#[tokio::test]
async fn iteration_cap_is_honoured() {
    let config = SvmConfig::new(1.0, 0.01, 0.0).with_max_iterations(3);
    let results = solve(3, config).await;
    for (outcome, _) in &results {
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.termination, Termination::IterationCap);
    }
}

#[tokio::test]
async fn overlapping_classes_stay_feasible_every_iteration() {
    // Swapped labels on every fifth row make the data non-separable, so the
    // projection clamps entries on every iteration. Debug builds assert the
    // projected iterate is non-negative inside the loop.
    let data = clusters(45, 8);
    let labels: Vec<f64> = data
        .labels()
        .iter()
        .enumerate()
        .map(|(i, &y)| if i % 5 == 0 { -y } else { y })
        .collect();
    let data = Dataset::new(data.features().clone(), lrsvm_la::DVec::from_vec(labels)).unwrap();
    let parts = data.split(3);
    let config = config().with_max_iterations(40).with_track_cost(true);
    let results = on_mesh(3, move |comm| {
        let part = parts[comm.rank()].clone().into_partition();
        let config = config.clone();
        async move {
            let mut volume = CommCounter::new(comm.size());
            let factors = SvdEngine::new(&comm, 3, 1, 137)
                .run(part.x_hat(), &mut volume)
                .await
                .unwrap();
            let outcome = DualAscent::new(&comm, &config)
                .run(&factors, &part, &mut volume)
                .await
                .unwrap();
            (comm, outcome)
        }
    })
    .await;
    let coordinator = &results[0];
    assert!(coordinator.iterations >= 1 && coordinator.iterations <= 40);
    assert!(coordinator.error.is_finite());
    assert!(coordinator.costs.iter().all(|c| c.is_finite() && *c > 0.0));
}

#[tokio::test]
async fn cost_tracking_records_one_value_per_iteration() {
    let config = config().with_track_cost(true).with_max_iterations(5);
    let results = solve(2, config).await;
    let (coordinator, _) = &results[0];
    assert_eq!(coordinator.costs.len() as u64, coordinator.iterations);
    assert!(coordinator.costs.iter().all(|c| c.is_finite() && *c >= 0.0));
    assert!(results[1].0.costs.is_empty());
}

fn write_csv(path: &Path, data: &Dataset) {
    let mut file = fs::File::create(path).unwrap();
    for i in 0..data.len() {
        let fields: Vec<String> = data.features().row_vec(i).iter().map(|v| v.to_string()).collect();
        writeln!(file, "{},{}", fields.join(","), data.labels()[i]).unwrap();
    }
}

#[tokio::test]
async fn trainer_reads_partitions_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    for (rank, block) in clusters(60, 11).split(2).iter().enumerate() {
        write_csv(&partition_path(dir.path(), rank), block);
    }
    let holdout_file = dir.path().join("clusters_test.csv");
    write_csv(&holdout_file, &clusters(40, 12));

    let report = dir.path().join("clusters_final_results.txt");
    let root = dir.path().to_path_buf();
    let summaries: Vec<TrainSummary> = on_mesh(2, move |comm| {
        let part = Partition::load(partition_path(&root, comm.rank())).unwrap();
        let holdout = Partition::load(&holdout_file).unwrap();
        let report = report.clone();
        async move {
            let summary = Trainer::new(&comm, config().with_trials(2))
                .holdout(holdout)
                .report_to(report)
                .fit(&part)
                .await
                .unwrap();
            (comm, summary)
        }
    })
    .await;

    let coordinator = &summaries[0];
    assert_eq!(coordinator.target_rank, 3);
    assert_eq!(coordinator.trials.len(), 2);
    for t in &coordinator.trials {
        assert_eq!(t.accuracy, Some(100.0));
        assert_eq!(t.termination, Termination::Converged);
        assert_eq!(t.svd_comm, 5 * 9 + 4 * 9);
        assert_eq!(t.da_comm, 3 + 2 * 3 * t.iterations);
    }
    assert!(coordinator.weights.is_some());
    assert!(summaries[1].weights.is_none());
    assert!(summaries[1].trials.iter().all(|t| t.accuracy.is_none()));

    let text = fs::read_to_string(dir.path().join("clusters_final_results.txt")).unwrap();
    assert!(text.contains("Target rank 3"));
    assert!(text.contains("Repeat step 1"));
    assert!(text.contains("Repeat step 2"));
    assert!(text.contains("Accuracy 100"));
    assert!(text.contains("Dual ascent Time = "));
}

#[tokio::test]
async fn mismatched_dimensions_are_rejected() {
    let wide = Dataset::new(DMat::zeros(4, 3), lrsvm_la::DVec::from_slice(&[1.0, -1.0, 1.0, -1.0]))
        .unwrap()
        .into_partition();
    let narrow = clusters(4, 1).into_partition();
    let results = on_mesh(2, move |comm| {
        let part = if comm.is_coordinator() { narrow.clone() } else { wide.clone() };
        async move {
            let result = Trainer::new(&comm, config()).fit(&part).await.map(|_| ());
            (comm, result)
        }
    })
    .await;
    assert!(matches!(results[0], Err(TrainError::PeerFailed { ranks: 1 })));
    assert!(matches!(
        results[1],
        Err(TrainError::DimensionMismatch { rank: 1, expected: 3, got: 4 })
    ));
}

#[tokio::test]
async fn holdout_of_another_width_fails_every_rank() {
    // Three features plus bias against two plus bias in training.
    let holdout = Dataset::new(DMat::zeros(2, 3), lrsvm_la::DVec::from_slice(&[1.0, -1.0]))
        .unwrap()
        .into_partition();
    let parts = clusters(20, 5).split(2);
    let results = on_mesh(2, move |comm| {
        let part = parts[comm.rank()].clone().into_partition();
        let holdout = holdout.clone();
        async move {
            let result = Trainer::new(&comm, config())
                .holdout(holdout)
                .fit(&part)
                .await
                .map(|_| ());
            (comm, result)
        }
    })
    .await;
    assert!(matches!(
        results[0],
        Err(TrainError::HoldoutDimensionMismatch { expected: 3, got: 4 })
    ));
    assert!(matches!(results[1], Err(TrainError::PeerFailed { ranks: 1 })));
}

#[tokio::test]
async fn unwritable_report_fails_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("no_such_dir").join("run_final_results.txt");
    let parts = clusters(20, 5).split(2);
    let results = on_mesh(2, move |comm| {
        let part = parts[comm.rank()].clone().into_partition();
        let report = report.clone();
        async move {
            let result = Trainer::new(&comm, config())
                .report_to(report)
                .fit(&part)
                .await
                .map(|_| ());
            (comm, result)
        }
    })
    .await;
    assert!(matches!(results[0], Err(TrainError::Report { .. })));
    assert!(matches!(results[1], Err(TrainError::PeerFailed { ranks: 1 })));
}
