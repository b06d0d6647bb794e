//! Repeated-trial training loop.
//!
//! ```ignore
//! let summary = Trainer::new(&comm, SvmConfig::new(1.0, 0.01, 1e-4))
//!     .holdout(Partition::load("iris_test.csv")?)
//!     .report_to("iris_final_results.txt")
//!     .fit(&partition)
//!     .await?;
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use lrsvm_la::DMat;
use lrsvm_mesh::{CommCounter, Communicator};
use tracing::info;

use crate::config::SvmConfig;
use crate::data::Partition;
use crate::dual::{DualAscent, Termination};
use crate::error::TrainError;
use crate::eval::accuracy;
use crate::objective::primal_weights;
use crate::report::ReportWriter;
use crate::svd::SvdEngine;

/// Measurements from one trial on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialRecord {
    /// 1-based.
    pub trial: usize,
    pub iterations: u64,
    pub termination: Termination,
    /// Scalars moved during the SVD.
    pub svd_comm: u64,
    /// Scalars moved during dual ascent.
    pub da_comm: u64,
    pub svd_time: Duration,
    /// Dual ascent including setup.
    pub dual_time: Duration,
    /// Dual ascent iteration loop only.
    pub loop_time: Duration,
    pub total_time: Duration,
    /// Primal objective per iteration (coordinator, cost tracking on).
    pub costs: Vec<f64>,
    /// Holdout accuracy in percent (coordinator, holdout supplied).
    pub accuracy: Option<f64>,
}

impl TrialRecord {
    /// Mean wall time of one dual-ascent iteration.
    pub fn per_iteration(&self) -> Duration {
        match u32::try_from(self.iterations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.loop_time / n,
            Err(_) => Duration::from_secs_f64(self.loop_time.as_secs_f64() / self.iterations as f64),
        }
    }
}

/// All trials of a run.
#[derive(Clone, Debug)]
pub struct TrainSummary {
    pub target_rank: usize,
    pub trials: Vec<TrialRecord>,
    /// Primal weights of the last trial, bias last. Coordinator only.
    pub weights: Option<DMat>,
}

impl TrainSummary {
    fn mean(&self, f: impl Fn(&TrialRecord) -> Duration) -> Duration {
        if self.trials.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.trials.iter().map(f).sum();
        total / self.trials.len() as u32
    }

    pub fn mean_svd_time(&self) -> Duration {
        self.mean(|t| t.svd_time)
    }

    pub fn mean_dual_time(&self) -> Duration {
        self.mean(|t| t.dual_time)
    }

    pub fn mean_total_time(&self) -> Duration {
        self.mean(|t| t.total_time)
    }
}

/// Drives SVD + dual ascent `config.trials` times on one rank.
pub struct Trainer<'a> {
    comm: &'a Communicator,
    config: SvmConfig,
    holdout: Option<Partition>,
    report: Option<PathBuf>,
}

impl<'a> Trainer<'a> {
    pub fn new(comm: &'a Communicator, config: SvmConfig) -> Self {
        Self { comm, config, holdout: None, report: None }
    }

    /// Labelled rows scored after every trial. Only used on the coordinator.
    pub fn holdout(mut self, holdout: Partition) -> Self {
        self.holdout = Some(holdout);
        self
    }

    /// Append the report to `path`. Only the coordinator writes.
    pub fn report_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.report = Some(path.into());
        self
    }

    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    /// Run every trial. Collective: all ranks call it with their own partition.
    ///
    /// Before the first trial the ranks agree that they can start: a
    /// partition or coordinator holdout whose width differs from the
    /// coordinator's partition, or a report the coordinator cannot open,
    /// fails the call on every rank. Errors after that point are local. If
    /// the coordinator cannot write the report mid-run it returns while the
    /// workers stay blocked in the next collective.
    pub async fn fit(&self, partition: &Partition) -> Result<TrainSummary, TrainError> {
        let comm = self.comm;
        let d = partition.dim();
        let k = self.config.rank_for(d);
        let expected = comm
            .broadcast_scalar(comm.is_coordinator().then_some(d as f64))
            .await? as usize;
        let holdout_width = match &self.holdout {
            Some(holdout) if comm.is_coordinator() && holdout.dim() != d => Some(holdout.dim()),
            _ => None,
        };
        let report = match (&self.report, comm.is_coordinator()) {
            (Some(path), true) => Some(open_report(path, k, comm.size()).map(|w| (path, w))),
            _ => None,
        };

        // Every rank has to learn about a failed check, or the others would
        // block in the first SVD round.
        let failed = expected != d || holdout_width.is_some() || matches!(report, Some(Err(_)));
        let failures = comm.all_reduce_scalar(f64::from(u8::from(failed))).await? as usize;
        if expected != d {
            return Err(TrainError::DimensionMismatch { rank: comm.rank(), expected, got: d });
        }
        if let Some(got) = holdout_width {
            return Err(TrainError::HoldoutDimensionMismatch { expected: d, got });
        }
        let mut report = report.transpose()?;
        if failures > 0 {
            return Err(TrainError::PeerFailed { ranks: failures });
        }

        info!(
            topology = %comm.topology(),
            rows = partition.len(),
            d,
            target_rank = k,
            "training started"
        );

        let mut svd_comm = CommCounter::new(comm.size());
        let mut da_comm = CommCounter::new(comm.size());
        let mut trials = Vec::with_capacity(self.config.trials);
        let mut weights = None;

        for trial in 1..=self.config.trials {
            svd_comm.reset();
            da_comm.reset();

            let started = Instant::now();
            let factors = SvdEngine::new(comm, k, self.config.power_iterations, self.config.seed)
                .run(partition.x_hat(), &mut svd_comm)
                .await?;
            let svd_time = started.elapsed();

            let dual_started = Instant::now();
            let outcome = DualAscent::new(comm, &self.config)
                .run(&factors, partition, &mut da_comm)
                .await?;
            let dual_time = dual_started.elapsed();
            let total_time = started.elapsed();

            let w = outcome.alpha.as_ref().map(|alpha| primal_weights(&factors, alpha));
            let accuracy = match (&self.holdout, &w) {
                (Some(holdout), Some(w)) => Some(accuracy(holdout, w).percent()),
                _ => None,
            };

            let record = TrialRecord {
                trial,
                iterations: outcome.iterations,
                termination: outcome.termination,
                svd_comm: svd_comm.scalars(),
                da_comm: da_comm.scalars(),
                svd_time,
                dual_time,
                loop_time: outcome.loop_time,
                total_time,
                costs: outcome.costs,
                accuracy,
            };

            if comm.is_coordinator() {
                info!(
                    trial,
                    iterations = record.iterations,
                    termination = record.termination.as_str(),
                    svd_comm = record.svd_comm,
                    da_comm = record.da_comm,
                    accuracy = ?record.accuracy,
                    "trial finished"
                );
            }
            if let Some((path, writer)) = report.as_mut() {
                writer
                    .trial(&record)
                    .map_err(|source| TrainError::Report { path: path.to_path_buf(), source })?;
            }

            trials.push(record);
            weights = w;
        }

        let summary = TrainSummary { target_rank: k, trials, weights };
        if let Some((path, writer)) = report.as_mut() {
            writer
                .averages(&summary)
                .map_err(|source| TrainError::Report { path: path.to_path_buf(), source })?;
        }
        Ok(summary)
    }
}

/// Open the report for appending and write the run header.
fn open_report(
    path: &Path,
    target_rank: usize,
    ranks: usize,
) -> Result<ReportWriter<BufWriter<File>>, TrainError> {
    let report_error = |source| TrainError::Report { path: path.to_path_buf(), source };
    let mut writer = ReportWriter::append(path).map_err(report_error)?;
    writer.header(target_rank, ranks).map_err(report_error)?;
    Ok(writer)
}
