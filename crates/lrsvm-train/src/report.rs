//! Human-readable run report, appended to `<dataset>_final_results.txt`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::trainer::{TrainSummary, TrialRecord};

/// Report file for a dataset name.
pub fn report_path(dataset: &str) -> PathBuf {
    PathBuf::from(format!("{dataset}_final_results.txt"))
}

/// Writes run sections to any sink. Only the coordinator writes.
pub struct ReportWriter<W: Write> {
    out: W,
}

impl ReportWriter<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, target_rank: usize, ranks: usize) -> io::Result<()> {
        writeln!(self.out, "lrsvm run")?;
        writeln!(self.out, "Target rank {target_rank}")?;
        writeln!(self.out, "Ranks {ranks}")?;
        self.out.flush()
    }

    pub fn trial(&mut self, t: &TrialRecord) -> io::Result<()> {
        writeln!(self.out, "Repeat step {}", t.trial)?;
        if !t.costs.is_empty() {
            writeln!(self.out, "Costs")?;
            for cost in &t.costs {
                writeln!(self.out, "{cost}")?;
            }
        }
        writeln!(self.out, "Total iteration = {}", t.iterations)?;
        writeln!(self.out, "Termination = {}", t.termination.as_str())?;
        writeln!(self.out, "Communication in SVD = {}", t.svd_comm)?;
        writeln!(self.out, "Communication in DA step = {}", t.da_comm)?;
        writeln!(self.out, "Total Communication = {}", t.svd_comm + t.da_comm)?;
        writeln!(self.out, "Per iteration time = {}", seconds(t.per_iteration()))?;
        if let Some(acc) = t.accuracy {
            writeln!(self.out, "Accuracy {acc}")?;
        }
        self.out.flush()
    }

    pub fn averages(&mut self, summary: &TrainSummary) -> io::Result<()> {
        writeln!(self.out, "SVD Time = {}", seconds(summary.mean_svd_time()))?;
        writeln!(self.out, "Dual ascent Time = {}", seconds(summary.mean_dual_time()))?;
        writeln!(self.out, "Total time = {}", seconds(summary.mean_total_time()))?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Seconds, four decimals.
fn seconds(d: Duration) -> String {
    format!("{:.4}", d.as_secs_f64())
}
