//! lrsvm: train a linear SVM on row-partitioned data.
//!
//! Every rank runs this binary with the same positional arguments. Rank 0
//! listens on `--coordinator`, the others connect to it:
//!
//! ```text
//! lrsvm 1.0 0.01 1e-4 iris --rank 0 --size 3 --coordinator 10.0.0.1:7070
//! lrsvm 1.0 0.01 1e-4 iris --rank 1 --size 3 --coordinator 10.0.0.1:7070
//! lrsvm 1.0 0.01 1e-4 iris --rank 2 --size 3 --coordinator 10.0.0.1:7070
//! ```
//!
//! `--local P` runs all P ranks as tasks of one process instead.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use lrsvm_mesh::{Communicator, Mesh, COORDINATOR};
use lrsvm_train::{
    holdout_path, partition_path, report_path, Dataset, Partition, SvmConfig, Trainer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lrsvm", version, about = "Distributed low-rank linear SVM training")]
struct Cli {
    /// Regularization constant
    #[arg(value_name = "C")]
    c: f64,

    /// Learning rate of the dual ascent
    learn_rate: f64,

    /// Stop once the L1 change of Uᵀb falls to this value
    thresh: f64,

    /// Dataset name; holdout is `<dataset>_test.csv`, report `<dataset>_final_results.txt`
    dataset: String,

    /// This process's rank
    #[arg(long, default_value_t = 0)]
    rank: usize,

    /// Number of ranks
    #[arg(long, default_value_t = 1)]
    size: usize,

    /// Coordinator address: bound by rank 0, dialed by the others
    #[arg(long, default_value = "127.0.0.1:7070")]
    coordinator: String,

    /// Run P ranks inside this process
    #[arg(long, value_name = "P", conflicts_with_all = ["rank", "size"])]
    local: Option<usize>,

    /// Directory holding `data_part_<rank>.csv`
    #[arg(long, default_value = "partitions")]
    partitions: PathBuf,

    /// With --local, split this file across the ranks instead of reading partitions
    #[arg(long, requires = "local")]
    train_file: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    power_iterations: usize,

    /// Seed of the shared random projection
    #[arg(long, default_value_t = 137)]
    seed: u64,

    #[arg(long, default_value_t = 5)]
    trials: usize,

    /// Rank of the factorization (default: feature count + 1)
    #[arg(long)]
    target_rank: Option<usize>,

    /// Record the primal objective every iteration
    #[arg(long)]
    track_cost: bool,

    #[arg(long)]
    max_iterations: Option<u64>,

    /// Log dual-ascent progress every N iterations
    #[arg(long, default_value_t = 100)]
    log_every: u64,
}

impl Cli {
    fn config(&self) -> SvmConfig {
        let mut config = SvmConfig::new(self.c, self.learn_rate, self.thresh)
            .with_power_iterations(self.power_iterations)
            .with_seed(self.seed)
            .with_trials(self.trials)
            .with_track_cost(self.track_cost)
            .with_log_every(self.log_every);
        if let Some(k) = self.target_rank {
            config = config.with_target_rank(k);
        }
        if let Some(n) = self.max_iterations {
            config = config.with_max_iterations(n);
        }
        config
    }
}

/// Everything one rank needs besides its communicator and rows.
struct Job {
    config: SvmConfig,
    holdout: Option<Partition>,
    report: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.local {
        Some(size) => run_local(&cli, size).await,
        None => run_rank(&cli).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_partition(dir: &Path, rank: usize) -> Result<Partition> {
    let path = partition_path(dir, rank);
    Partition::load(&path).with_context(|| format!("loading partition {}", path.display()))
}

fn load_holdout(dataset: &str) -> Result<Partition> {
    let path = holdout_path(dataset);
    Partition::load(&path).with_context(|| format!("loading holdout {}", path.display()))
}

/// All ranks as tasks of this process.
async fn run_local(cli: &Cli, size: usize) -> Result<()> {
    if size == 0 {
        bail!("--local needs at least one rank");
    }
    let partitions: Vec<Partition> = match &cli.train_file {
        Some(path) => Dataset::read_csv(path)
            .with_context(|| format!("loading {}", path.display()))?
            .split(size)
            .into_iter()
            .map(Dataset::into_partition)
            .collect(),
        None => (0..size)
            .map(|rank| load_partition(&cli.partitions, rank))
            .collect::<Result<_>>()?,
    };
    let mut holdout = Some(load_holdout(&cli.dataset)?);

    let mesh = Mesh::local(size).await.context("building the local mesh")?;
    info!(size, "local mesh ready");

    let mut handles = Vec::with_capacity(size);
    for (comm, partition) in mesh.into_iter().zip(partitions) {
        let job = Job {
            config: cli.config(),
            holdout: if comm.is_coordinator() { holdout.take() } else { None },
            report: report_path(&cli.dataset),
        };
        handles.push(tokio::spawn(train(comm, partition, job)));
    }
    for handle in handles {
        handle.await.context("rank task panicked")??;
    }
    Ok(())
}

/// One rank of a TCP mesh.
async fn run_rank(cli: &Cli) -> Result<()> {
    if cli.rank >= cli.size {
        bail!("--rank {} is out of range for --size {}", cli.rank, cli.size);
    }
    let partition = load_partition(&cli.partitions, cli.rank)?;
    let holdout = if cli.rank == COORDINATOR { Some(load_holdout(&cli.dataset)?) } else { None };

    let comm = if cli.size == 1 {
        Communicator::single()
    } else if cli.rank == COORDINATOR {
        let comm = Communicator::listen_tcp(cli.coordinator.as_str(), cli.size)
            .await
            .with_context(|| format!("listening on {}", cli.coordinator))?;
        info!(addr = ?comm.local_addr(), size = cli.size, "waiting for workers");
        comm
    } else {
        Communicator::connect_tcp(&cli.coordinator, cli.rank, cli.size)
            .await
            .with_context(|| format!("joining the coordinator at {}", cli.coordinator))?
    };

    let job = Job { config: cli.config(), holdout, report: report_path(&cli.dataset) };
    train(comm, partition, job).await
}

async fn train(comm: Communicator, partition: Partition, job: Job) -> Result<()> {
    let topology = comm.topology();
    let summary = {
        let mut trainer = Trainer::new(&comm, job.config);
        if let Some(holdout) = job.holdout {
            trainer = trainer.holdout(holdout);
        }
        if comm.is_coordinator() {
            trainer = trainer.report_to(job.report);
        }
        trainer
            .fit(&partition)
            .await
            .with_context(|| format!("training failed on {topology}"))?
    };
    comm.finish().await.with_context(|| format!("leaving the mesh from {topology}"))?;

    if let Some(w) = &summary.weights {
        info!(
            weights = ?w.as_slice(),
            svd_secs = summary.mean_svd_time().as_secs_f64(),
            dual_secs = summary.mean_dual_time().as_secs_f64(),
            total_secs = summary.mean_total_time().as_secs_f64(),
            "training finished"
        );
    }
    Ok(())
}
