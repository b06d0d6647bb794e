//! lrsvm-train: linear SVM training on a low-rank factorization of the data.
//!
//! Every rank loads its own row block, augments it with a bias column and
//! scales each row by its label. The ranks then jointly compute a rank-k
//! randomized SVD `X̂ ≈ U·S·Vᵀ` ([`SvdEngine`]) and run projected dual
//! ascent in the k-dimensional space spanned by `S`, `V` ([`DualAscent`]).
//! [`Trainer`] repeats both for a number of trials and writes the report.
//!
//! All collective calls go through an [`lrsvm_mesh::Communicator`]; the
//! same code runs unchanged on one rank or many.

pub mod config;
pub mod data;
pub mod dual;
pub mod error;
pub mod eval;
pub mod objective;
pub mod report;
pub mod rng;
pub mod svd;
pub mod trainer;

pub use config::SvmConfig;
pub use data::{holdout_path, partition_path, Dataset, Partition};
pub use dual::{project_nonnegative, DualAscent, DualOutcome, Termination};
pub use error::{DataError, TrainError};
pub use eval::{accuracy, Accuracy};
pub use objective::{hinge_sum, primal_weights};
pub use report::{report_path, ReportWriter};
pub use rng::Rng;
pub use svd::{LowRankFactors, SvdEngine};
pub use trainer::{TrainSummary, Trainer, TrialRecord};
