#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bootstrap;
pub mod config;
pub mod crosscov;
pub mod decompose;
pub mod linalg;
pub mod permutation;
pub mod pipeline;
pub mod procrustes;
pub mod progress;
pub mod resample;
pub mod result;
pub mod split_half;
pub mod standardize;
pub mod types;

pub use config::{PlsConfig, ResolvedConfig, StorageError};
pub use crosscov::{CrossBlockMode, xcorr, xcov};
pub use pipeline::{behavioral_pls, behavioral_pls_with};
pub use progress::{NoopProgress, ResampleProgress};
pub use resample::CancellationToken;
pub use result::{
    BootstrapResult, EntryStats, PermutationResult, PlsResult, SplitHalfResult,
};
pub use types::{Block, Dataset, PlsError, Procedure};
