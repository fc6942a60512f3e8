//! scpileup - single-cell SNP pileup engine core.
//!
//! Counts per-cell alleles at a set of genomic sites from aligned-read
//! input, applying mapping/flag/length filters and optional UMI
//! deduplication, and emits sparse MatrixMarket allele-depth matrices
//! (AD/DP/OTH) plus VCF records. Chromosomes are sharded across a worker
//! pool; shard outputs are merged into the final files by a single
//! renumbering pass.
//!
//! # Example
//!
//! ```ignore
//! use scpileup::config::Config;
//! use scpileup::io::FixtureSource;
//! use std::path::Path;
//!
//! let config = Config::default();
//! let source = FixtureSource::from_path(Path::new("reads.txt"))?;
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod genotype;
pub mod io;
pub mod merger;
pub mod output;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use types::{AlignedRead, CigarOp, SnpRecord};
