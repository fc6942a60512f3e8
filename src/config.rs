//! Configuration and defaults for scpileup.
//!
//! This module contains the configuration structure and default values
//! that control the pileup-and-aggregation behavior.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// How cell groups are identified.
#[derive(Debug, Clone)]
pub enum CellGroupMode {
    /// Reads are grouped by a cell-barcode auxiliary tag; the declared
    /// barcode order fixes column order in the output matrices.
    Barcodes(Vec<Arc<str>>),
    /// Reads are grouped by source file ordinal; the declared sample-id
    /// order fixes column order in the output matrices.
    Samples(Vec<Arc<str>>),
}

impl CellGroupMode {
    /// Number of cell-group columns.
    pub fn num_cells(&self) -> usize {
        match self {
            CellGroupMode::Barcodes(v) => v.len(),
            CellGroupMode::Samples(v) => v.len(),
        }
    }
}

/// How sites to visit are determined.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Scan every position of the listed chromosomes.
    Scan { chroms: Vec<Arc<str>> },
    /// Visit only the positions named in the SNP list, grouped by chromosome.
    Target { chroms: Vec<Arc<str>> },
}

impl RunMode {
    pub fn chroms(&self) -> &[Arc<str>] {
        match self {
            RunMode::Scan { chroms } => chroms,
            RunMode::Target { chroms } => chroms,
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, RunMode::Target { .. })
    }
}

/// Immutable configuration for a pileup run, shared read-only across workers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lower mapping-quality bound, inclusive.
    pub min_mapq: u8,
    /// Minimum total M/=/X CIGAR length.
    pub min_len: u32,
    /// Minimum total retained reads at a site to emit.
    pub min_count: u32,
    /// Minimum minor-allele fraction of `tc`, in `[0, 0.5]`.
    pub min_maf: f64,
    /// Bitmask: reads with any of these flags set are rejected.
    pub rflag_filter: u16,
    /// Bitmask: reads must have all of these flags set.
    pub rflag_require: u16,
    /// Reject paired-but-not-proper-pair reads.
    pub no_orphan: bool,
    /// Pileup depth cap; `<= 0` means unbounded.
    pub plp_max_depth: i64,
    /// Auxiliary tag name for the cell barcode; `None` means per-file cell groups.
    pub cell_tag: Option<Arc<str>>,
    /// Auxiliary tag name for the UMI; `None` means UMI mode is off.
    pub umi_tag: Option<Arc<str>>,
    /// Compute and emit genotype likelihoods.
    pub is_genotype: bool,
    /// Emit a 10-entry PL vector instead of 3-entry.
    pub double_gl: bool,
    /// Worker pool size.
    pub nthread: usize,
    /// Write gzip-compressed temporary and final files.
    pub is_out_zip: bool,
    /// Cell-group identification mode.
    pub cell_groups: CellGroupMode,
    /// Site-selection mode.
    pub run_mode: RunMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_mapq: 20,
            min_len: 30,
            min_count: 20,
            min_maf: 0.0,
            rflag_filter: 0x704, // UNMAPPED | SECONDARY | QC_FAIL | DUPLICATE
            rflag_require: 0,
            no_orphan: false,
            plp_max_depth: 0,
            cell_tag: Some(Arc::from("CB")),
            umi_tag: Some(Arc::from("UB")),
            is_genotype: false,
            double_gl: false,
            nthread: 1,
            is_out_zip: false,
            cell_groups: CellGroupMode::Samples(vec![Arc::from("sample1")]),
            run_mode: RunMode::Scan {
                chroms: vec![Arc::from("chr1")],
            },
        }
    }
}

impl Config {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate field ranges and mode invariants.
    ///
    /// Mirrors the teacher's pre-flight validation of percentage/rule
    /// fields before a run begins, generalized to this domain's knobs.
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=0.5).contains(&self.min_maf) {
            return Err(CoreError::InvalidConfig(format!(
                "min_maf must be in [0, 0.5], got {}",
                self.min_maf
            )));
        }
        if self.nthread == 0 {
            return Err(CoreError::InvalidConfig(
                "nthread must be at least 1".to_string(),
            ));
        }
        if self.cell_groups.num_cells() == 0 {
            return Err(CoreError::InvalidConfig(
                "at least one cell group is required".to_string(),
            ));
        }
        if self.run_mode.chroms().is_empty() {
            return Err(CoreError::InvalidConfig(
                "at least one chromosome is required".to_string(),
            ));
        }
        if self.double_gl && !self.is_genotype {
            return Err(CoreError::InvalidConfig(
                "double_gl requires is_genotype".to_string(),
            ));
        }
        Ok(())
    }

    /// `true` when UMI deduplication is active.
    pub fn umi_mode(&self) -> bool {
        self.umi_tag.is_some()
    }

    /// `true` when reads are grouped by barcode rather than by file.
    pub fn barcode_mode(&self) -> bool {
        matches!(self.cell_groups, CellGroupMode::Barcodes(_))
    }

    /// Length of the genotype-likelihood vector emitted per cell, if enabled.
    pub fn ngl(&self) -> usize {
        if !self.is_genotype {
            0
        } else if self.double_gl {
            10
        } else {
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.min_mapq, 20);
        assert_eq!(config.min_len, 30);
        assert_eq!(config.min_count, 20);
        assert_eq!(config.min_maf, 0.0);
        assert!(!config.is_genotype);
        assert_eq!(config.nthread, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_min_maf() {
        let mut config = Config::new();
        config.min_maf = 0.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let mut config = Config::new();
        config.nthread = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_cell_groups() {
        let mut config = Config::new();
        config.cell_groups = CellGroupMode::Barcodes(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_double_gl_without_genotype() {
        let mut config = Config::new();
        config.is_genotype = false;
        config.double_gl = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ngl() {
        let mut config = Config::new();
        assert_eq!(config.ngl(), 0);
        config.is_genotype = true;
        assert_eq!(config.ngl(), 3);
        config.double_gl = true;
        assert_eq!(config.ngl(), 10);
    }

    #[test]
    fn test_umi_and_barcode_mode() {
        let mut config = Config::new();
        assert!(config.umi_mode());
        assert!(!config.barcode_mode());

        config.umi_tag = None;
        config.cell_groups = CellGroupMode::Barcodes(vec![Arc::from("AAAA-1")]);
        assert!(!config.umi_mode());
        assert!(config.barcode_mode());
    }
}
