//! Read Filter (Component A): per-read admission rules.
//!
//! Grounded on `pileup_read()` in `csp_pileup.c`, which applies the same
//! cheapest-first rejection order: alignment flags before tag lookups
//! before the CIGAR walk.

use crate::config::Config;
use crate::types::{AlignedRead, PileupColumn};

/// Why a read was rejected by [`admit_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unmapped,
    LowMapq,
    FlagFiltered,
    FlagRequired,
    Orphan,
    MissingUmi,
    MissingBarcode,
    TooShort,
    DeletionOrSkip,
}

/// Applies the nine admission rules in order, short-circuiting on the
/// first failure.
pub fn admit_read(read: &AlignedRead, ref_pos: i64, cfg: &Config) -> Result<(), RejectReason> {
    if read.is_unmapped() {
        return Err(RejectReason::Unmapped);
    }
    if read.mapq < cfg.min_mapq {
        return Err(RejectReason::LowMapq);
    }
    if read.flag & cfg.rflag_filter != 0 {
        return Err(RejectReason::FlagFiltered);
    }
    if read.flag & cfg.rflag_require != cfg.rflag_require {
        return Err(RejectReason::FlagRequired);
    }
    if cfg.no_orphan && read.is_paired() && !read.is_proper_pair() {
        return Err(RejectReason::Orphan);
    }
    if cfg.umi_mode() && read.umi.as_deref().is_none_or(str::is_empty) {
        return Err(RejectReason::MissingUmi);
    }
    if cfg.barcode_mode() && read.cell_barcode.as_deref().is_none_or(str::is_empty) {
        return Err(RejectReason::MissingBarcode);
    }
    if cfg.min_len > 0 && read.aligned_len() < cfg.min_len {
        return Err(RejectReason::TooShort);
    }
    match read.column_at(ref_pos) {
        PileupColumn::Deletion | PileupColumn::RefSkip => {
            return Err(RejectReason::DeletionOrSkip)
        }
        _ => {}
    }
    Ok(())
}
