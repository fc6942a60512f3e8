//! Target-region index: the membership test the Chromosome Worker consults
//! to decide which positions to visit.

use ahash::AHashMap;

use crate::types::SnpRecord;

/// Membership test over genomic positions for one chromosome at a time.
pub trait RegionIndex: Send + Sync {
    /// `true` if `pos` (0-based) on `chrom` should be visited.
    fn contains(&self, chrom: &str, pos: i64) -> bool;

    /// Sorted target positions for `chrom`, or `None` in scan mode (every
    /// position is a candidate and the worker drives iteration itself).
    fn targets_for(&self, chrom: &str) -> Option<&[SnpRecord]>;
}

/// Scan mode: every position is a candidate; the worker advances one base
/// at a time and relies on the active read set being empty to fast-forward.
pub struct ScanIndex;

impl RegionIndex for ScanIndex {
    fn contains(&self, _chrom: &str, _pos: i64) -> bool {
        true
    }

    fn targets_for(&self, _chrom: &str) -> Option<&[SnpRecord]> {
        None
    }
}

/// Target mode: only the positions named in the SNP list are visited.
pub struct TargetIndex {
    by_chrom: AHashMap<String, Vec<SnpRecord>>,
}

impl TargetIndex {
    /// Groups and sorts SNP records by chromosome and ascending position.
    pub fn new(snps: Vec<SnpRecord>) -> Self {
        let mut by_chrom: AHashMap<String, Vec<SnpRecord>> = AHashMap::new();
        for snp in snps {
            by_chrom.entry(snp.chrom.to_string()).or_default().push(snp);
        }
        for records in by_chrom.values_mut() {
            records.sort_by_key(|r| r.pos);
        }
        Self { by_chrom }
    }
}

impl RegionIndex for TargetIndex {
    fn contains(&self, chrom: &str, pos: i64) -> bool {
        self.by_chrom
            .get(chrom)
            .is_some_and(|v| v.binary_search_by_key(&pos, |r| r.pos).is_ok())
    }

    fn targets_for(&self, chrom: &str) -> Option<&[SnpRecord]> {
        self.by_chrom.get(chrom).map(Vec::as_slice)
    }
}
