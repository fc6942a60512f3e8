//! Per-Site Aggregator (Component B) and its backing per-cell/per-site
//! state (Component F).
//!
//! Grounded on `csp_mplp_push`/`csp_mplp_stat` in `csp_pileup.c`: per-cell
//! base counts and UMI sets reset between sites, with pooled storage
//! retained across resets to amortize allocation.

use ahash::{AHashMap, AHashSet};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{CellGroupMode, Config};
use crate::genotype::{accumulate, qual_matrix_to_geno, QualMatrix, DEFAULT_QUAL_CAP, DEFAULT_TAIL};
use crate::types::NUM_BASES;

/// Per-cell, per-site aggregation state.
///
/// Reset between sites via [`SiteAggregator::begin_site`]; backing
/// allocations (`qu`, `umis`) are retained across resets rather than
/// reallocated, matching the source's pool-backed per-cell buffers.
#[derive(Debug, Default)]
struct SiteCellState {
    bc: [u32; NUM_BASES],
    qu: [Vec<u8>; NUM_BASES],
    umis: AHashSet<Arc<str>>,
}

impl SiteCellState {
    fn reset(&mut self) {
        self.bc = [0; NUM_BASES];
        for q in &mut self.qu {
            q.clear();
        }
        self.umis.clear();
    }

    fn tc(&self) -> u32 {
        self.bc.iter().sum()
    }
}

/// One cell group's contribution to an emitted site.
#[derive(Debug, Clone)]
pub struct CellSiteResult {
    pub cell_idx: usize,
    pub ad: u32,
    pub dp: u32,
    pub oth: u32,
    /// Phred-scaled genotype likelihoods, present only when `is_genotype`.
    pub gl: Option<Vec<u32>>,
}

/// The aggregated result of one emitted site.
#[derive(Debug, Clone)]
pub struct SiteResult {
    pub ref_idx: usize,
    pub alt_idx: usize,
    pub tc: u32,
    pub ad: u32,
    pub dp: u32,
    pub oth: u32,
    pub nr_ad: u32,
    pub nr_dp: u32,
    pub nr_oth: u32,
    /// Per-cell results for cell groups with at least one observation.
    pub cells: Vec<CellSiteResult>,
}

/// Outcome of [`SiteAggregator::finalize`].
pub enum Finalized {
    Emit(SiteResult),
    Skip,
}

/// Drives per-site, per-cell allele counting across one or more input files.
pub struct SiteAggregator {
    cells: Vec<SiteCellState>,
    barcode_index: Option<AHashMap<Arc<str>, usize>>,
    touched: Vec<usize>,
    touched_mask: Vec<bool>,
    preset_ref: Option<usize>,
    preset_alt: Option<usize>,
}

impl SiteAggregator {
    /// Initializes the per-cell-group map and allocates worker-local state.
    pub fn prepare(cfg: &Config) -> Self {
        let num_cells = cfg.cell_groups.num_cells();
        let barcode_index = match &cfg.cell_groups {
            CellGroupMode::Barcodes(v) => {
                let mut m = AHashMap::with_capacity(v.len());
                for (i, bc) in v.iter().enumerate() {
                    m.insert(Arc::clone(bc), i);
                }
                Some(m)
            }
            CellGroupMode::Samples(_) => None,
        };
        Self {
            cells: (0..num_cells).map(|_| SiteCellState::default()).collect(),
            barcode_index,
            touched: Vec::new(),
            touched_mask: vec![false; num_cells],
            preset_ref: None,
            preset_alt: None,
        }
    }

    /// Resets aggregator state for a new site. `target` seeds `ref_idx`
    /// and `alt_idx` in target mode; pass `None` in scan mode so
    /// `finalize` adopts the inferred pair instead.
    pub fn begin_site(&mut self, target: Option<(usize, usize)>) {
        for &i in &self.touched {
            self.cells[i].reset();
            self.touched_mask[i] = false;
        }
        self.touched.clear();
        self.preset_ref = target.map(|(r, _)| r);
        self.preset_alt = target.map(|(_, a)| a);
    }

    /// Resolves the cell-group index for a read.
    ///
    /// Barcode mode: lookup in the declared barcode map; non-member
    /// barcodes are silently dropped. File mode: the cell group is the
    /// source-file ordinal.
    pub fn resolve_cell(&self, barcode: Option<&str>, file_index: usize) -> Option<usize> {
        match &self.barcode_index {
            Some(map) => barcode.and_then(|b| map.get(b).copied()),
            None => Some(file_index),
        }
    }

    /// Records one filter-passed read's observation at the current site.
    ///
    /// In UMI mode, a UMI already seen for this (site, cell) contributes
    /// nothing further — the retained base/quality is that of the first
    /// read observed for that UMI (see the documented loss-tolerance in
    /// `SPEC_FULL.md` §9).
    pub fn push(
        &mut self,
        cell_idx: usize,
        base_idx: usize,
        qual: u8,
        umi: Option<&Arc<str>>,
        track_quality: bool,
    ) {
        let cell = &mut self.cells[cell_idx];
        if let Some(umi) = umi {
            if !cell.umis.insert(Arc::clone(umi)) {
                return;
            }
        }
        cell.bc[base_idx] += 1;
        if track_quality {
            cell.qu[base_idx].push(qual);
        }
        if !self.touched_mask[cell_idx] {
            self.touched_mask[cell_idx] = true;
            self.touched.push(cell_idx);
        }
    }

    /// Aggregates per-cell sums into global sums and decides emit vs skip.
    pub fn finalize(&mut self, cfg: &Config) -> Finalized {
        let mut bc = [0u32; NUM_BASES];
        for &i in &self.touched {
            for (b, count) in bc.iter_mut().enumerate() {
                *count += self.cells[i].bc[b];
            }
        }
        let tc: u32 = bc.iter().sum();
        if tc == 0 || tc < cfg.min_count {
            return Finalized::Skip;
        }

        // Canonical order A<C<G<T; ties keep the lower index (first-wins).
        let inf_rid = (0..4)
            .max_by(|&a, &b| bc[a].cmp(&bc[b]).then(Ordering::Greater))
            .unwrap();
        let inf_aid = (0..4)
            .filter(|&i| i != inf_rid)
            .max_by(|&a, &b| bc[a].cmp(&bc[b]).then(Ordering::Greater))
            .unwrap();

        if (bc[inf_aid] as f64) < tc as f64 * cfg.min_maf {
            return Finalized::Skip;
        }

        let ref_idx = self.preset_ref.unwrap_or(inf_rid);
        let alt_idx = self.preset_alt.unwrap_or(inf_aid);

        let ad = bc[alt_idx];
        let dp = bc[ref_idx] + ad;
        let oth = tc - dp;

        let (mut nr_ad, mut nr_dp, mut nr_oth) = (0u32, 0u32, 0u32);
        let mut cells = Vec::with_capacity(self.touched.len());
        for &i in &self.touched {
            let cell = &self.cells[i];
            let cad = cell.bc[alt_idx];
            let cdp = cell.bc[ref_idx] + cad;
            let ctc = cell.tc();
            let coth = ctc - cdp;
            if cad > 0 {
                nr_ad += 1;
            }
            if cdp > 0 {
                nr_dp += 1;
            }
            if coth > 0 {
                nr_oth += 1;
            }

            let gl = cfg.is_genotype.then(|| {
                let mut qmat: QualMatrix = Default::default();
                for (base, quals) in cell.qu.iter().enumerate() {
                    for &q in quals {
                        accumulate(&mut qmat, q, base, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
                    }
                }
                qual_matrix_to_geno(&qmat, ref_idx, alt_idx, cfg.double_gl)
            });

            cells.push(CellSiteResult {
                cell_idx: i,
                ad: cad,
                dp: cdp,
                oth: coth,
                gl,
            });
        }

        Finalized::Emit(SiteResult {
            ref_idx,
            alt_idx,
            tc,
            ad,
            dp,
            oth,
            nr_ad,
            nr_dp,
            nr_oth,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellGroupMode, RunMode};
    use crate::types::{base_index, BASE_A, BASE_T};

    fn cfg_with_cells(n: usize) -> Config {
        let mut c = Config::new();
        c.cell_groups = CellGroupMode::Samples((0..n).map(|i| Arc::from(format!("s{i}"))).collect());
        c.run_mode = RunMode::Scan {
            chroms: vec![Arc::from("chr1")],
        };
        c.min_count = 1;
        c.min_maf = 0.0;
        c
    }

    /// S1 — scan, no UMI, 2 cells, 1 site.
    #[test]
    fn scan_no_umi_two_cells() {
        let cfg = cfg_with_cells(2);
        let mut agg = SiteAggregator::prepare(&cfg);
        agg.begin_site(None);
        agg.push(0, base_index(b'A'), 30, None, false);
        agg.push(0, base_index(b'A'), 30, None, false);
        agg.push(1, base_index(b'T'), 30, None, false);

        match agg.finalize(&cfg) {
            Finalized::Emit(site) => {
                assert_eq!(site.ref_idx, BASE_A);
                assert_eq!(site.alt_idx, BASE_T);
                assert_eq!(site.ad, 1);
                assert_eq!(site.dp, 3);
                assert_eq!(site.oth, 0);
                let c0 = site.cells.iter().find(|c| c.cell_idx == 0).unwrap();
                assert_eq!((c0.ad, c0.dp, c0.oth), (0, 2, 0));
                let c1 = site.cells.iter().find(|c| c.cell_idx == 1).unwrap();
                assert_eq!((c1.ad, c1.dp, c1.oth), (1, 1, 0));
            }
            Finalized::Skip => panic!("expected emit"),
        }
    }

    /// A real count tie (A=2, C=2) must infer ref=A, alt=C: the lower
    /// canonical index wins ties, not the later one.
    #[test]
    fn inferred_allele_tie_break_favors_lower_canonical_index() {
        let cfg = cfg_with_cells(1);
        let mut agg = SiteAggregator::prepare(&cfg);
        agg.begin_site(None);
        agg.push(0, base_index(b'A'), 30, None, false);
        agg.push(0, base_index(b'A'), 30, None, false);
        agg.push(0, base_index(b'C'), 30, None, false);
        agg.push(0, base_index(b'C'), 30, None, false);

        match agg.finalize(&cfg) {
            Finalized::Emit(site) => {
                assert_eq!(site.ref_idx, BASE_A);
                assert_eq!(site.alt_idx, base_index(b'C'));
            }
            Finalized::Skip => panic!("expected emit"),
        }
    }

    /// S2 — UMI dedup: three reads, UMIs AAAA, AAAA, CCCC, all base G.
    #[test]
    fn umi_dedup_collapses_repeat_umi() {
        let cfg = cfg_with_cells(1);
        let mut agg = SiteAggregator::prepare(&cfg);
        agg.begin_site(None);
        let u1: Arc<str> = Arc::from("AAAA");
        let u2: Arc<str> = Arc::from("CCCC");
        agg.push(0, base_index(b'G'), 30, Some(&u1), false);
        agg.push(0, base_index(b'G'), 30, Some(&u1), false);
        agg.push(0, base_index(b'G'), 30, Some(&u2), false);

        match agg.finalize(&cfg) {
            Finalized::Emit(site) => {
                let c0 = &site.cells[0];
                // bc[G] should be 2, not 3.
                assert_eq!(c0.dp + c0.oth, 2);
            }
            Finalized::Skip => panic!("expected emit"),
        }
    }

    /// S3 — min_maf filter skips a monoallelic site.
    #[test]
    fn min_maf_filter_skips_monoallelic_site() {
        let mut cfg = cfg_with_cells(1);
        cfg.min_count = 5;
        cfg.min_maf = 0.1;
        let mut agg = SiteAggregator::prepare(&cfg);
        agg.begin_site(None);
        for _ in 0..10 {
            agg.push(0, base_index(b'A'), 30, None, false);
        }
        assert!(matches!(agg.finalize(&cfg), Finalized::Skip));
    }

    /// S4 — target mode with pre-specified ref/alt overrides the inferred pair.
    #[test]
    fn target_mode_uses_preset_ref_alt() {
        let cfg = cfg_with_cells(1);
        let mut agg = SiteAggregator::prepare(&cfg);
        // SNP list says ref=C (1), alt=G (2).
        agg.begin_site(Some((1, 2)));
        for _ in 0..4 {
            agg.push(0, base_index(b'A'), 30, None, false);
        }
        agg.push(0, base_index(b'G'), 30, None, false);

        match agg.finalize(&cfg) {
            Finalized::Emit(site) => {
                assert_eq!(site.ref_idx, 1);
                assert_eq!(site.alt_idx, 2);
                assert_eq!(site.ad, 1);
                assert_eq!(site.dp, 1);
                assert_eq!(site.oth, 4);
            }
            Finalized::Skip => panic!("expected emit"),
        }
    }

    #[test]
    fn zero_reads_always_skipped_even_with_zero_min_count() {
        let mut cfg = cfg_with_cells(1);
        cfg.min_count = 0;
        let mut agg = SiteAggregator::prepare(&cfg);
        agg.begin_site(None);
        assert!(matches!(agg.finalize(&cfg), Finalized::Skip));
    }

    #[test]
    fn barcode_resolution_drops_non_member_barcodes() {
        let mut cfg = cfg_with_cells(1);
        cfg.cell_groups = CellGroupMode::Barcodes(vec![Arc::from("AAAA-1")]);
        let agg = SiteAggregator::prepare(&cfg);
        assert_eq!(agg.resolve_cell(Some("AAAA-1"), 0), Some(0));
        assert_eq!(agg.resolve_cell(Some("ZZZZ-9"), 0), None);
    }
}
