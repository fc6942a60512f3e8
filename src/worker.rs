//! Chromosome Worker (Component C): processes one chromosome end-to-end,
//! writing shard-local temp outputs.
//!
//! The scan-mode sweep is grounded on the classic active-read-window
//! pileup algorithm (`csp_pileup.c`'s `mplp` loop): reads are admitted to
//! an active set once their start position is reached and dropped once
//! their reference span ends, so gaps with no covering read are skipped
//! rather than visited one base at a time.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aggregator::{Finalized, SiteAggregator};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::filter::admit_read;
use crate::io::writer::{create_writer, Writer};
use crate::io::{AlignmentSource, RegionIndex};
use crate::output::{format_cells_vcf_record, format_vcf_record, site_matrix_entries, write_shard_site_block};
use crate::types::{base_index, AlignedRead, PileupColumn};

/// Per-shard record counts, accumulated as sites are emitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShardTotals {
    pub ns: u64,
    pub nr_ad: u64,
    pub nr_dp: u64,
    pub nr_oth: u64,
}

/// Paths to one shard's temp output files.
#[derive(Debug, Clone)]
pub struct ShardPaths {
    pub ad: PathBuf,
    pub dp: PathBuf,
    pub oth: PathBuf,
    pub vcf: PathBuf,
    pub cells_vcf: Option<PathBuf>,
}

struct ActiveEntry {
    file_idx: usize,
    read: AlignedRead,
}

/// Active-read window over a chromosome's merged, position-sorted reads.
struct PileupWindow {
    merged: std::iter::Peekable<std::vec::IntoIter<(usize, AlignedRead)>>,
    active: Vec<ActiveEntry>,
}

impl PileupWindow {
    fn new(reads_by_file: Vec<Vec<AlignedRead>>) -> Self {
        let mut merged = Vec::new();
        for (file_idx, reads) in reads_by_file.into_iter().enumerate() {
            for r in reads {
                merged.push((file_idx, r));
            }
        }
        merged.sort_by_key(|(_, r)| r.pos);
        Self {
            merged: merged.into_iter().peekable(),
            active: Vec::new(),
        }
    }

    fn first_pos(&mut self) -> Option<i64> {
        self.merged.peek().map(|(_, r)| r.pos)
    }

    /// Advances from `from`, admitting/retiring reads, until the active set
    /// is nonempty or no reads remain. Returns the position to visit.
    fn advance(&mut self, from: i64) -> Option<i64> {
        let mut pos = from;
        loop {
            while self.merged.peek().is_some_and(|(_, r)| r.pos <= pos) {
                let (file_idx, read) = self.merged.next().unwrap();
                self.active.push(ActiveEntry { file_idx, read });
            }
            self.active.retain(|e| e.read.ref_end() > pos);
            if !self.active.is_empty() {
                return Some(pos);
            }
            pos = self.merged.peek()?.1.pos;
        }
    }
}

fn active_at(reads_by_file: &[Vec<AlignedRead>], pos: i64) -> Vec<ActiveEntry> {
    let mut v = Vec::new();
    for (file_idx, reads) in reads_by_file.iter().enumerate() {
        for r in reads {
            if r.pos <= pos && pos < r.ref_end() {
                v.push(ActiveEntry {
                    file_idx,
                    read: r.clone(),
                });
            }
        }
    }
    v
}

fn temp_err(path: &Path) -> impl Fn(std::io::Error) -> CoreError + '_ {
    move |e| CoreError::TempWriteError {
        path: path.display().to_string(),
        source: e,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_site(
    agg: &mut SiteAggregator,
    active: &[ActiveEntry],
    pos: i64,
    target: Option<(usize, usize)>,
    cfg: &Config,
    chrom: &str,
    num_cells: usize,
    totals: &mut ShardTotals,
    ad: (&mut Writer, &Path),
    dp: (&mut Writer, &Path),
    oth: (&mut Writer, &Path),
    vcf: (&mut Writer, &Path),
    cells_vcf: Option<(&mut Writer, &Path)>,
) -> CoreResult<()> {
    agg.begin_site(target);
    let mut tc: i64 = 0;
    for entry in active {
        if cfg.plp_max_depth > 0 && tc >= cfg.plp_max_depth {
            break;
        }
        if admit_read(&entry.read, pos, cfg).is_err() {
            continue;
        }
        if let PileupColumn::Base { query_offset } = entry.read.column_at(pos) {
            if let (Some(base), Some(qual)) = (entry.read.base_at(query_offset), entry.read.qual_at(query_offset)) {
                if let Some(cell_idx) = agg.resolve_cell(entry.read.cell_barcode.as_deref(), entry.file_idx) {
                    agg.push(cell_idx, base_index(base), qual, entry.read.umi.as_ref(), cfg.is_genotype);
                    tc += 1;
                }
            }
        }
    }

    let site = match agg.finalize(cfg) {
        Finalized::Emit(site) => site,
        Finalized::Skip => return Ok(()),
    };

    totals.ns += 1;
    totals.nr_ad += site.nr_ad as u64;
    totals.nr_dp += site.nr_dp as u64;
    totals.nr_oth += site.nr_oth as u64;

    let (ad_entries, dp_entries, oth_entries) = site_matrix_entries(&site);
    write_shard_site_block(ad.0, ad_entries.into_iter()).map_err(temp_err(ad.1))?;
    write_shard_site_block(dp.0, dp_entries.into_iter()).map_err(temp_err(dp.1))?;
    write_shard_site_block(oth.0, oth_entries.into_iter()).map_err(temp_err(oth.1))?;

    writeln!(vcf.0, "{}", format_vcf_record(chrom, pos, &site)).map_err(temp_err(vcf.1))?;
    if let Some((w, path)) = cells_vcf {
        writeln!(w, "{}", format_cells_vcf_record(chrom, pos, &site, num_cells, cfg.double_gl))
            .map_err(temp_err(path))?;
    }
    Ok(())
}

/// Processes one chromosome: opens per-file read lists, sweeps sites (scan
/// or target-driven), and writes shard-local temp outputs.
pub fn run_chromosome_shard(
    chrom: &str,
    sources: &[Arc<dyn AlignmentSource>],
    region_index: &dyn RegionIndex,
    cfg: &Config,
    shard_dir: &Path,
) -> CoreResult<(ShardTotals, ShardPaths)> {
    let reads_by_file: Vec<Vec<AlignedRead>> = sources
        .iter()
        .map(|s| s.reads_for_chrom(chrom))
        .collect::<CoreResult<Vec<_>>>()?;

    let (mut ad_w, ad_path) = create_writer(&shard_dir.join(format!("{chrom}.ad.tmp")), cfg.is_out_zip)?;
    let (mut dp_w, dp_path) = create_writer(&shard_dir.join(format!("{chrom}.dp.tmp")), cfg.is_out_zip)?;
    let (mut oth_w, oth_path) = create_writer(&shard_dir.join(format!("{chrom}.oth.tmp")), cfg.is_out_zip)?;
    let (mut vcf_w, vcf_path) = create_writer(&shard_dir.join(format!("{chrom}.vcf.tmp")), cfg.is_out_zip)?;
    let mut cells = if cfg.is_genotype {
        Some(create_writer(
            &shard_dir.join(format!("{chrom}.cells.vcf.tmp")),
            cfg.is_out_zip,
        )?)
    } else {
        None
    };

    let mut agg = SiteAggregator::prepare(cfg);
    let mut totals = ShardTotals::default();
    let num_cells = cfg.cell_groups.num_cells();

    if let Some(targets) = region_index.targets_for(chrom) {
        for snp in targets {
            let active = active_at(&reads_by_file, snp.pos);
            let target = Some((base_index(snp.reference), base_index(snp.alternate)));
            process_site(
                &mut agg,
                &active,
                snp.pos,
                target,
                cfg,
                chrom,
                num_cells,
                &mut totals,
                (&mut ad_w, &ad_path),
                (&mut dp_w, &dp_path),
                (&mut oth_w, &oth_path),
                (&mut vcf_w, &vcf_path),
                cells.as_mut().map(|t| (&mut t.0, t.1.as_path())),
            )?;
        }
    } else {
        let mut window = PileupWindow::new(reads_by_file);
        let mut cursor = window.first_pos();
        while let Some(from) = cursor {
            let Some(pos) = window.advance(from) else { break };
            if region_index.contains(chrom, pos) {
                process_site(
                    &mut agg,
                    &window.active,
                    pos,
                    None,
                    cfg,
                    chrom,
                    num_cells,
                    &mut totals,
                    (&mut ad_w, &ad_path),
                    (&mut dp_w, &dp_path),
                    (&mut oth_w, &oth_path),
                    (&mut vcf_w, &vcf_path),
                    cells.as_mut().map(|t| (&mut t.0, t.1.as_path())),
                )?;
            }
            cursor = Some(pos + 1);
        }
    }

    ad_w.close(&ad_path)?;
    dp_w.close(&dp_path)?;
    oth_w.close(&oth_path)?;
    vcf_w.close(&vcf_path)?;
    let cells_vcf = match cells {
        Some((w, path)) => {
            w.close(&path)?;
            Some(path)
        }
        None => None,
    };

    Ok((
        totals,
        ShardPaths {
            ad: ad_path,
            dp: dp_path,
            oth: oth_path,
            vcf: vcf_path,
            cells_vcf,
        },
    ))
}
