//! Output formatting: MatrixMarket sparse-matrix lines and VCF records.
//!
//! Functions here are pure formatters; callers own the writers and the
//! file lifecycle (temp files in [`crate::worker`], final files in
//! [`crate::merger`]).

use std::io::{self, Write};

use crate::aggregator::SiteResult;
use crate::genotype::best_genotype_call;
use crate::types::base_char;

/// MatrixMarket coordinate-format header line.
pub fn mtx_header<W: Write>(w: &mut W, num_sites: u64, num_cells: u64, num_records: u64) -> io::Result<()> {
    writeln!(w, "%%MatrixMarket matrix coordinate integer general")?;
    writeln!(w, "%")?;
    writeln!(w, "{num_sites}\t{num_cells}\t{num_records}")
}

/// Writes one shard-local site block to a sparse-matrix temp file: one
/// `<1-based col>\t<value>` line per nonzero entry, then a blank line
/// marking the site boundary (see `SPEC_FULL.md` §4.C).
pub fn write_shard_site_block<W: Write>(
    w: &mut W,
    entries: impl Iterator<Item = (usize, u32)>,
) -> io::Result<()> {
    for (col, value) in entries {
        writeln!(w, "{}\t{value}", col + 1)?;
    }
    writeln!(w)
}

/// Nonzero `(0-based cell column, value)` entries for one sparse-matrix stream.
type MatrixEntries = Vec<(usize, u32)>;

/// The three sparse-matrix record streams (AD, DP, OTH) for one site.
pub fn site_matrix_entries(result: &SiteResult) -> (MatrixEntries, MatrixEntries, MatrixEntries) {
    let mut ad = Vec::new();
    let mut dp = Vec::new();
    let mut oth = Vec::new();
    for cell in &result.cells {
        if cell.ad > 0 {
            ad.push((cell.cell_idx, cell.ad));
        }
        if cell.dp > 0 {
            dp.push((cell.cell_idx, cell.dp));
        }
        if cell.oth > 0 {
            oth.push((cell.cell_idx, cell.oth));
        }
    }
    (ad, dp, oth)
}

/// Formats a base VCF record: `#CHROM POS ID REF ALT QUAL FILTER INFO`.
/// `pos` is 0-based; the written column is 1-based.
pub fn format_vcf_record(chrom: &str, pos: i64, result: &SiteResult) -> String {
    format!(
        "{chrom}\t{}\t.\t{}\t{}\t.\tPASS\tAD={};DP={};OTH={}",
        pos + 1,
        base_char(result.ref_idx),
        base_char(result.alt_idx),
        result.ad,
        result.dp,
        result.oth,
    )
}

/// Formats an extended per-cell VCF record with
/// `FORMAT=GT:AD:DP:OTH:PL:ALL`, one column per declared cell group in
/// order. Cells with no observation at this site report `./.` with zero
/// counts.
pub fn format_cells_vcf_record(
    chrom: &str,
    pos: i64,
    result: &SiteResult,
    num_cells: usize,
    double_gl: bool,
) -> String {
    let mut by_cell = vec![None; num_cells];
    for cell in &result.cells {
        by_cell[cell.cell_idx] = Some(cell);
    }

    let mut line = format!(
        "{chrom}\t{}\t.\t{}\t{}\t.\tPASS\tAD={};DP={};OTH={}\tGT:AD:DP:OTH:PL:ALL",
        pos + 1,
        base_char(result.ref_idx),
        base_char(result.alt_idx),
        result.ad,
        result.dp,
        result.oth,
    );

    for cell in by_cell {
        let field = match cell {
            Some(c) => {
                let pl = c.gl.as_deref().unwrap_or(&[]);
                let gt = if pl.is_empty() {
                    "./.".to_string()
                } else {
                    best_genotype_call(pl, result.ref_idx, result.alt_idx, double_gl)
                };
                let pl_str = pl.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
                format!("{gt}:{}:{}:{}:{pl_str}:{}", c.ad, c.dp, c.oth, all_field(result, c))
            }
            None => "./.:0:0:0:.:0,0,0,0".to_string(),
        };
        line.push('\t');
        line.push_str(&field);
    }
    line
}

fn all_field(result: &SiteResult, cell: &crate::aggregator::CellSiteResult) -> String {
    // ALL reports the four canonical-base counts; only ref/alt are tracked
    // per cell in this core, so the two non-ref/alt slots fold into OTH.
    let mut counts = [0u32; 4];
    counts[result.ref_idx] = cell.dp - cell.ad;
    counts[result.alt_idx] = cell.ad;
    format!("{},{},{},{}", counts[0], counts[1], counts[2], counts[3])
}
