//! Output Merger (Component E): concatenates per-shard temp files into the
//! final sparse matrices and VCF files, renumbering row indices globally.

use std::fs::File;
use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{CellGroupMode, Config};
use crate::error::{CoreError, CoreResult};
use crate::io::util::create_buffered_reader;
use crate::io::writer::{create_writer, remove_temp};
use crate::output::mtx_header;
use crate::worker::{ShardPaths, ShardTotals};

fn read_err(path: &Path) -> impl Fn(std::io::Error) -> CoreError + '_ {
    move |e| CoreError::InputOpenError {
        path: path.display().to_string(),
        source: e,
    }
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> CoreError + '_ {
    move |e| CoreError::TempWriteError {
        path: path.display().to_string(),
        source: e,
    }
}

/// Merges N shard files (the shard line format from `worker.rs`) into one
/// MatrixMarket coordinate file, assigning global row indices in shard order.
pub fn merge_mtx(
    shard_files: &[PathBuf],
    total_sites: u64,
    num_cells: usize,
    total_records: u64,
    out_path: &Path,
    gzip: bool,
) -> CoreResult<PathBuf> {
    let (mut w, actual) = create_writer(out_path, gzip)?;
    mtx_header(&mut w, total_sites, num_cells as u64, total_records).map_err(write_err(&actual))?;

    let mut row: u64 = 1;
    let mut written: u64 = 0;
    for shard_path in shard_files {
        let file = File::open(shard_path).map_err(read_err(shard_path))?;
        let reader = create_buffered_reader(file, shard_path);
        for line in reader.lines() {
            let line = line.map_err(read_err(shard_path))?;
            if line.is_empty() {
                row += 1;
                continue;
            }
            writeln!(w, "{row}\t{line}").map_err(write_err(&actual))?;
            written += 1;
        }
    }

    if row - 1 != total_sites {
        return Err(CoreError::MergeMismatch(format!(
            "expected {total_sites} sites, shard boundaries imply {}",
            row - 1
        )));
    }
    if written != total_records {
        return Err(CoreError::MergeMismatch(format!(
            "expected {total_records} records, wrote {written}"
        )));
    }

    w.close(&actual)?;
    Ok(actual)
}

/// Byte-concatenates shard VCF files in shard order, behind a fixed header.
pub fn merge_vcf(shard_files: &[PathBuf], out_path: &Path, gzip: bool) -> CoreResult<PathBuf> {
    let (mut w, actual) = create_writer(out_path, gzip)?;
    writeln!(w, "##fileformat=VCFv4.2").map_err(write_err(&actual))?;
    writeln!(w, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO").map_err(write_err(&actual))?;
    copy_lines(shard_files, &mut w, &actual)?;
    w.close(&actual)?;
    Ok(actual)
}

/// Byte-concatenates shard cells-VCF files, with a header naming each
/// declared cell group as a sample column.
pub fn merge_cells_vcf(
    shard_files: &[PathBuf],
    cell_names: &[Arc<str>],
    out_path: &Path,
    gzip: bool,
) -> CoreResult<PathBuf> {
    let (mut w, actual) = create_writer(out_path, gzip)?;
    writeln!(w, "##fileformat=VCFv4.2").map_err(write_err(&actual))?;
    write!(w, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT").map_err(write_err(&actual))?;
    for name in cell_names {
        write!(w, "\t{name}").map_err(write_err(&actual))?;
    }
    writeln!(w).map_err(write_err(&actual))?;
    copy_lines(shard_files, &mut w, &actual)?;
    w.close(&actual)?;
    Ok(actual)
}

fn copy_lines<W: std::io::Write>(shard_files: &[PathBuf], w: &mut W, out_path: &Path) -> CoreResult<()> {
    for shard_path in shard_files {
        let file = File::open(shard_path).map_err(read_err(shard_path))?;
        let reader = create_buffered_reader(file, shard_path);
        for line in reader.lines() {
            let line = line.map_err(read_err(shard_path))?;
            writeln!(w, "{line}").map_err(write_err(out_path))?;
        }
    }
    Ok(())
}

/// Final merged output paths.
#[derive(Debug, Clone)]
pub struct MergedOutputs {
    pub ad: PathBuf,
    pub dp: PathBuf,
    pub oth: PathBuf,
    pub vcf: PathBuf,
    pub cells_vcf: Option<PathBuf>,
}

fn cell_group_names(cfg: &Config) -> &[Arc<str>] {
    match &cfg.cell_groups {
        CellGroupMode::Barcodes(v) => v,
        CellGroupMode::Samples(v) => v,
    }
}

/// Merges all shard outputs (dispatched and returned in shard order) into
/// the final files, then removes the shard temp files.
pub fn merge_all(
    shards: &[(Arc<str>, ShardTotals, ShardPaths)],
    cfg: &Config,
    out_dir: &Path,
) -> CoreResult<MergedOutputs> {
    let total_ns: u64 = shards.iter().map(|(_, t, _)| t.ns).sum();
    let nr_ad: u64 = shards.iter().map(|(_, t, _)| t.nr_ad).sum();
    let nr_dp: u64 = shards.iter().map(|(_, t, _)| t.nr_dp).sum();
    let nr_oth: u64 = shards.iter().map(|(_, t, _)| t.nr_oth).sum();
    let num_cells = cfg.cell_groups.num_cells();

    let ad_files: Vec<PathBuf> = shards.iter().map(|(_, _, p)| p.ad.clone()).collect();
    let dp_files: Vec<PathBuf> = shards.iter().map(|(_, _, p)| p.dp.clone()).collect();
    let oth_files: Vec<PathBuf> = shards.iter().map(|(_, _, p)| p.oth.clone()).collect();
    let vcf_files: Vec<PathBuf> = shards.iter().map(|(_, _, p)| p.vcf.clone()).collect();

    let ad = merge_mtx(&ad_files, total_ns, num_cells, nr_ad, &out_dir.join("AD.mtx"), cfg.is_out_zip)?;
    let dp = merge_mtx(&dp_files, total_ns, num_cells, nr_dp, &out_dir.join("DP.mtx"), cfg.is_out_zip)?;
    let oth = merge_mtx(&oth_files, total_ns, num_cells, nr_oth, &out_dir.join("OTH.mtx"), cfg.is_out_zip)?;
    let vcf = merge_vcf(&vcf_files, &out_dir.join("cellSNP.base.vcf"), cfg.is_out_zip)?;

    let cells_vcf = if cfg.is_genotype {
        let cell_files: Vec<PathBuf> = shards.iter().filter_map(|(_, _, p)| p.cells_vcf.clone()).collect();
        Some(merge_cells_vcf(
            &cell_files,
            cell_group_names(cfg),
            &out_dir.join("cellSNP.cells.vcf"),
            cfg.is_out_zip,
        )?)
    } else {
        None
    };

    for (_, _, p) in shards {
        remove_temp(&p.ad)?;
        remove_temp(&p.dp)?;
        remove_temp(&p.oth)?;
        remove_temp(&p.vcf)?;
        if let Some(cv) = &p.cells_vcf {
            remove_temp(cv)?;
        }
    }

    Ok(MergedOutputs { ad, dp, oth, vcf, cells_vcf })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_shard(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    /// S5 — two chromosomes, each emitting 2 sites; final rows are numbered
    /// 1..4 in chromosome/shard dispatch order.
    #[test]
    fn merge_mtx_renumbers_rows_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        // chr1: site1 has one record, site2 has one record.
        let shard1 = write_shard(dir.path(), "chr1.ad.tmp", "1\t5\n\n1\t3\n\n");
        // chr2: site1 has one record, site2 has two records.
        let shard2 = write_shard(dir.path(), "chr2.ad.tmp", "2\t1\n\n1\t2\n2\t4\n\n");

        let out = merge_mtx(&[shard1, shard2], 4, 2, 5, &dir.path().join("AD.mtx"), false).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[2], "4\t2\t5");
        assert_eq!(&lines[3..], &["1\t1\t5", "2\t1\t3", "3\t2\t1", "4\t1\t2", "4\t2\t4"]);
    }

    #[test]
    fn merge_mtx_rejects_record_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let shard = write_shard(dir.path(), "chr1.ad.tmp", "1\t5\n\n");
        let err = merge_mtx(&[shard], 1, 2, 99, &dir.path().join("AD.mtx"), false);
        assert!(matches!(err, Err(CoreError::MergeMismatch(_))));
    }

    #[test]
    fn merge_vcf_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let shard1 = write_shard(dir.path(), "chr1.vcf.tmp", "chr1\t100\t.\tA\tT\t.\tPASS\tAD=1;DP=2;OTH=0\n");
        let shard2 = write_shard(dir.path(), "chr2.vcf.tmp", "chr2\t50\t.\tC\tG\t.\tPASS\tAD=1;DP=1;OTH=0\n");
        let out = merge_vcf(&[shard1, shard2], &dir.path().join("base.vcf"), false).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[2], "chr1\t100\t.\tA\tT\t.\tPASS\tAD=1;DP=2;OTH=0");
        assert_eq!(lines[3], "chr2\t50\t.\tC\tG\t.\tPASS\tAD=1;DP=1;OTH=0");
    }
}
