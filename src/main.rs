//! CLI entry point for scpileup.
//!
//! Parses input alignment paths, SNP-list/chromosome-scan mode, output
//! directory, and the pileup configuration knobs, then dispatches to the
//! Shard Scheduler.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use scpileup::config::{CellGroupMode, Config, RunMode};
use scpileup::io::{read_snp_list, AlignmentSource, FixtureSource, RegionIndex, ScanIndex, TargetIndex};
use scpileup::merger::merge_all;
use scpileup::scheduler::run_shards;

/// Single-cell SNP pileup engine: per-cell allele counting from aligned
/// reads, emitting sparse AD/DP/OTH matrices and VCF output.
#[derive(Parser, Debug)]
#[command(name = "scpileup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input alignment file(s); repeatable.
    #[arg(short = 'i', long = "input", required = true)]
    input: Vec<PathBuf>,

    /// Tab-separated SNP list (chrom, pos, ref, alt); enables target mode.
    #[arg(short = 's', long = "snp-list")]
    snp_list: Option<PathBuf>,

    /// Comma-separated chromosome list; used in scan mode when `--snp-list` is absent.
    #[arg(long = "chroms")]
    chroms: Option<String>,

    /// Barcode list file; enables barcode cell-group mode.
    #[arg(short = 'b', long = "barcodes")]
    barcodes: Option<PathBuf>,

    /// Comma-separated sample-id list; per-file cell-group mode when `--barcodes` is absent.
    #[arg(long = "samples")]
    samples: Option<String>,

    /// Output directory for the matrices and VCF file(s).
    #[arg(short = 'o', long = "out-dir", required = true)]
    out_dir: PathBuf,

    /// Worker pool size (default: number of logical CPUs).
    #[arg(short = 'p', long = "threads")]
    threads: Option<usize>,

    /// Lower mapping-quality bound, inclusive.
    #[arg(long = "min-mapq", default_value = "20")]
    min_mapq: u8,

    /// Minimum total M/=/X CIGAR length.
    #[arg(long = "min-len", default_value = "30")]
    min_len: u32,

    /// Minimum total retained reads at a site to emit.
    #[arg(long = "min-count", default_value = "20")]
    min_count: u32,

    /// Minimum minor-allele fraction of `tc`, in [0, 0.5].
    #[arg(long = "min-maf", default_value = "0.0")]
    min_maf: f64,

    /// Reject paired-but-not-proper-pair reads.
    #[arg(long = "no-orphan")]
    no_orphan: bool,

    /// Exclude reads matching any of these SAM flag bits.
    #[arg(long = "rflag-filter", default_value = "1796")]
    rflag_filter: u16,

    /// Require all of these SAM flag bits to be set.
    #[arg(long = "rflag-require", default_value = "0")]
    rflag_require: u16,

    /// Pileup depth cap per site; `0` means unbounded.
    #[arg(long = "max-depth", default_value = "0")]
    max_depth: i64,

    /// Cell-barcode auxiliary tag name.
    #[arg(long = "cell-tag", default_value = "CB")]
    cell_tag: String,

    /// UMI auxiliary tag name; pass an empty string to disable UMI dedup.
    #[arg(long = "umi-tag", default_value = "UB")]
    umi_tag: String,

    /// Compute and emit genotype likelihoods.
    #[arg(long = "genotype")]
    genotype: bool,

    /// Emit a 10-entry PL vector instead of 3-entry (requires `--genotype`).
    #[arg(long = "double-gl")]
    double_gl: bool,

    /// Write gzip-compressed temporary and final files.
    #[arg(long = "gzip")]
    gzip: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("scpileup: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    for path in &args.input {
        if !path.exists() {
            bail!("input file not found: {}", path.display());
        }
    }
    if let Some(snp_list) = &args.snp_list {
        if !snp_list.exists() {
            bail!("SNP list not found: {}", snp_list.display());
        }
    }
    if let Some(barcodes) = &args.barcodes {
        if !barcodes.exists() {
            bail!("barcode list not found: {}", barcodes.display());
        }
    }
    std::fs::create_dir_all(&args.out_dir).context("failed to create output directory")?;

    let config = build_config(&args)?;
    config.validate().map_err(anyhow::Error::from)?;

    let sources: Vec<Arc<dyn AlignmentSource>> = args
        .input
        .iter()
        .map(|p| -> Result<Arc<dyn AlignmentSource>> {
            Ok(Arc::new(FixtureSource::from_path(p).map_err(anyhow::Error::from)?))
        })
        .collect::<Result<_>>()?;

    let region_index: Box<dyn RegionIndex> = match &args.snp_list {
        Some(path) => {
            let snps = read_snp_list(path).map_err(anyhow::Error::from)?;
            Box::new(TargetIndex::new(snps))
        }
        None => Box::new(ScanIndex),
    };

    eprintln!(
        "scpileup: {} input file(s), {} chromosome(s), {} thread(s)",
        sources.len(),
        config.run_mode.chroms().len(),
        config.nthread
    );

    let work_dir = args.out_dir.join(".scpileup-tmp");
    std::fs::create_dir_all(&work_dir).context("failed to create temp directory")?;

    let shards = run_shards(&config, &sources, region_index.as_ref(), &work_dir).map_err(anyhow::Error::from)?;
    let outputs = merge_all(&shards, &config, &args.out_dir).map_err(anyhow::Error::from)?;
    let _ = std::fs::remove_dir(&work_dir);

    eprintln!(
        "scpileup: wrote {}, {}, {}, {}",
        outputs.ad.display(),
        outputs.dp.display(),
        outputs.oth.display(),
        outputs.vcf.display()
    );
    if let Some(cells_vcf) = outputs.cells_vcf {
        eprintln!("scpileup: wrote {}", cells_vcf.display());
    }
    eprintln!("Done!");
    Ok(())
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = Config::new();
    config.min_mapq = args.min_mapq;
    config.min_len = args.min_len;
    config.min_count = args.min_count;
    config.min_maf = args.min_maf;
    config.no_orphan = args.no_orphan;
    config.rflag_filter = args.rflag_filter;
    config.rflag_require = args.rflag_require;
    config.plp_max_depth = args.max_depth;
    config.cell_tag = Some(Arc::from(args.cell_tag.as_str()));
    config.umi_tag = if args.umi_tag.is_empty() {
        None
    } else {
        Some(Arc::from(args.umi_tag.as_str()))
    };
    config.is_genotype = args.genotype;
    config.double_gl = args.double_gl;
    config.is_out_zip = args.gzip;
    config.nthread = args.threads.unwrap_or_else(num_cpus::get);

    config.cell_groups = match (&args.barcodes, &args.samples) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(path).context("failed to read barcode list")?;
            let barcodes: Vec<Arc<str>> = content.lines().map(str::trim).filter(|l| !l.is_empty()).map(Arc::from).collect();
            CellGroupMode::Barcodes(barcodes)
        }
        (None, Some(samples)) => {
            let names: Vec<Arc<str>> = samples.split(',').map(str::trim).filter(|s| !s.is_empty()).map(Arc::from).collect();
            CellGroupMode::Samples(names)
        }
        (None, None) => {
            let names: Vec<Arc<str>> = args
                .input
                .iter()
                .enumerate()
                .map(|(i, _)| Arc::from(format!("sample{}", i + 1)))
                .collect();
            CellGroupMode::Samples(names)
        }
    };

    let chroms: Vec<Arc<str>> = match &args.chroms {
        Some(s) => s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(Arc::from).collect(),
        None => Vec::new(),
    };

    config.run_mode = if let Some(snp_list) = &args.snp_list {
        let snps = scpileup::io::read_snp_list(snp_list).map_err(anyhow::Error::from)?;
        let mut chroms: Vec<Arc<str>> = snps.iter().map(|r| Arc::clone(&r.chrom)).collect();
        chroms.sort();
        chroms.dedup();
        RunMode::Target { chroms }
    } else {
        if chroms.is_empty() {
            bail!("either --snp-list or --chroms must be provided");
        }
        RunMode::Scan { chroms }
    };

    Ok(config)
}
