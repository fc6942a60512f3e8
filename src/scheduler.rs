//! Shard Scheduler (Component D): partitions work by chromosome and
//! dispatches it to a fixed-size worker pool.
//!
//! Grounded on the teacher's `run_sequential`/`run_parallel` dual dispatch
//! in `main.rs`: a single-thread fast path bypasses the pool, and the
//! parallel path uses a `rayon` thread pool fed through bounded
//! `crossbeam-channel`s, generalized from per-chromosome BED batches to
//! per-chromosome pileup shards.

use ahash::AHashMap;
use crossbeam_channel::bounded;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::io::{AlignmentSource, RegionIndex};
use crate::worker::{run_chromosome_shard, ShardPaths, ShardTotals};

/// One chromosome's processed result, paired with its shard totals/paths.
pub type ShardResult = (Arc<str>, ShardTotals, ShardPaths);

/// Runs every chromosome shard in `cfg.run_mode`'s chromosome list,
/// dispatching to a sequential or a pooled-parallel path based on
/// `cfg.nthread`. Results are always returned in dispatch order (the
/// chromosome list order), independent of completion order.
pub fn run_shards(
    cfg: &Config,
    sources: &[Arc<dyn AlignmentSource>],
    region_index: &dyn RegionIndex,
    work_dir: &Path,
) -> CoreResult<Vec<ShardResult>> {
    let chroms = cfg.run_mode.chroms().to_vec();
    if cfg.nthread <= 1 {
        run_sequential(cfg, sources, region_index, work_dir, &chroms)
    } else {
        run_parallel(cfg, sources, region_index, work_dir, &chroms)
    }
}

fn run_sequential(
    cfg: &Config,
    sources: &[Arc<dyn AlignmentSource>],
    region_index: &dyn RegionIndex,
    work_dir: &Path,
    chroms: &[Arc<str>],
) -> CoreResult<Vec<ShardResult>> {
    chroms
        .iter()
        .map(|chrom| {
            let (totals, paths) = run_chromosome_shard(chrom, sources, region_index, cfg, work_dir)?;
            Ok((Arc::clone(chrom), totals, paths))
        })
        .collect()
}

fn run_parallel(
    cfg: &Config,
    sources: &[Arc<dyn AlignmentSource>],
    region_index: &dyn RegionIndex,
    work_dir: &Path,
    chroms: &[Arc<str>],
) -> CoreResult<Vec<ShardResult>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.nthread)
        .build()
        .map_err(|e| CoreError::InvalidConfig(format!("failed to build worker pool: {e}")))?;

    let (task_tx, task_rx) = bounded::<Arc<str>>(chroms.len().max(1));
    let (result_tx, result_rx) = bounded::<CoreResult<ShardResult>>(chroms.len().max(1));
    for chrom in chroms {
        let _ = task_tx.send(Arc::clone(chrom));
    }
    drop(task_tx);

    pool.scope(|s| {
        for _ in 0..cfg.nthread {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move |_| {
                while let Ok(chrom) = task_rx.recv() {
                    let outcome = run_chromosome_shard(&chrom, sources, region_index, cfg, work_dir)
                        .map(|(totals, paths)| (Arc::clone(&chrom), totals, paths));
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    // Await every shard (even after a failure) before reporting, so no
    // worker is left dangling; the scheduler still refuses to invoke the
    // merger if anything failed.
    let mut by_chrom: AHashMap<Arc<str>, (ShardTotals, ShardPaths)> = AHashMap::new();
    let mut first_err: Option<CoreError> = None;
    for outcome in result_rx.iter() {
        match outcome {
            Ok((chrom, totals, paths)) => {
                by_chrom.insert(chrom, (totals, paths));
            }
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    chroms
        .iter()
        .map(|chrom| {
            let (totals, paths) = by_chrom
                .remove(chrom)
                .expect("every dispatched chromosome has a result");
            Ok((Arc::clone(chrom), totals, paths))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellGroupMode, RunMode};
    use crate::io::{FixtureSource, ScanIndex};

    fn cfg_with(nthread: usize) -> Config {
        let mut c = Config::new();
        c.min_count = 1;
        c.min_len = 0;
        c.umi_tag = None;
        c.cell_groups = CellGroupMode::Samples(vec![Arc::from("s1")]);
        c.run_mode = RunMode::Scan {
            chroms: vec![Arc::from("chr1"), Arc::from("chr2")],
        };
        c.nthread = nthread;
        c
    }

    fn fixture() -> Arc<dyn AlignmentSource> {
        let content = "\
chr1 10 60 0 4M AAAA IIII s1 *
chr2 20 60 0 4M CCCC IIII s1 *
";
        Arc::new(FixtureSource::from_reader(content.as_bytes(), "test").unwrap())
    }

    #[test]
    fn sequential_and_parallel_dispatch_visit_every_chromosome() {
        let dir = tempfile::tempdir().unwrap();
        let seq_dir = dir.path().join("seq");
        let par_dir = dir.path().join("par");
        std::fs::create_dir_all(&seq_dir).unwrap();
        std::fs::create_dir_all(&par_dir).unwrap();
        let src = fixture();

        let seq = run_shards(&cfg_with(1), &[Arc::clone(&src)], &ScanIndex, &seq_dir).unwrap();
        let par = run_shards(&cfg_with(2), &[src], &ScanIndex, &par_dir).unwrap();

        assert_eq!(seq.len(), 2);
        assert_eq!(par.len(), 2);
        assert_eq!(seq[0].0.as_ref(), "chr1");
        assert_eq!(seq[1].0.as_ref(), "chr2");
        assert_eq!(par[0].0.as_ref(), "chr1");
        assert_eq!(par[1].0.as_ref(), "chr2");
        assert!(seq[0].1.ns > 0);
        assert_eq!(seq[0].1.ns, par[0].1.ns);
        assert_eq!(seq[1].1.ns, par[1].1.ns);
    }
}
