//! Alignment decoder boundary.
//!
//! Real BAM/CRAM decoding is out of scope for this crate (see the
//! Non-goals in `SPEC_FULL.md` §1); [`AlignmentSource`] is the trait an
//! embedding application implements against a real decoder (e.g. via
//! `noodles` or `rust-htslib`). This module ships a synthetic reference
//! implementation, [`FixtureSource`], so the crate runs end to end without
//! one.

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::io::util::create_buffered_reader;
use crate::types::{AlignedRead, CigarOp, CigarOpKind};

/// Source of aligned reads, one (file, chromosome) pair at a time.
///
/// Implementations must yield reads in ascending `pos` order within a
/// chromosome; the Chromosome Worker's merged pileup sweep relies on it.
pub trait AlignmentSource: Send + Sync {
    /// All reads overlapping `chrom`, in ascending position order.
    fn reads_for_chrom(&self, chrom: &str) -> CoreResult<Vec<AlignedRead>>;
}

/// Reference `AlignmentSource` backed by a plain-text fixture format.
///
/// Each non-empty, non-`#`-prefixed line describes one read:
/// `chrom pos mapq flag cigar seq [qual] [cell_barcode] [umi]`, where
/// `cigar` is a compact string like `10M2D5M`, `seq` and `qual` (Phred+33
/// ASCII, or `*` for a flat quality of 30) are equal length, and trailing
/// fields of `*` mean "absent".
pub struct FixtureSource {
    reads_by_chrom: AHashMap<String, Vec<AlignedRead>>,
}

impl FixtureSource {
    /// Loads a fixture file (plain or gzip-compressed).
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| CoreError::InputOpenError {
            path: path.display().to_string(),
            source: e,
        })?;
        let reader = create_buffered_reader(file, path);
        Self::from_reader(reader, &path.display().to_string())
    }

    /// Parses fixture content from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> CoreResult<Self> {
        let mut reads_by_chrom: AHashMap<String, Vec<AlignedRead>> = AHashMap::new();
        for line in reader.lines() {
            let line = line.map_err(|e| CoreError::InputOpenError {
                path: origin.to_string(),
                source: e,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return Err(CoreError::DecodeError {
                    chrom: origin.to_string(),
                    pos: 0,
                    reason: format!("expected at least 6 fields, got {}", fields.len()),
                });
            }
            let chrom = fields[0].to_string();
            let pos: i64 = fields[1].parse().map_err(|_| CoreError::DecodeError {
                chrom: chrom.clone(),
                pos: 0,
                reason: format!("invalid position '{}'", fields[1]),
            })?;
            let mapq: u8 = fields[2].parse().map_err(|_| CoreError::DecodeError {
                chrom: chrom.clone(),
                pos,
                reason: format!("invalid mapq '{}'", fields[2]),
            })?;
            let flag: u16 = fields[3].parse().map_err(|_| CoreError::DecodeError {
                chrom: chrom.clone(),
                pos,
                reason: format!("invalid flag '{}'", fields[3]),
            })?;
            let cigar = parse_cigar(fields[4]).map_err(|reason| CoreError::DecodeError {
                chrom: chrom.clone(),
                pos,
                reason,
            })?;
            let seq = fields[5].as_bytes().to_vec();
            let qual = match fields.get(6) {
                Some(&q) if q != "*" => q.as_bytes().iter().map(|&b| b.saturating_sub(33)).collect(),
                _ => vec![30u8; seq.len()],
            };
            let cell_barcode = fields.get(7).filter(|s| **s != "*").map(|s| Arc::from(*s));
            let umi = fields.get(8).filter(|s| **s != "*").map(|s| Arc::from(*s));

            reads_by_chrom.entry(chrom).or_default().push(AlignedRead {
                pos,
                mapq,
                flag,
                cigar,
                sequence: Arc::from(seq.into_boxed_slice()),
                qualities: Arc::from(qual.into_boxed_slice()),
                cell_barcode,
                umi,
            });
        }
        for reads in reads_by_chrom.values_mut() {
            reads.sort_by_key(|r| r.pos);
        }
        Ok(Self { reads_by_chrom })
    }
}

impl AlignmentSource for FixtureSource {
    fn reads_for_chrom(&self, chrom: &str) -> CoreResult<Vec<AlignedRead>> {
        Ok(self.reads_by_chrom.get(chrom).cloned().unwrap_or_default())
    }
}

fn parse_cigar(s: &str) -> Result<Vec<CigarOp>, String> {
    let mut ops = Vec::new();
    let mut len = 0u32;
    for c in s.chars() {
        if let Some(d) = c.to_digit(10) {
            len = len * 10 + d;
            continue;
        }
        let kind = match c {
            'M' | '=' | 'X' => CigarOpKind::Match,
            'I' => CigarOpKind::Insertion,
            'D' => CigarOpKind::Deletion,
            'N' => CigarOpKind::RefSkip,
            'S' => CigarOpKind::SoftClip,
            'H' => CigarOpKind::HardClip,
            _ => return Err(format!("unknown CIGAR operator '{c}'")),
        };
        if len == 0 {
            return Err(format!("zero-length CIGAR operator '{c}'"));
        }
        ops.push(CigarOp::new(kind, len));
        len = 0;
    }
    if ops.is_empty() {
        return Err("empty CIGAR string".to_string());
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_fixture() {
        let content = "\
# comment
chr1 100 60 0 10M ACGTACGTAC\tIIIIIIIIII\tAAAA-1\tUMI1
chr1 50 60 0 5M AAAAA
";
        let src = FixtureSource::from_reader(content.as_bytes(), "test").unwrap();
        let reads = src.reads_for_chrom("chr1").unwrap();
        // sorted by ascending position
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].pos, 50);
        assert_eq!(reads[1].pos, 100);
        assert_eq!(reads[1].cell_barcode.as_deref(), Some("AAAA-1"));
        assert_eq!(reads[1].umi.as_deref(), Some("UMI1"));
        assert_eq!(reads[0].cell_barcode, None);
    }

    #[test]
    fn missing_chrom_returns_empty() {
        let src = FixtureSource::from_reader("chr1 1 60 0 1M A\n".as_bytes(), "test").unwrap();
        assert!(src.reads_for_chrom("chr2").unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_cigar_operator() {
        let content = "chr1 1 60 0 5Z AAAAA\n";
        assert!(FixtureSource::from_reader(content.as_bytes(), "test").is_err());
    }

    #[test]
    fn parse_cigar_handles_mixed_ops() {
        let ops = parse_cigar("5S10M2D3M").unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].kind, CigarOpKind::SoftClip);
        assert_eq!(ops[1].len, 10);
        assert_eq!(ops[2].kind, CigarOpKind::Deletion);
    }
}
