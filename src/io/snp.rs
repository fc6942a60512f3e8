//! SNP-list reader: tab-separated `chrom pos ref alt` records.
//!
//! Positions on disk are 1-based (VCF/BED-adjacent convention); converted
//! to 0-based internally to match [`crate::types::AlignedRead::pos`].

use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::io::util::create_buffered_reader;
use crate::types::SnpRecord;

/// Reads a SNP list file (plain or gzip-compressed).
pub fn read_snp_list(path: &Path) -> CoreResult<Vec<SnpRecord>> {
    let file = File::open(path).map_err(|e| CoreError::InputOpenError {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = create_buffered_reader(file, path);
    read_snp_list_reader(reader, &path.display().to_string())
}

fn read_snp_list_reader<R: BufRead>(reader: R, origin: &str) -> CoreResult<Vec<SnpRecord>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| CoreError::InputOpenError {
            path: origin.to_string(),
            source: e,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(CoreError::DecodeError {
                chrom: origin.to_string(),
                pos: 0,
                reason: format!("expected 4 tab-separated fields, got {}", fields.len()),
            });
        }
        let chrom: Arc<str> = Arc::from(fields[0]);
        let pos_1based: i64 = fields[1].parse().map_err(|_| CoreError::DecodeError {
            chrom: chrom.to_string(),
            pos: 0,
            reason: format!("invalid position '{}'", fields[1]),
        })?;
        let reference = fields[2].as_bytes().first().copied().unwrap_or(b'N');
        let alternate = fields[3].as_bytes().first().copied().unwrap_or(b'N');
        records.push(SnpRecord {
            chrom,
            pos: pos_1based - 1,
            reference,
            alternate,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_records() {
        let content = "chr1\t101\tC\tG\nchr2\t50\tA\tT\n";
        let records = read_snp_list_reader(content.as_bytes(), "test").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&*records[0].chrom, "chr1");
        assert_eq!(records[0].pos, 100);
        assert_eq!(records[0].reference, b'C');
        assert_eq!(records[0].alternate, b'G');
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let content = "# header\n\nchr1\t10\tA\tC\n";
        let records = read_snp_list_reader(content.as_bytes(), "test").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rejects_malformed_line() {
        let content = "chr1\t10\tA\n";
        assert!(read_snp_list_reader(content.as_bytes(), "test").is_err());
    }
}
