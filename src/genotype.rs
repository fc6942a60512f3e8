//! Genotype-likelihood computation.
//!
//! There is no reference genotype-likelihood implementation in the
//! original C source to port (cellsnp-lite's bundled pileup code computes
//! allele counts only); this module is new functionality, grounded on the
//! standard Phred-to-probability conversion and the VCF-standard diploid
//! genotype ordering used by `rosalind`'s `StreamingVariantCaller`.
//!
//! All likelihoods are accumulated in log10 space to avoid underflow.

use crate::types::NUM_BASES;

/// Phred-quality cap applied before converting to an error probability.
pub const DEFAULT_QUAL_CAP: u8 = 45;
/// Floor multiplier applied to the raw error probability.
///
/// A single very-high-quality mismatch would otherwise drive a genotype's
/// likelihood to `log10(0) = -inf`; flooring `err` at `tail * 1e-3` keeps
/// every likelihood finite.
pub const DEFAULT_TAIL: f64 = 0.25;

/// Canonical-base-indexed log10 likelihood contribution of one observed
/// base at quality `qual`, assuming the read's true base is `obs`.
///
/// `cap` bounds the Phred score before it is converted to an error
/// probability; `tail` floors that probability (see [`DEFAULT_TAIL`]).
/// Only indices `0..4` (A/C/G/T) are meaningful; callers should skip
/// contributions where `obs >= 4` (N or ambiguity codes carry no allelic
/// evidence).
pub fn qual_vector(qual: u8, obs: usize, cap: u8, tail: f64) -> [f64; 4] {
    let q = qual.min(cap) as f64;
    let err = (10f64.powf(-q / 10.0)).max(tail * 1e-3);
    let mismatch = (err / 3.0).max(1e-12);
    let match_p = (1.0 - err).max(mismatch);

    let mut v = [mismatch.log10(); 4];
    if obs < 4 {
        v[obs] = match_p.log10();
    }
    v
}

/// Accumulator summing [`qual_vector`] rows keyed by observed base index.
///
/// Row `r` (`0..NUM_BASES`) holds the sum of per-read log10 likelihood
/// vectors for reads whose observed base canonicalized to `r`. Since every
/// read falls into exactly one row, the column sum across all rows is the
/// total log10 likelihood of the site's reads under each of the four
/// allele hypotheses.
pub type QualMatrix = [[f64; 4]; NUM_BASES];

/// Adds one read's contribution to a quality matrix.
pub fn accumulate(qmat: &mut QualMatrix, qual: u8, obs: usize, cap: u8, tail: f64) {
    let row = obs.min(NUM_BASES - 1);
    let v = qual_vector(qual, obs, cap, tail);
    for i in 0..4 {
        qmat[row][i] += v[i];
    }
}

/// Converts a quality matrix into a Phred-scaled genotype-likelihood (PL)
/// vector, normalized so the most likely genotype has PL 0.
///
/// Returns a length-3 vector (`ref/ref`, `ref/alt`, `alt/alt`) unless
/// `double_gl` is set, in which case all 10 diploid genotype combinations
/// over the four canonical bases are returned in VCF-standard order
/// (`AA,AC,AG,AT,CC,CG,CT,GG,GT,TT`).
pub fn qual_matrix_to_geno(
    qmat: &QualMatrix,
    ref_idx: usize,
    alt_idx: usize,
    double_gl: bool,
) -> Vec<u32> {
    let allele_ll = allele_log_likelihoods(qmat);
    let pairs = genotype_pairs(ref_idx, alt_idx, double_gl);

    let lls: Vec<f64> = pairs
        .iter()
        .map(|&(i, j)| genotype_ll(&allele_ll, i, j))
        .collect();
    let max_ll = lls.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    lls.iter()
        .map(|&ll| (-10.0 * (ll - max_ll)).round().clamp(0.0, 255.0) as u32)
        .collect()
}

/// Sums a quality matrix's rows into one log10 likelihood per canonical allele.
fn allele_log_likelihoods(qmat: &QualMatrix) -> [f64; 4] {
    let mut allele_ll = [0f64; 4];
    for row in qmat {
        for (i, ll) in allele_ll.iter_mut().enumerate() {
            *ll += row[i];
        }
    }
    allele_ll
}

fn genotype_ll(allele_ll: &[f64; 4], i: usize, j: usize) -> f64 {
    if i == j {
        allele_ll[i]
    } else {
        (allele_ll[i] + allele_ll[j]) / 2.0
    }
}

/// The diploid genotype pairs, in the order their PL entries are reported.
///
/// Non-`double_gl`: `(ref,ref), (ref,alt), (alt,alt)`. `double_gl`: all 10
/// VCF-standard-ordered pairs over the four canonical bases
/// (`AA,AC,AG,AT,CC,CG,CT,GG,GT,TT`).
pub fn genotype_pairs(ref_idx: usize, alt_idx: usize, double_gl: bool) -> Vec<(usize, usize)> {
    if double_gl {
        let mut p = Vec::with_capacity(10);
        for j in 0..4 {
            for i in 0..=j {
                p.push((i, j));
            }
        }
        p
    } else {
        vec![(ref_idx, ref_idx), (ref_idx, alt_idx), (alt_idx, alt_idx)]
    }
}

/// The best (lowest-PL) genotype call as a VCF `GT` string.
///
/// Non-`double_gl`: allele indices are ref-relative (`0`=ref, `1`=alt), so
/// the result is one of `0/0`, `0/1`, `1/1`. `double_gl`: allele indices are
/// the canonical base indices (`0..4`) directly, e.g. `2/3`.
pub fn best_genotype_call(pl: &[u32], ref_idx: usize, alt_idx: usize, double_gl: bool) -> String {
    let pairs = genotype_pairs(ref_idx, alt_idx, double_gl);
    let best = pl
        .iter()
        .enumerate()
        .min_by_key(|&(_, &v)| v)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let (i, j) = pairs[best];
    if double_gl {
        format!("{i}/{j}")
    } else {
        let rel = |idx: usize| if idx == ref_idx { 0 } else { 1 };
        format!("{}/{}", rel(i), rel(j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qual_vector_favors_observed_base() {
        let v = qual_vector(40, 0, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
        assert!(v[0] > v[1]);
        assert!(v[0] > v[2]);
        assert!(v[0] > v[3]);
    }

    #[test]
    fn qual_vector_is_finite_at_max_quality() {
        let v = qual_vector(93, 0, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
        for x in v {
            assert!(x.is_finite());
        }
    }

    #[test]
    fn best_genotype_gets_pl_zero() {
        let mut qmat: QualMatrix = Default::default();
        for _ in 0..20 {
            accumulate(&mut qmat, 40, 0, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
        }
        let pl = qual_matrix_to_geno(&qmat, 0, 1, false);
        assert_eq!(pl.len(), 3);
        assert_eq!(*pl.iter().min().unwrap(), 0);
        // ref/ref (A/A) should win when every read observed A.
        assert_eq!(pl[0], 0);
    }

    #[test]
    fn best_genotype_call_reports_ref_relative_gt() {
        let mut qmat: QualMatrix = Default::default();
        for _ in 0..20 {
            accumulate(&mut qmat, 40, 0, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
        }
        let pl = qual_matrix_to_geno(&qmat, 0, 1, false);
        assert_eq!(best_genotype_call(&pl, 0, 1, false), "0/0");
    }

    #[test]
    fn double_gl_returns_ten_entries_in_vcf_order() {
        let mut qmat: QualMatrix = Default::default();
        for _ in 0..10 {
            accumulate(&mut qmat, 35, 2, DEFAULT_QUAL_CAP, DEFAULT_TAIL);
        }
        let pl = qual_matrix_to_geno(&qmat, 0, 2, true);
        assert_eq!(pl.len(), 10);
        // GG is pair (2,2), which is VCF-order index 5: AA,AC,AG,AT,CC,CG,CT,GG,GT,TT
        assert_eq!(pl[5], 0);
    }
}
