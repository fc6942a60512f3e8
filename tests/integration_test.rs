use assert_cmd::Command;
use std::fs;

/// End-to-end run in scan mode: two cells (two input files), one covered
/// position, no SNP list. Exercises CLI parsing through to merged output.
#[test]
fn scan_mode_end_to_end_writes_matrices_and_vcf() {
    let dir = tempfile::tempdir().unwrap();
    let input1 = dir.path().join("cell1.reads");
    let input2 = dir.path().join("cell2.reads");
    fs::write(&input1, "chr1 100 60 0 10M AAAAACCCCC IIIIIIIIII\n").unwrap();
    fs::write(&input2, "chr1 100 60 0 10M AAAAAGCCCC IIIIIIIIII\n").unwrap();
    let out_dir = dir.path().join("out");

    let mut cmd = Command::cargo_bin("scpileup").unwrap();
    cmd.arg("-i")
        .arg(&input1)
        .arg("-i")
        .arg(&input2)
        .arg("--chroms")
        .arg("chr1")
        .arg("-o")
        .arg(&out_dir)
        .arg("--min-count")
        .arg("1")
        .arg("--min-len")
        .arg("0")
        .arg("--umi-tag")
        .arg("")
        .assert()
        .success();

    let ad = fs::read_to_string(out_dir.join("AD.mtx")).unwrap();
    let dp = fs::read_to_string(out_dir.join("DP.mtx")).unwrap();
    let vcf = fs::read_to_string(out_dir.join("cellSNP.base.vcf")).unwrap();

    assert!(ad.starts_with("%%MatrixMarket matrix coordinate integer general\n"));
    let ad_dims: Vec<&str> = ad.lines().nth(2).unwrap().split('\t').collect();
    assert_eq!(ad_dims[1], "2"); // two cell columns

    assert!(dp.lines().count() >= 3);
    assert!(vcf.lines().any(|l| l.starts_with("chr1\t106")));
}

/// End-to-end run in target mode with a SNP list, verifying only the named
/// position is visited and the genotype VCF is emitted when requested.
#[test]
fn target_mode_with_genotype_emits_cells_vcf() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sample.reads");
    fs::write(&input, "chr1 90 60 0 20M AAAAAAAAAACCCCCCCCCC IIIIIIIIIIIIIIIIIIII\n").unwrap();
    let snp_list = dir.path().join("snps.tsv");
    fs::write(&snp_list, "chr1\t100\tA\tC\n").unwrap();
    let out_dir = dir.path().join("out");

    let mut cmd = Command::cargo_bin("scpileup").unwrap();
    cmd.arg("-i")
        .arg(&input)
        .arg("-s")
        .arg(&snp_list)
        .arg("-o")
        .arg(&out_dir)
        .arg("--min-count")
        .arg("1")
        .arg("--min-len")
        .arg("0")
        .arg("--umi-tag")
        .arg("")
        .arg("--genotype")
        .assert()
        .success();

    let vcf = fs::read_to_string(out_dir.join("cellSNP.base.vcf")).unwrap();
    let data_lines: Vec<&str> = vcf.lines().skip(2).collect();
    assert_eq!(data_lines.len(), 1);
    assert!(data_lines[0].starts_with("chr1\t100\t.\tA\tC"));

    let cells_vcf = fs::read_to_string(out_dir.join("cellSNP.cells.vcf")).unwrap();
    assert!(cells_vcf.lines().any(|l| l.contains("GT:AD:DP:OTH:PL:ALL")));
}

/// Missing input file is rejected before any work starts.
#[test]
fn missing_input_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let mut cmd = Command::cargo_bin("scpileup").unwrap();
    cmd.arg("-i")
        .arg(dir.path().join("does-not-exist.reads"))
        .arg("--chroms")
        .arg("chr1")
        .arg("-o")
        .arg(&out_dir)
        .assert()
        .failure();
}
