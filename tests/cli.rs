use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;

fn xd2031() -> assert_cmd::Command {
    cargo_bin_cmd!("xd2031").into()
}

/// A blank, valid D64 image: 683 256-byte blocks, BAM/header sector at
/// (18,0) carrying a disk name so `dump`/`catalog` have something to
/// print.
fn write_blank_d64(path: &std::path::Path) {
    let mut data = vec![0u8; 683 * 256];
    let lba = 357usize; // D64.lba(18, 0)
    let block_start = lba * 256;
    // disk name at offset 0x90, padded with 0xA0
    for b in data[block_start + 0x90..block_start + 0xa0].iter_mut() {
        *b = 0xA0;
    }
    data[block_start + 0x90] = 0xc4; // PETSCII 'D' (screen code range)
    data[block_start + 0x91] = 0xc9;
    data[block_start + 0x92] = 0xd3;
    data[block_start + 0x93] = 0xcb;
    // id/dos-version at offset 0xA2
    data[block_start + 0xa2] = b'0';
    data[block_start + 0xa3] = b'1';
    data[block_start + 0xa4] = b'2';
    data[block_start + 0xa5] = b'A';

    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&data).unwrap();
}

#[test]
fn help_works() {
    xd2031().arg("--help").assert().success().stdout(
        predicate::str::contains("disk-image server and image tooling"),
    );
}

#[test]
fn dump_reports_geometry_for_a_blank_d64() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("blank.d64");
    write_blank_d64(&image_path);

    xd2031()
        .args(["dump", image_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("D64"))
        .stdout(predicate::str::contains("blocks:     683"));
}

#[test]
fn catalog_prints_header_line_for_a_blank_d64() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("blank.d64");
    write_blank_d64(&image_path);

    xd2031()
        .args(["catalog", image_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 \""));
}

#[test]
fn scan_reports_a_clean_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("blank.d64");
    write_blank_d64(&image_path);

    xd2031()
        .args(["scan", image_path.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn dump_rejects_a_file_of_unrecognized_size() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("bogus.img");
    std::fs::write(&image_path, vec![0u8; 12345]).unwrap();

    xd2031()
        .args(["dump", image_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("matches no known geometry"));
}

#[test]
fn merge_requires_at_least_two_images() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("blank.d64");
    write_blank_d64(&image_path);
    let out_path = dir.path().join("out.d64");

    xd2031()
        .args([
            "merge",
            "--out",
            out_path.to_str().unwrap(),
            image_path.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least two images"));
}

#[test]
fn merge_of_two_identical_images_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.d64");
    let b = dir.path().join("b.d64");
    write_blank_d64(&a);
    write_blank_d64(&b);
    let out_path = dir.path().join("merged.d64");

    xd2031()
        .args([
            "merge",
            "--out",
            out_path.to_str().unwrap(),
            a.to_str().unwrap(),
            b.to_str().unwrap(),
        ])
        .assert()
        .success();

    let merged = std::fs::read(&out_path).unwrap();
    assert_eq!(merged.len(), 683 * 256);
}
