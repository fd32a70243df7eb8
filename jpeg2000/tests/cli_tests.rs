use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn segment(marker: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut bytes = marker.to_vec();
    bytes.extend(((payload.len() + 2) as u16).to_be_bytes());
    bytes.extend(payload);
    bytes
}

/// SOC, SIZ for a 32x16 8-bit image in 16x16 tiles, COD and QCD.
fn main_header() -> Vec<u8> {
    let mut siz = vec![0, 0];
    for value in [32u32, 16, 0, 0, 16, 16, 0, 0] {
        siz.extend(value.to_be_bytes());
    }
    siz.extend(1u16.to_be_bytes());
    siz.extend([7, 1, 1]);

    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(segment([0xFF, 0x51], &siz));
    bytes.extend(segment([0xFF, 0x52], &[0, 0, 0, 1, 0, 0, 4, 4, 0, 1]));
    bytes.extend(segment([0xFF, 0x5C], &[0x40, 0x48]));
    bytes
}

fn tile_part(tile_index: u16, data: &[u8], psot: Option<u32>) -> Vec<u8> {
    let length = (12 + 2 + data.len()) as u32;
    let mut bytes = vec![0xFF, 0x90, 0, 10];
    bytes.extend(tile_index.to_be_bytes());
    bytes.extend(psot.unwrap_or(length).to_be_bytes());
    bytes.extend([0, 1, 0xFF, 0x93]);
    bytes.extend(data);
    bytes
}

/// Two raw 16x16 tiles. `second` replaces the data of tile 1.
fn codestream(second: Option<&[u8]>) -> Vec<u8> {
    let tile = vec![0x55u8; 16 * 16];
    let mut bytes = main_header();
    bytes.extend(tile_part(0, &tile, None));
    bytes.extend(tile_part(1, second.unwrap_or(&tile), None));
    bytes.extend([0xFF, 0xD9]);
    bytes
}

fn jp2_box(box_type: &[u8; 4], contents: &[u8]) -> Vec<u8> {
    let mut bytes = ((contents.len() + 8) as u32).to_be_bytes().to_vec();
    bytes.extend(box_type);
    bytes.extend(contents);
    bytes
}

fn jp2_file(codestream: &[u8]) -> Vec<u8> {
    let mut ihdr = Vec::new();
    ihdr.extend(16u32.to_be_bytes());
    ihdr.extend(32u32.to_be_bytes());
    ihdr.extend(1u16.to_be_bytes());
    ihdr.extend([7, 7, 0, 0]);

    let mut bytes = jp2_box(b"jP  ", &[13, 10, 135, 10]);
    bytes.extend(jp2_box(b"ftyp", b"jp2 \0\0\0\0jp2 "));
    bytes.extend(jp2_box(b"jp2h", &jp2_box(b"ihdr", &ihdr)));
    bytes.extend(jp2_box(b"jp2c", codestream));
    bytes.extend(jp2_box(b"xml ", b"<trailing/>"));
    bytes
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn jp2tiles(path: &Path, flags: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jp2tiles"))
        .args(flags)
        .arg(path)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.starts_with("INFO: "))
        .map(String::from)
        .collect()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const IMAGE_INFO: [&str; 4] = [
    "Image info:",
    "Width: 32, Height: 16",
    "Number of tiles (X, Y): (2, 1)",
    "Total number of tiles: 2",
];

#[test]
fn test_all_tiles_decoded() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "image.j2k", &codestream(None));

    let output = jp2tiles(&path, &[]);
    assert_eq!(output.status.code(), Some(0));

    let mut expected = IMAGE_INFO.to_vec();
    expected.extend([
        "Decoding tile 0...",
        "Tile 0 decoded successfully.",
        "Decoding tile 1...",
        "Tile 1 decoded successfully.",
    ]);
    assert_eq!(stdout_lines(&output), expected);
}

#[test]
fn test_jp2_with_box_after_codestream() {
    let dir = TempDir::new().unwrap();
    let tile = vec![0x55u8; 16 * 16];
    let mut stream = main_header();
    stream.extend(tile_part(0, &tile, None));
    stream.extend(tile_part(1, &tile, Some(0)));
    stream.extend([0xFF, 0xD9]);
    let path = write(&dir, "image.jp2", &jp2_file(&stream));

    let output = jp2tiles(&path, &[]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(
        stdout_lines(&output).last().map(String::as_str),
        Some("Tile 1 decoded successfully.")
    );
}

#[test]
fn test_tile_failure_keeps_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.j2k", &codestream(Some(&[0; 10])));

    let output = jp2tiles(&path, &[]);
    assert_eq!(output.status.code(), Some(0));

    let mut expected = IMAGE_INFO.to_vec();
    expected.extend([
        "Decoding tile 0...",
        "Tile 0 decoded successfully.",
        "Decoding tile 1...",
    ]);
    assert_eq!(stdout_lines(&output), expected);
    assert!(stderr(&output).contains("Failed to decode tile 1. Quitting."));
}

#[test]
fn test_fail_on_tile_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.j2k", &codestream(Some(&[0; 10])));

    let output = jp2tiles(&path, &["--fail-on-tile-error"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to decode tile 1. Quitting."));
}

#[test]
fn test_usage_without_arguments() {
    let output = Command::new(env!("CARGO_BIN_EXE_jp2tiles"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.starts_with("Usage: "), "{}", stderr);
    assert!(stderr.trim_end().ends_with(" <input.jp2>"), "{}", stderr);
}

#[test]
fn test_usage_with_extra_argument() {
    let output = Command::new(env!("CARGO_BIN_EXE_jp2tiles"))
        .args(["a.jp2", "b.jp2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Usage: "));
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let output = jp2tiles(&dir.path().join("missing.jp2"), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to create input stream"));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_unrecognised_input() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "notes.txt", b"not an image at all");

    let output = jp2tiles(&path, &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to create codec"));
}

#[test]
fn test_invalid_configuration() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "image.j2k", &codestream(None));

    let output = jp2tiles(&path, &["--max-bit-depth", "40"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to set up decoder"));
}

#[test]
fn test_truncated_header() {
    let dir = TempDir::new().unwrap();
    let mut bytes = main_header();
    bytes.truncate(30);
    let path = write(&dir, "short.j2k", &bytes);

    let output = jp2tiles(&path, &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to read the image header"));
    assert!(!stdout_lines(&output).iter().any(|line| line == "Image info:"));
}
