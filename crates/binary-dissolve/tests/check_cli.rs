use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::{GrayImage, Luma, Rgba, RgbaImage};
use tempfile::TempDir;

fn write_inputs(root: &Path) {
    RgbaImage::from_pixel(100, 100, Rgba([200, 40, 40, 255]))
        .save(root.join("photo.png"))
        .unwrap();
    GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([255]) } else { Luma([64]) })
        .save(root.join("glyphs.png"))
        .unwrap();
}

fn binary_dissolve(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_binary-dissolve"))
        .env("XDG_CONFIG_HOME", root.join("xdg"))
        .env_remove("BINARY_DISSOLVE_CONFIG")
        .env("RUST_LOG", "warn")
        .current_dir(root)
        .args(args)
        .output()
        .expect("failed to run binary-dissolve")
}

#[test]
fn check_reports_the_grid() {
    let root = TempDir::new().unwrap();
    write_inputs(root.path());

    let output = binary_dissolve(root.path(), &["check", "photo.png", "glyphs.png"]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grid: 10x10 cells"), "{stdout}");
    assert!(stdout.contains("(100x100)"), "{stdout}");
    assert!(stdout.contains("duration: 4s"), "{stdout}");
    assert!(stdout.contains("smoothness: 0.2"), "{stdout}");
}

#[test]
fn check_applies_scaling_from_the_config_file() {
    let root = TempDir::new().unwrap();
    write_inputs(root.path());
    let config = root.path().join("dissolve.toml");
    fs::write(
        &config,
        "image = \"photo.png\"\ncharacters = \"glyphs.png\"\ncharacter_scaling = 2.0\n",
    )
    .unwrap();

    let output = binary_dissolve(
        root.path(),
        &["check", "--config", config.to_str().unwrap()],
    );
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grid: 5x5 cells"), "{stdout}");
}

#[test]
fn check_fails_on_a_missing_atlas() {
    let root = TempDir::new().unwrap();
    write_inputs(root.path());

    let output = binary_dissolve(root.path(), &["check", "photo.png", "missing.png"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("glyph atlas"), "{stderr}");
}

#[test]
fn print_config_merges_flags_over_the_file() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("dissolve.toml");
    fs::write(&config, "duration = \"3s\"\nsmoothness = 0.5\n").unwrap();

    let output = binary_dissolve(
        root.path(),
        &[
            "print-config",
            "--config",
            config.to_str().unwrap(),
            "--smoothness",
            "0.25",
            "--clear",
            "opaque",
        ],
    );
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("version = 1"), "{stdout}");
    assert!(stdout.contains("duration = \"3s\""), "{stdout}");
    assert!(stdout.contains("smoothness = 0.25"), "{stdout}");
    assert!(stdout.contains("clear = \"opaque\""), "{stdout}");
}

#[test]
fn invalid_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("dissolve.toml");
    fs::write(&config, "version = 2\n").unwrap();

    let output = binary_dissolve(
        root.path(),
        &["print-config", "--config", config.to_str().unwrap()],
    );
    assert!(!output.status.success());
}
