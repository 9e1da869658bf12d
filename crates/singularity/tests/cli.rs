use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;
use tuning::ParameterSet;

fn singularity(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_singularity"))
        .env("SINGULARITY_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run singularity")
}

#[test]
fn params_prints_defaults_as_json() {
    let root = TempDir::new().unwrap();
    let output = singularity(root.path(), &["params", "--json"]);
    assert!(output.status.success());

    let parameters: ParameterSet = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parameters, ParameterSet::default());
}

#[test]
fn params_file_in_config_dir_is_picked_up() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("params.toml"),
        "bloom_strength = 0.2\n\n[temporal]\nblend = 0.5\n",
    )
    .unwrap();

    let output = singularity(root.path(), &["params", "--set", "render_scale=0.75"]);
    assert!(output.status.success());

    let parameters = ParameterSet::from_toml_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(parameters.bloom_strength, 0.2);
    assert_eq!(parameters.temporal.blend, 0.5);
    assert_eq!(parameters.render_scale, 0.75);
}

#[test]
fn out_of_range_values_are_clamped_not_rejected() {
    let root = TempDir::new().unwrap();
    let output = singularity(root.path(), &["params", "--json", "--set", "temporal.blend=5"]);
    assert!(output.status.success());

    let parameters: ParameterSet = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parameters.temporal.blend, 0.98);
}

#[test]
fn headless_renders_a_few_frames() {
    let root = TempDir::new().unwrap();
    let status = singularity(
        root.path(),
        &["headless", "--frames", "3", "--size", "32x18", "--seed", "7"],
    )
    .status;
    assert!(status.success());
}

#[test]
fn invalid_size_fails() {
    let root = TempDir::new().unwrap();
    let status = singularity(root.path(), &["headless", "--size", "0x18"]).status;
    assert!(!status.success());
}

#[test]
fn unknown_parameter_fails() {
    let root = TempDir::new().unwrap();
    let output = singularity(root.path(), &["params", "--set", "disc.spin=1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("disc.spin"));
}
