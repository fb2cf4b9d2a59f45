use std::path::Path;
use std::process::{Command, Output};

use libraw_builder::config::Config;

fn run_cli(dir: &Path, config_path: &Path, inputs: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_raw_builder_cli"))
        .arg("-p")
        .arg(config_path)
        .arg("--log")
        .arg(dir.join("raw_builder.log"))
        .arg("run")
        .args(inputs)
        .output()
        .unwrap()
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("run0001.rawb");
    let output = run_cli(dir.path(), &dir.path().join("nope.yml"), &[&input]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_failed_worker_fails() {
    let dir = tempfile::tempdir().unwrap();
    let map_path = dir.path().join("channel_map.csv");
    std::fs::write(&map_path, "daq_id,channel_id\n1,1\n").unwrap();

    let mut config = Config::default();
    config.channel_map_path = Some(map_path);
    config.output_path = dir.path().to_path_buf();
    let config_path = dir.path().join("config.yml");
    std::fs::write(&config_path, serde_yaml::to_string(&config).unwrap()).unwrap();

    // The input does not exist so its worker fails
    let input = dir.path().join("run0001.rawb");
    let output = run_cli(dir.path(), &config_path, &[&input]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 worker(s) failed"));
}
