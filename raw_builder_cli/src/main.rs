//! # raw_builder_cli
//!
//! Part of the raw_builder crate family.
//!
//! This is the command line application which builds raw tier files.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! raw_builder_cli -p config.yml new
//! ```
//!
//! edit it, then build one or more decoded event files with
//!
//! ```bash
//! raw_builder_cli -p config.yml run run0001.rawb run0002.rawb
//! ```
//!
//! Files are divided amongst `n_threads` workers. Progress is shown in the terminal and
//! the detailed log is written to `raw_builder.log` (change it with `--log`).
use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libraw_builder::config::Config;
use libraw_builder::process::{create_subsets, process_subset};
use libraw_builder::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn init_logging(log_path: &Path) {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(log_path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()
            .expect("Could not create log file!"),
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()
            .expect("Could not create logger!"),
    );
    spdlog::set_default_logger(logger);
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let template = match color {
        BarColor::CYAN => "{prefix:>10} [{bar:40.cyan/blue}] {percent:>3}% {msg}",
        BarColor::GREEN => "{prefix:>10} [{bar:40.green/blue}] {percent:>3}% {msg}",
        BarColor::RED => "{prefix:>10} [{bar:40.red/blue}] {percent:>3}% {msg}",
    };
    ProgressStyle::with_template(template).expect("Bad progress bar template")
}

fn main() {
    // Create a cli
    let matches = Command::new("raw_builder_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("run")
                .about("Build raw tier files from decoded event files")
                .arg(
                    Arg::new("inputs")
                        .help("Decoded event files")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .default_value("raw_builder.log")
                .action(ArgAction::Set)
                .help("Path to the log file"),
        )
        .get_matches();

    // Initialize feedback
    let log_path = PathBuf::from(matches.get_one::<String>("log").expect("Log has a default"));
    init_logging(&log_path);
    let pb_manager = MultiProgress::new();

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    let inputs: Vec<PathBuf> = match matches.subcommand() {
        Some(("new", _)) => {
            spdlog::info!(
                "Making a template config at {}...",
                config_path.to_string_lossy()
            );
            make_template_config(&config_path);
            println!("Wrote template config to {}", config_path.display());
            return;
        }
        Some(("run", sub)) => sub
            .get_many::<String>("inputs")
            .expect("Inputs are required")
            .map(PathBuf::from)
            .collect(),
        _ => {
            eprintln!("No subcommand given; use new or run");
            std::process::exit(2);
        }
    };

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if !config.is_n_threads_valid() || !config.is_buffer_size_valid() {
        spdlog::error!("n_threads and buffer_size must both be at least 1");
        eprintln!("n_threads and buffer_size must both be at least 1");
        std::process::exit(1);
    }
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Output Path: {}", config.output_path.to_string_lossy());
    spdlog::info!("Channel Map Path: {:?}", config.channel_map_path);
    spdlog::info!(
        "Experiment: {} Datatype: {} Timestamp: {}",
        config.experiment,
        config.datatype,
        config.timestamp
    );
    spdlog::info!("Buffer size: {} rows", config.buffer_size);
    spdlog::info!("Custom layout: {}", config.has_custom_layout());

    // Spawn the workers!
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = Vec::new();
    let mut bars: Vec<ProgressBar> = Vec::new();
    for (idx, subset) in create_subsets(&config, &inputs).into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let pb = pb_manager.add(ProgressBar::new(100));
        pb.set_style(bar_style(&BarColor::CYAN));
        pb.set_prefix(format!("worker {idx}"));
        bars.push(pb);
        let conf = config.clone();
        let worker_tx = tx.clone();
        let worker_id = bars.len() - 1;
        workers.push(std::thread::spawn(move || {
            process_subset(conf, worker_tx, worker_id, subset)
        }));
    }
    drop(tx);

    // Every sender is gone once the last worker exits
    for status in rx.iter() {
        if let Some(pb) = bars.get(status.worker_id) {
            pb.set_style(bar_style(&status.color));
            pb.set_message(status.file_name.clone());
            pb.set_position((status.progress * 100.0) as u64);
        }
    }

    let mut n_failed = 0;
    for (worker, pb) in workers.into_iter().zip(bars.iter()) {
        match worker.join() {
            Ok(Ok(())) => pb.finish_with_message("done"),
            Ok(Err(e)) => {
                n_failed += 1;
                spdlog::error!("Building failed with error: {e}");
                pb.abandon_with_message(format!("failed: {e}"));
            }
            Err(_) => {
                n_failed += 1;
                spdlog::error!("Failed to join building task!");
                pb.abandon_with_message("worker panicked");
            }
        }
    }

    spdlog::info!("Done.");
    if n_failed == 0 {
        spdlog::info!("Successfully built raw tier files!");
    } else {
        eprintln!(
            "{n_failed} worker(s) failed, check {} for details",
            log_path.display()
        );
        std::process::exit(1);
    }
}
