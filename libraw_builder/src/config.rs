use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::column::{ColumnSpec, TableLayout};
use super::constants::{DEFAULT_BUFFER_SIZE, OUTPUT_EXTENSION};
use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and buffering information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub experiment: String,
    pub datatype: String,
    pub timestamp: String,
    pub channel_map_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub buffer_size: usize,
    pub waveform_length: usize,
    pub windowed_waveforms: bool,
    #[serde(default)]
    pub layout: Option<Vec<ColumnSpec>>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            experiment: String::from(""),
            datatype: String::from("cal"),
            timestamp: String::from(""),
            channel_map_path: None,
            output_path: PathBuf::from("None"),
            buffer_size: DEFAULT_BUFFER_SIZE,
            waveform_length: 1024,
            windowed_waveforms: false,
            layout: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get the path to the channel map, which is required
    pub fn get_channel_map_path(&self) -> Result<&Path, ConfigError> {
        match self.channel_map_path.as_deref() {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ConfigError::BadFilePath(path.to_path_buf())),
            None => Err(ConfigError::MissingChannelMap),
        }
    }

    /// The table layout for every channel. An explicit layout in the config wins over the
    /// default raw layout.
    pub fn get_table_layout(&self) -> Result<TableLayout, ConfigError> {
        match &self.layout {
            Some(columns) => Ok(TableLayout::new(columns.clone())?),
            None => Ok(TableLayout::default_raw(
                self.waveform_length,
                self.windowed_waveforms,
            )?),
        }
    }

    /// Get the path to the output hdf5 file for an input file
    pub fn get_output_file_name(&self, input_path: &Path) -> Result<PathBuf, ConfigError> {
        let stem = match input_path.file_stem() {
            Some(stem) => stem,
            None => return Err(ConfigError::BadFilePath(input_path.to_path_buf())),
        };
        let output_file_path: PathBuf = self
            .output_path
            .join(format!("{}.{}", stem.to_string_lossy(), OUTPUT_EXTENSION));
        if self.output_path.exists() {
            Ok(output_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn is_buffer_size_valid(&self) -> bool {
        self.buffer_size >= 1
    }

    pub fn has_custom_layout(&self) -> bool {
        self.layout.is_some()
    }
}
