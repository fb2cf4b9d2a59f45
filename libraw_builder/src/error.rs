use std::path::PathBuf;
use thiserror::Error;

use super::column::DataType;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnSpecError {
    #[error("Column spec has an empty name")]
    EmptyName,
    #[error("Column {0} appears more than once in the table layout")]
    DuplicateName(String),
    #[error("Vector column {0} was given a length of zero")]
    ZeroLength(String),
    #[error("Column {0} has an empty path segment")]
    BadPath(String),
    #[error("Column {0} is also used as the table holding column {1}")]
    PathConflict(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelBufferError {
    #[error("ChannelBuffer could not be created due to configuration error: {0}")]
    ConfigurationError(String),
    #[error("ChannelBuffer for channel {channel} has no field named {field}")]
    UnknownField { channel: u32, field: String },
    #[error("ChannelBuffer for channel {channel} expected field {field} with shape {expected:?} but was given shape {given:?}")]
    ShapeMismatch {
        channel: u32,
        field: String,
        expected: Option<usize>,
        given: Option<usize>,
    },
    #[error("ChannelBuffer for channel {channel} expected field {field} of type {expected} but was given {given}")]
    TypeMismatch {
        channel: u32,
        field: String,
        expected: DataType,
        given: DataType,
    },
    #[error("ChannelBuffer for channel {channel} overflowed its capacity of {capacity} rows; it must be flushed first")]
    BufferOverflow { channel: u32, capacity: usize },
}

impl From<ColumnSpecError> for ChannelBufferError {
    fn from(value: ColumnSpecError) -> Self {
        Self::ConfigurationError(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ChannelMapError {
    #[error("ChannelMap failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ChannelMap failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("ChannelMap was given a file with the incorrect format; most likely the number of columns is incorrect")]
    BadFileFormat,
    #[error("ChannelMap contains DAQ id {0} more than once")]
    DuplicateDaqId(u32),
    #[error("ChannelMap contains output channel {0} more than once")]
    DuplicateChannel(u32),
}

#[derive(Debug, Error)]
pub enum ChannelBuffersError {
    #[error("ChannelBuffers failed to create a buffer: {0}")]
    BufferError(#[from] ChannelBufferError),
    #[error("ChannelBuffers has no buffer for DAQ id {0}; it is not in the channel map")]
    UnknownChannel(u32),
}

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Decoder failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not open event file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Event file has bad magic bytes {0:?}")]
    BadMagic([u8; 4]),
    #[error("Event file has unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("Event file contains unknown data type code {0}")]
    BadTypeCode(u8),
    #[error("Event file contains a field name which is not valid UTF-8")]
    BadFieldName(#[from] std::string::FromUtf8Error),
    #[error("Event file ended in the middle of an event")]
    TruncatedEvent,
    #[error("Field name {0} is too long to be written to an event file")]
    FieldNameTooLong(String),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("HDF5Writer failed to convert a string attribute: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("HDF5Writer was given an output path {0:?} with no file name")]
    BadFilePath(PathBuf),
    #[error("HDF5Writer found dataset {0} with shape {1:?} which cannot accept rows of width {2}")]
    ShapeConflict(String, Vec<usize>, usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config does not name a channel map; set channel_map_path")]
    MissingChannelMap,
    #[error("Config has an invalid table layout: {0}")]
    BadLayout(#[from] ColumnSpecError),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to ChannelBuffer error: {0}")]
    BufferError(#[from] ChannelBufferError),
    #[error("Processor failed due to ChannelBuffers error: {0}")]
    BuffersError(#[from] ChannelBuffersError),
    #[error("Processor failed due to ChannelMap error: {0}")]
    MapError(#[from] ChannelMapError),
    #[error("Processor failed due to Decoder error: {0}")]
    DecoderError(#[from] DecoderError),
    #[error("Processor failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor found no data for DAQ ids {0:?} in the first event; the channel map does not match the input")]
    MissingChannels(Vec<u32>),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
