// Event stream format
pub const EVENT_STREAM_MAGIC: [u8; 4] = *b"RAWB";
pub const EVENT_STREAM_VERSION: u16 = 1;
pub const MAX_FIELD_NAME_BYTES: usize = u8::MAX as usize;

// Buffering
pub const DEFAULT_BUFFER_SIZE: usize = 1024; // rows per channel between flushes

// Output
pub const RAW_TABLE_NAME: &str = "raw";
pub const OUTPUT_EXTENSION: &str = "h5";
/// This is the version of the output format
pub const FORMAT_VERSION: &str = "1.0";
