use std::collections::VecDeque;

use super::column::FieldValue;
use super::error::DecoderError;

/// The decoded fields of one channel in one DAQ event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRecord {
    pub daq_id: u32,
    pub fields: Vec<(String, FieldValue)>,
}

impl ChannelRecord {
    pub fn new(daq_id: u32) -> Self {
        Self {
            daq_id,
            fields: Vec::new(),
        }
    }

    /// Builder style helper to add a field
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((String::from(name), value.into()));
        self
    }
}

/// One DAQ event. Each record becomes one row in the buffer of its channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedEvent {
    pub records: Vec<ChannelRecord>,
}

/// Anything which produces decoded events for the decode loop.
pub trait EventSource {
    /// Get the next event.
    ///
    /// Returns a `Result<Option<DecodedEvent>>`. The Option is None if the source has no
    /// more data.
    fn next_event(&mut self) -> Result<Option<DecodedEvent>, DecoderError>;

    /// Fraction of the source consumed so far, from 0 to 1
    fn progress(&self) -> f32 {
        0.0
    }
}

/// In-memory source, mostly useful for feeding a decode loop from another decoder
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: VecDeque<DecodedEvent>,
    total: usize,
}

impl EventQueue {
    pub fn new(events: Vec<DecodedEvent>) -> Self {
        let total = events.len();
        Self {
            events: VecDeque::from(events),
            total,
        }
    }
}

impl EventSource for EventQueue {
    fn next_event(&mut self) -> Result<Option<DecodedEvent>, DecoderError> {
        Ok(self.events.pop_front())
    }

    fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.events.len()) as f32 / self.total as f32
    }
}
