use fxhash::FxHashMap;

use super::channel_buffer::ChannelBuffer;
use super::channel_map::ChannelMap;
use super::column::TableLayout;
use super::error::ChannelBuffersError;

/// The set of ChannelBuffers used by a decode loop, addressed by DAQ id.
///
/// One buffer is made for every channel in the ChannelMap when the set is created. No
/// buffers are added or removed afterwards, only their contents change.
#[derive(Debug)]
pub struct ChannelBuffers {
    buffers: FxHashMap<u32, ChannelBuffer>,
}

impl ChannelBuffers {
    /// Create a buffer for every channel in the map. Channels which carry their own
    /// capacity in the map use it, all others get `default_capacity`.
    pub fn new(
        channel_map: &ChannelMap,
        layout: &TableLayout,
        default_capacity: usize,
    ) -> Result<Self, ChannelBuffersError> {
        let mut buffers = FxHashMap::default();
        for entry in channel_map.entries() {
            let capacity = entry.capacity.unwrap_or(default_capacity);
            let buffer = ChannelBuffer::with_layout(entry.channel_id, capacity, layout)?;
            buffers.insert(entry.daq_id, buffer);
        }
        Ok(Self { buffers })
    }

    /// Get the buffer for a DAQ id
    pub fn get_mut(&mut self, daq_id: u32) -> Result<&mut ChannelBuffer, ChannelBuffersError> {
        self.buffers
            .get_mut(&daq_id)
            .ok_or(ChannelBuffersError::UnknownChannel(daq_id))
    }

    pub fn get(&self, daq_id: u32) -> Option<&ChannelBuffer> {
        self.buffers.get(&daq_id)
    }

    /// Visit every buffer, in DAQ id order
    pub fn for_each_mut<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut ChannelBuffer) -> Result<(), E>,
    {
        let mut ids: Vec<u32> = self.buffers.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(buffer) = self.buffers.get_mut(&id) {
                f(buffer)?;
            }
        }
        Ok(())
    }

    /// DAQ ids of every buffer, sorted
    pub fn daq_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.buffers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Total number of committed rows which have not been flushed
    pub fn pending_rows(&self) -> usize {
        self.buffers.values().map(|b| b.cursor()).sum()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnSpec, DataType};
    use crate::error::ChannelBufferError;

    fn layout() -> TableLayout {
        TableLayout::new(vec![ColumnSpec::scalar("x", DataType::U32)]).unwrap()
    }

    #[test]
    fn test_buffers_from_map() {
        let map = ChannelMap::from_csv("daq_id,channel_id,capacity\n3,30\n4,40,2\n").unwrap();
        let mut buffers = ChannelBuffers::new(&map, &layout(), 16).unwrap();
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers.daq_ids(), vec![3, 4]);
        assert_eq!(buffers.get(3).unwrap().capacity(), 16);
        assert_eq!(buffers.get(3).unwrap().channel_id(), 30);
        assert_eq!(buffers.get(4).unwrap().capacity(), 2);

        let buffer = buffers.get_mut(4).unwrap();
        buffer.set_field("x", 1u32).unwrap();
        buffer.commit_row().unwrap();
        assert_eq!(buffers.pending_rows(), 1);

        assert!(matches!(
            buffers.get_mut(5),
            Err(ChannelBuffersError::UnknownChannel(5))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let map = ChannelMap::from_csv("daq_id,channel_id,capacity\n3,30,0\n").unwrap();
        assert!(matches!(
            ChannelBuffers::new(&map, &layout(), 16),
            Err(ChannelBuffersError::BufferError(
                ChannelBufferError::ConfigurationError(_)
            ))
        ));
    }

    #[test]
    fn test_for_each_in_order() {
        let map = ChannelMap::from_csv("daq_id,channel_id\n9,1\n2,2\n5,3\n").unwrap();
        let mut buffers = ChannelBuffers::new(&map, &layout(), 4).unwrap();
        let mut seen = Vec::new();
        buffers
            .for_each_mut(|b| {
                seen.push(b.channel_id());
                Ok::<(), ChannelBufferError>(())
            })
            .unwrap();
        assert_eq!(seen, vec![2, 3, 1]);
    }
}
