// The channel map connects the identifier a digitizer stamps on its data (the DAQ id) to the
// stable channel number used to name the output tables. The map is a CSV file:
//
// daq_id,channel_id[,capacity]
//
// The optional third column overrides the buffer capacity for that one channel, which is
// handy for channels that trigger far more often than the rest (pulsers, vetoes).
use std::fs::File;
use std::io::Read;
use std::path::Path;

use fxhash::{FxHashMap, FxHashSet};

use super::error::ChannelMapError;

const MIN_ENTRIES_PER_LINE: usize = 2; //daq_id, channel_id
const MAX_ENTRIES_PER_LINE: usize = 3; //daq_id, channel_id, capacity

/// A single channel of the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub daq_id: u32,
    pub channel_id: u32,
    pub capacity: Option<usize>,
}

/// ChannelMap contains the mapping of DAQ ids to output channel ids.
///
/// Once built the map is never modified.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    map: FxHashMap<u32, ChannelEntry>,
}

impl ChannelMap {
    /// Read a ChannelMap from a CSV file. The first line is a header and is skipped.
    pub fn new(path: &Path) -> Result<Self, ChannelMapError> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
        Self::from_csv(&contents)
    }

    /// Parse a ChannelMap from the text of a CSV file
    pub fn from_csv(contents: &str) -> Result<Self, ChannelMapError> {
        let mut cm = ChannelMap::default();
        let mut channels = FxHashSet::default();

        let mut lines = contents.lines();
        lines.next(); // Skip the header
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let entries: Vec<&str> = line.split_terminator(',').map(|e| e.trim()).collect();
            if entries.len() < MIN_ENTRIES_PER_LINE || entries.len() > MAX_ENTRIES_PER_LINE {
                return Err(ChannelMapError::BadFileFormat);
            }

            let daq_id: u32 = entries[0].parse()?;
            let channel_id: u32 = entries[1].parse()?;
            let capacity: Option<usize> = match entries.get(2) {
                Some(cap) if !cap.is_empty() => Some(cap.parse()?),
                _ => None,
            };

            if !channels.insert(channel_id) {
                return Err(ChannelMapError::DuplicateChannel(channel_id));
            }
            let entry = ChannelEntry {
                daq_id,
                channel_id,
                capacity,
            };
            if cm.map.insert(daq_id, entry).is_some() {
                return Err(ChannelMapError::DuplicateDaqId(daq_id));
            }
        }

        Ok(cm)
    }

    /// Get the channel for a DAQ id.
    ///
    /// If returns None the DAQ id does not exist in the map
    pub fn get_channel(&self, daq_id: u32) -> Option<&ChannelEntry> {
        self.map.get(&daq_id)
    }

    /// All entries, ordered by DAQ id
    pub fn entries(&self) -> Vec<&ChannelEntry> {
        let mut entries: Vec<&ChannelEntry> = self.map.values().collect();
        entries.sort_by_key(|e| e.daq_id);
        entries
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_map() {
        let csv = "daq_id,channel_id,capacity\n10,1\n11,2,64\n\n12,3,\n";
        let map = ChannelMap::from_csv(csv).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(
            map.get_channel(11),
            Some(&ChannelEntry {
                daq_id: 11,
                channel_id: 2,
                capacity: Some(64)
            })
        );
        assert_eq!(map.get_channel(12).unwrap().capacity, None);
        assert!(map.get_channel(13).is_none());
        let ids: Vec<u32> = map.entries().iter().map(|e| e.daq_id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_bad_maps() {
        assert!(matches!(
            ChannelMap::from_csv("header\n10\n"),
            Err(ChannelMapError::BadFileFormat)
        ));
        assert!(matches!(
            ChannelMap::from_csv("header\n10,1,2,3\n"),
            Err(ChannelMapError::BadFileFormat)
        ));
        assert!(matches!(
            ChannelMap::from_csv("header\nten,1\n"),
            Err(ChannelMapError::ParsingError(_))
        ));
        assert!(matches!(
            ChannelMap::from_csv("header\n10,1\n10,2\n"),
            Err(ChannelMapError::DuplicateDaqId(10))
        ));
        assert!(matches!(
            ChannelMap::from_csv("header\n10,1\n11,1\n"),
            Err(ChannelMapError::DuplicateChannel(1))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ChannelMap::new(Path::new("/definitely/not/a/channel_map.csv"));
        assert!(matches!(result, Err(ChannelMapError::IOError(_))));
    }
}
