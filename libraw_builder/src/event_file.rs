// The decoded event stream is the hand-off format between a DAQ specific decoder and the raw
// tier builder. All values are little endian.
//
// header: magic "RAWB", u16 version
// event:  u32 n_records, then n_records records
// record: u32 daq_id, u16 n_fields, then n_fields fields
// field:  u8 name_len, name (utf8), u8 type code, u32 count (0 = scalar), payload
//
// A stream may end only on an event boundary.
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::column::{DataType, FieldValue};
use super::constants::{EVENT_STREAM_MAGIC, EVENT_STREAM_VERSION, MAX_FIELD_NAME_BYTES};
use super::decoder::{ChannelRecord, DecodedEvent, EventSource};
use super::error::DecoderError;

/// Reader which counts how many bytes have passed through it
#[derive(Debug)]
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.count += amt as u64;
        self.inner.consume(amt)
    }
}

/// EventStream reads DecodedEvents from the binary event stream format.
#[derive(Debug)]
pub struct EventStream<R: BufRead> {
    reader: CountingReader<R>,
    total_bytes: u64,
    is_ended: bool,
}

/// An EventStream reading from a file on disk
pub type EventFile = EventStream<BufReader<File>>;

impl EventStream<BufReader<File>> {
    /// Open an event file and check its header
    pub fn open(path: &Path) -> Result<Self, DecoderError> {
        if !path.exists() {
            return Err(DecoderError::BadFilePath(PathBuf::from(path)));
        }
        let file = File::open(path)?;
        let total_bytes = file.metadata()?.len();
        Self::from_reader(BufReader::new(file), total_bytes)
    }
}

impl<R: BufRead> EventStream<R> {
    /// Wrap a reader positioned at the start of a stream. `total_bytes` is only used to
    /// report progress.
    pub fn from_reader(reader: R, total_bytes: u64) -> Result<Self, DecoderError> {
        let mut reader = CountingReader {
            inner: reader,
            count: 0,
        };
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != EVENT_STREAM_MAGIC {
            return Err(DecoderError::BadMagic(magic));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != EVENT_STREAM_VERSION {
            return Err(DecoderError::UnsupportedVersion(version));
        }
        Ok(Self {
            reader,
            total_bytes,
            is_ended: false,
        })
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.count
    }

    fn read_event(&mut self) -> Result<DecodedEvent, DecoderError> {
        let n_records = self.reader.read_u32::<LittleEndian>()?;
        let mut event = DecodedEvent::default();
        for _ in 0..n_records {
            let daq_id = self.reader.read_u32::<LittleEndian>()?;
            let n_fields = self.reader.read_u16::<LittleEndian>()?;
            let mut record = ChannelRecord::new(daq_id);
            for _ in 0..n_fields {
                record.fields.push(self.read_field()?);
            }
            event.records.push(record);
        }
        Ok(event)
    }

    fn read_field(&mut self) -> Result<(String, FieldValue), DecoderError> {
        let name_len = self.reader.read_u8()? as usize;
        let mut name = vec![0u8; name_len];
        self.reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)?;

        let code = self.reader.read_u8()?;
        let dtype = DataType::from_code(code).ok_or(DecoderError::BadTypeCode(code))?;
        let count = self.reader.read_u32::<LittleEndian>()? as usize;
        let r = &mut self.reader;
        if count == 0 {
            let value = match dtype {
                DataType::Bool => FieldValue::Bool(r.read_u8()? != 0),
                DataType::U16 => FieldValue::U16(r.read_u16::<LittleEndian>()?),
                DataType::U32 => FieldValue::U32(r.read_u32::<LittleEndian>()?),
                DataType::I32 => FieldValue::I32(r.read_i32::<LittleEndian>()?),
                DataType::I64 => FieldValue::I64(r.read_i64::<LittleEndian>()?),
                DataType::F64 => FieldValue::F64(r.read_f64::<LittleEndian>()?),
            };
            return Ok((name, value));
        }

        // The count is not trusted: the payload buffer only grows as bytes actually arrive
        let n_bytes = count as u64 * dtype.size() as u64;
        let mut bytes = Vec::new();
        r.take(n_bytes).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < n_bytes {
            return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
        }
        let value = match dtype {
            DataType::Bool => FieldValue::BoolVec(bytes.into_iter().map(|b| b != 0).collect()),
            DataType::U16 => {
                let mut values = vec![0u16; count];
                LittleEndian::read_u16_into(&bytes, &mut values);
                FieldValue::U16Vec(values)
            }
            DataType::U32 => {
                let mut values = vec![0u32; count];
                LittleEndian::read_u32_into(&bytes, &mut values);
                FieldValue::U32Vec(values)
            }
            DataType::I32 => {
                let mut values = vec![0i32; count];
                LittleEndian::read_i32_into(&bytes, &mut values);
                FieldValue::I32Vec(values)
            }
            DataType::I64 => {
                let mut values = vec![0i64; count];
                LittleEndian::read_i64_into(&bytes, &mut values);
                FieldValue::I64Vec(values)
            }
            DataType::F64 => {
                let mut values = vec![0f64; count];
                LittleEndian::read_f64_into(&bytes, &mut values);
                FieldValue::F64Vec(values)
            }
        };
        Ok((name, value))
    }
}

impl<R: BufRead> EventSource for EventStream<R> {
    fn next_event(&mut self) -> Result<Option<DecodedEvent>, DecoderError> {
        if self.is_ended {
            return Ok(None);
        }
        if self.reader.fill_buf()?.is_empty() {
            self.is_ended = true;
            return Ok(None);
        }
        match self.read_event() {
            Ok(event) => Ok(Some(event)),
            Err(DecoderError::IOError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                self.is_ended = true;
                Err(DecoderError::TruncatedEvent)
            }
            Err(e) => Err(e),
        }
    }

    fn progress(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.reader.count as f64 / self.total_bytes as f64) as f32
    }
}

/// EventStreamWriter produces the binary event stream, e.g. from a DAQ specific decoder
#[derive(Debug)]
pub struct EventStreamWriter<W: Write> {
    writer: W,
}

impl<W: Write> EventStreamWriter<W> {
    /// Create the writer and emit the stream header
    pub fn new(mut writer: W) -> Result<Self, DecoderError> {
        writer.write_all(&EVENT_STREAM_MAGIC)?;
        writer.write_u16::<LittleEndian>(EVENT_STREAM_VERSION)?;
        Ok(Self { writer })
    }

    pub fn write_event(&mut self, event: &DecodedEvent) -> Result<(), DecoderError> {
        let w = &mut self.writer;
        w.write_u32::<LittleEndian>(event.records.len() as u32)?;
        for record in event.records.iter() {
            w.write_u32::<LittleEndian>(record.daq_id)?;
            w.write_u16::<LittleEndian>(record.fields.len() as u16)?;
            for (name, value) in record.fields.iter() {
                if name.len() > MAX_FIELD_NAME_BYTES {
                    return Err(DecoderError::FieldNameTooLong(name.clone()));
                }
                w.write_u8(name.len() as u8)?;
                w.write_all(name.as_bytes())?;
                w.write_u8(value.dtype().code())?;
                w.write_u32::<LittleEndian>(value.length().unwrap_or(0) as u32)?;
                match value {
                    FieldValue::Bool(v) => w.write_u8(*v as u8)?,
                    FieldValue::U16(v) => w.write_u16::<LittleEndian>(*v)?,
                    FieldValue::U32(v) => w.write_u32::<LittleEndian>(*v)?,
                    FieldValue::I32(v) => w.write_i32::<LittleEndian>(*v)?,
                    FieldValue::I64(v) => w.write_i64::<LittleEndian>(*v)?,
                    FieldValue::F64(v) => w.write_f64::<LittleEndian>(*v)?,
                    FieldValue::BoolVec(vs) => {
                        for v in vs {
                            w.write_u8(*v as u8)?;
                        }
                    }
                    FieldValue::U16Vec(vs) => {
                        for v in vs {
                            w.write_u16::<LittleEndian>(*v)?;
                        }
                    }
                    FieldValue::U32Vec(vs) => {
                        for v in vs {
                            w.write_u32::<LittleEndian>(*v)?;
                        }
                    }
                    FieldValue::I32Vec(vs) => {
                        for v in vs {
                            w.write_i32::<LittleEndian>(*v)?;
                        }
                    }
                    FieldValue::I64Vec(vs) => {
                        for v in vs {
                            w.write_i64::<LittleEndian>(*v)?;
                        }
                    }
                    FieldValue::F64Vec(vs) => {
                        for v in vs {
                            w.write_f64::<LittleEndian>(*v)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W, DecoderError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_event(id: u32) -> DecodedEvent {
        DecodedEvent {
            records: vec![
                ChannelRecord::new(id)
                    .with_field("timestamp", 1.5)
                    .with_field("is_inverted", true)
                    .with_field("waveform/values", vec![1u16, 2, 3]),
                ChannelRecord::new(id + 1).with_field("event_number", -4i32),
            ],
        }
    }

    fn encode(events: &[DecodedEvent]) -> Vec<u8> {
        let mut writer = EventStreamWriter::new(Vec::new()).unwrap();
        for event in events {
            writer.write_event(event).unwrap();
        }
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_read_stream() {
        let events = vec![sample_event(1), sample_event(10)];
        let bytes = encode(&events);
        let total = bytes.len() as u64;
        let mut stream = EventStream::from_reader(Cursor::new(bytes), total).unwrap();
        assert_eq!(stream.next_event().unwrap(), Some(events[0].clone()));
        assert!(stream.progress() > 0.0 && stream.progress() < 1.0);
        assert_eq!(stream.next_event().unwrap(), Some(events[1].clone()));
        assert_eq!(stream.next_event().unwrap(), None);
        assert_eq!(stream.bytes_read(), total);
        assert_eq!(stream.progress(), 1.0);
        assert_eq!(stream.next_event().unwrap(), None);
    }

    #[test]
    fn test_truncated_event() {
        let mut bytes = encode(&[sample_event(1)]);
        bytes.truncate(bytes.len() - 3);
        let mut stream = EventStream::from_reader(Cursor::new(bytes), 0).unwrap();
        assert!(matches!(
            stream.next_event(),
            Err(DecoderError::TruncatedEvent)
        ));
        assert!(matches!(stream.next_event(), Ok(None)));
    }

    #[test]
    fn test_bad_header() {
        let result = EventStream::from_reader(Cursor::new(b"NOPE\x01\x00".to_vec()), 0);
        assert!(matches!(result, Err(DecoderError::BadMagic(m)) if &m == b"NOPE"));
        let result = EventStream::from_reader(Cursor::new(b"RAWB\x09\x00".to_vec()), 0);
        assert!(matches!(result, Err(DecoderError::UnsupportedVersion(9))));
    }

    #[test]
    fn test_bad_type_code() {
        let mut bytes = encode(&[]);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // one record
        bytes.extend_from_slice(&3u32.to_le_bytes()); // daq id
        bytes.extend_from_slice(&1u16.to_le_bytes()); // one field
        bytes.push(1);
        bytes.push(b'x');
        bytes.push(77); // not a type
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let mut stream = EventStream::from_reader(Cursor::new(bytes), 0).unwrap();
        assert!(matches!(
            stream.next_event(),
            Err(DecoderError::BadTypeCode(77))
        ));
    }

    #[test]
    fn test_oversized_vector_count() {
        let mut bytes = encode(&[]);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // one record
        bytes.extend_from_slice(&3u32.to_le_bytes()); // daq id
        bytes.extend_from_slice(&1u16.to_le_bytes()); // one field
        bytes.push(1);
        bytes.push(b'w');
        bytes.push(DataType::F64.code());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        let total = bytes.len() as u64;
        let mut stream = EventStream::from_reader(Cursor::new(bytes), total).unwrap();
        assert!(matches!(
            stream.next_event(),
            Err(DecoderError::TruncatedEvent)
        ));
        assert!(matches!(stream.next_event(), Ok(None)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EventFile::open(Path::new("/not/an/event/file.rawb")),
            Err(DecoderError::BadFilePath(_))
        ));
    }
}
