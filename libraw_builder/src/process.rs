use fxhash::FxHashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::channel_buffer::ChannelBuffer;
use super::channel_buffers::ChannelBuffers;
use super::channel_map::ChannelMap;
use super::config::Config;
use super::decoder::{ChannelRecord, DecodedEvent, EventSource};
use super::error::{HDF5WriterError, ProcessorError};
use super::event_file::EventFile;
use super::hdf_writer::HDFWriter;
use super::worker_status::{BarColor, WorkerStatus};

/// Write one record into its buffer as a complete row
fn fill_row(buffer: &mut ChannelBuffer, record: ChannelRecord) -> Result<(), ProcessorError> {
    for (name, value) in record.fields {
        buffer.set_field(&name, value)?;
    }
    buffer.commit_row()?;
    Ok(())
}

/// Flush a buffer to the writer and make it ready for the next fill cycle
fn flush_buffer(buffer: &mut ChannelBuffer, writer: &mut HDFWriter) -> Result<(), HDF5WriterError> {
    writer.write_snapshot(&buffer.snapshot())?;
    buffer.clear();
    Ok(())
}

/// Every channel of the map should show up in the first event. If not, the channel map
/// and the data do not belong together.
fn check_first_event(buffers: &ChannelBuffers, event: &DecodedEvent) -> Result<(), ProcessorError> {
    let missing: Vec<u32> = buffers
        .daq_ids()
        .into_iter()
        .filter(|id| !event.records.iter().any(|r| r.daq_id == *id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProcessorError::MissingChannels(missing))
    }
}

/// The decode loop.
///
/// Every record of every event becomes one committed row of its channel's buffer. A full
/// buffer is flushed right after the commit that filled it, so flushes only ever happen
/// between rows. Once the source is exhausted the partially filled buffers get a final
/// flush.
///
/// Returns the number of events processed.
pub fn build_tables<S: EventSource>(
    source: &mut S,
    buffers: &mut ChannelBuffers,
    writer: &mut HDFWriter,
    mut on_progress: impl FnMut(f32) -> Result<(), ProcessorError>,
) -> Result<u64, ProcessorError> {
    let flush_frac: f32 = 0.01;
    let mut last_progress: f32 = 0.0;
    let mut event_counter: u64 = 0;

    while let Some(event) = source.next_event()? {
        if event_counter == 0 {
            check_first_event(buffers, &event)?;
        }
        for record in event.records {
            let buffer = buffers.get_mut(record.daq_id)?;
            fill_row(buffer, record)?;
            if buffer.is_full() {
                flush_buffer(buffer, writer)?;
            }
        }
        event_counter += 1;

        let progress = source.progress();
        if progress - last_progress > flush_frac {
            last_progress = progress;
            on_progress(progress)?;
        }
    }

    buffers.for_each_mut(|buffer| {
        if buffer.is_empty() {
            Ok(())
        } else {
            flush_buffer(buffer, writer)
        }
    })?;
    Ok(event_counter)
}

/// Build the raw tier file for a single input file.
pub fn process_file(
    config: &Config,
    input_path: &Path,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let file_name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let output_path = config.get_output_file_name(input_path)?;
    let channel_map = ChannelMap::new(config.get_channel_map_path()?)?;
    let layout = config.get_table_layout()?;
    let mut buffers = ChannelBuffers::new(&channel_map, &layout, config.buffer_size)?;
    let mut source = EventFile::open(input_path)?;
    spdlog::info!(
        "Building {} channels from {} ({})",
        buffers.len(),
        input_path.display(),
        human_bytes::human_bytes(std::fs::metadata(input_path)?.len() as f64)
    );

    let mut writer = HDFWriter::new(&output_path)?;
    writer.write_run_info(config)?;

    tx.send(WorkerStatus::new(0.0, &file_name, *worker_id, BarColor::CYAN))?;
    let result = build_tables(&mut source, &mut buffers, &mut writer, |progress| {
        tx.send(WorkerStatus::new(
            progress,
            &file_name,
            *worker_id,
            BarColor::CYAN,
        ))?;
        Ok(())
    });

    match result {
        Ok(n_events) => {
            writer.close()?;
            spdlog::info!("Processed {n_events} events from {file_name}.");
            tx.send(WorkerStatus::new(1.0, &file_name, *worker_id, BarColor::GREEN))?;
            Ok(())
        }
        Err(e) => {
            // The writer is dropped uncommitted, so nothing of this file reaches the output
            spdlog::warn!(
                "Discarding {} unflushed rows and the staged output of {}",
                buffers.pending_rows(),
                file_name
            );
            drop(writer);
            tx.send(WorkerStatus::new(
                source.progress(),
                &file_name,
                *worker_id,
                BarColor::RED,
            ))?;
            Err(e)
        }
    }
}

/// Process a subset of input files. Stops at the first file that fails.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
) -> Result<(), ProcessorError> {
    for input in subset {
        spdlog::info!("Processing file {}...", input.display());
        process_file(&config, &input, &tx, &worker_id)?;
        spdlog::info!("Finished processing file {}.", input.display());
    }
    Ok(())
}

/// Divide the input files in to a set of subsets (per thread/worker)
///
/// Inputs which share a file stem build the same output file, so they are kept together in
/// one subset and append to it one after another. No two workers ever write the same file.
pub fn create_subsets(config: &Config, inputs: &[PathBuf]) -> Vec<Vec<PathBuf>> {
    let n_subsets = config.n_threads.max(1) as usize;
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); n_subsets];

    let mut groups: Vec<Vec<PathBuf>> = Vec::new();
    let mut group_of_output: FxHashMap<&OsStr, usize> = FxHashMap::default();
    for input in inputs.iter() {
        let key = input.file_stem().unwrap_or(input.as_os_str());
        let idx = *group_of_output.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(input.clone());
    }

    for (idx, group) in groups.into_iter().enumerate() {
        subsets[idx % n_subsets].extend(group)
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnSpec, DataType, TableLayout};
    use crate::decoder::EventQueue;
    use crate::error::{ChannelBufferError, ChannelBuffersError};

    fn layout() -> TableLayout {
        TableLayout::new(vec![
            ColumnSpec::scalar("x", DataType::F64),
            ColumnSpec::vector("w", DataType::U16, 2),
        ])
        .unwrap()
    }

    fn event(ids: &[u32], x: f64) -> DecodedEvent {
        DecodedEvent {
            records: ids
                .iter()
                .map(|id| {
                    ChannelRecord::new(*id)
                        .with_field("x", x)
                        .with_field("w", vec![*id as u16, 1])
                })
                .collect(),
        }
    }

    fn buffers(csv: &str) -> ChannelBuffers {
        let map = ChannelMap::from_csv(csv).unwrap();
        ChannelBuffers::new(&map, &layout(), 3).unwrap()
    }

    #[test]
    fn test_build_tables_flushes_full_and_partial() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.h5");
        let mut buffers = buffers("daq_id,channel_id,capacity\n1,10\n2,20,2\n");
        let mut writer = HDFWriter::new(&output).unwrap();
        let events: Vec<DecodedEvent> = (0..7).map(|i| event(&[1, 2], i as f64)).collect();
        let mut source = EventQueue::new(events);

        let n_events = build_tables(&mut source, &mut buffers, &mut writer, |_| Ok(())).unwrap();
        assert_eq!(n_events, 7);
        assert_eq!(buffers.pending_rows(), 0);
        assert_eq!(writer.get_rows_written(10), 7);
        assert_eq!(writer.get_rows_written(20), 7);
        writer.close().unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_missing_channel_in_first_event() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.h5");
        let mut buffers = buffers("daq_id,channel_id\n1,10\n2,20\n3,30\n");
        let mut writer = HDFWriter::new(&output).unwrap();
        let mut source = EventQueue::new(vec![event(&[1, 3], 0.0)]);
        let result = build_tables(&mut source, &mut buffers, &mut writer, |_| Ok(()));
        assert!(matches!(result, Err(ProcessorError::MissingChannels(ids)) if ids == vec![2]));
    }

    #[test]
    fn test_unknown_channel_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.h5");
        let mut buffers = buffers("daq_id,channel_id\n1,10\n");
        let mut writer = HDFWriter::new(&output).unwrap();
        let mut source = EventQueue::new(vec![event(&[1], 0.0), event(&[1, 9], 1.0)]);
        let result = build_tables(&mut source, &mut buffers, &mut writer, |_| Ok(()));
        assert!(matches!(
            result,
            Err(ProcessorError::BuffersError(
                ChannelBuffersError::UnknownChannel(9)
            ))
        ));
        drop(writer);
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.h5");
        let mut buffers = buffers("daq_id,channel_id\n1,10\n");
        let mut writer = HDFWriter::new(&output).unwrap();
        let bad = DecodedEvent {
            records: vec![ChannelRecord::new(1).with_field("w", vec![1u16, 2, 3])],
        };
        let mut source = EventQueue::new(vec![bad]);
        let result = build_tables(&mut source, &mut buffers, &mut writer, |_| Ok(()));
        assert!(matches!(
            result,
            Err(ProcessorError::BufferError(
                ChannelBufferError::ShapeMismatch { .. }
            ))
        ));
        assert_eq!(buffers.pending_rows(), 0);
    }

    #[test]
    fn test_create_subsets() {
        let mut config = Config::default();
        config.n_threads = 2;
        let inputs: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("f{i}"))).collect();
        let subsets = create_subsets(&config, &inputs);
        assert_eq!(subsets.len(), 2);
        assert_eq!(subsets[0].len(), 3);
        assert_eq!(subsets[1].len(), 2);
        assert_eq!(subsets[1][0], PathBuf::from("f1"));
    }

    #[test]
    fn test_create_subsets_keeps_shared_outputs_together() {
        let mut config = Config::default();
        config.n_threads = 2;
        let inputs: Vec<PathBuf> = ["a/run1.rawb", "b/run1.rawb", "a/run2.rawb", "c/run1.rawb"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let subsets = create_subsets(&config, &inputs);
        assert_eq!(
            subsets[0],
            vec![
                PathBuf::from("a/run1.rawb"),
                PathBuf::from("b/run1.rawb"),
                PathBuf::from("c/run1.rawb")
            ]
        );
        assert_eq!(subsets[1], vec![PathBuf::from("a/run2.rawb")]);
    }
}
