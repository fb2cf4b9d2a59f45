use fxhash::FxHashMap;
use hdf5::types::VarLenUnicode;
use hdf5::{Extent, File, Group, Location, SimpleExtents};
use ndarray::{s, ArrayView2};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::channel_buffer::Snapshot;
use super::column::{ColumnSpec, ColumnView, Element};
use super::config::Config;
use super::constants::{FORMAT_VERSION, RAW_TABLE_NAME};
use super::error::HDF5WriterError;

/// The table path for a channel, e.g. `ch007/raw`
pub fn table_path(channel_id: u32) -> String {
    format!("ch{channel_id:03}/{RAW_TABLE_NAME}")
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Appends channel buffer snapshots to per-channel tables. Every column of a table is a
/// chunked, resizable dataset which grows by the number of rows in each snapshot.
///
/// All writing happens in a hidden staging file beside the output. The output only appears
/// (or is replaced) when the writer is closed. A writer that is dropped without being
/// closed deletes its staging file, so a failed run never leaves a partial output behind.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: Option<File>,
    output_path: PathBuf,
    staging_path: PathBuf,
    rows_written: FxHashMap<u32, u64>,
    n_flushes: u64,
}
// Structure
// / - version, experiment, datatype, timestamp, created
// |---- ch###
// |    |---- raw
// |    |    |---- timestamp(dset) - units
// |    |    |---- ...
// |    |    |---- waveform
// |    |    |    |---- t0(dset)
// |    |    |    |---- dt(dset)
// |    |    |    |---- values(dset)

impl HDFWriter {
    /// Create the writer for an output path.
    ///
    /// If the output already exists it is copied into the staging file, so new rows are
    /// appended to any tables it already holds.
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Err(HDF5WriterError::BadFilePath(path.to_path_buf())),
        };
        let parent = path.parent().unwrap_or(Path::new(""));
        let staging_path = parent.join(format!(".{file_name}.part"));

        let file_handle = if path.exists() {
            spdlog::info!(
                "Output {} already exists, new rows will be appended",
                path.display()
            );
            let opened = std::fs::copy(path, &staging_path)
                .map_err(HDF5WriterError::from)
                .and_then(|_| Ok(File::append(&staging_path)?));
            match opened {
                Ok(file) => file,
                Err(e) => {
                    remove_staging_file(&staging_path);
                    return Err(e);
                }
            }
        } else {
            File::create(&staging_path)?
        };

        // From here on Drop cleans up the staging file
        let writer = Self {
            file_handle: Some(file_handle),
            output_path: path.to_path_buf(),
            staging_path,
            rows_written: FxHashMap::default(),
            n_flushes: 0,
        };
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        write_string_attr(writer.file()?, "version", &version)?;
        Ok(writer)
    }

    /// Write meta information about the run to the root of the file
    pub fn write_run_info(&self, config: &Config) -> Result<(), HDF5WriterError> {
        let file = self.file()?;
        write_string_attr(file, "experiment", &config.experiment)?;
        write_string_attr(file, "datatype", &config.datatype)?;
        write_string_attr(file, "timestamp", &config.timestamp)?;
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        match file.attr("created") {
            Ok(attr) => attr.write_scalar(&created)?,
            Err(_) => file.new_attr::<i64>().create("created")?.write_scalar(&created)?,
        }
        Ok(())
    }

    /// Append the rows of a snapshot to the table of its channel
    pub fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), HDF5WriterError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let file = self.file()?;
        let table = require_groups(file, &table_path(snapshot.channel_id))?;
        // Chunk on the buffer size so a short first flush does not fix tiny chunks
        let chunk_rows = snapshot.capacity.max(snapshot.rows);
        for (spec, view) in snapshot.columns() {
            match view {
                ColumnView::Bool(data) => append_column(&table, spec, data.view(), chunk_rows)?,
                ColumnView::U16(data) => append_column(&table, spec, data.view(), chunk_rows)?,
                ColumnView::U32(data) => append_column(&table, spec, data.view(), chunk_rows)?,
                ColumnView::I32(data) => append_column(&table, spec, data.view(), chunk_rows)?,
                ColumnView::I64(data) => append_column(&table, spec, data.view(), chunk_rows)?,
                ColumnView::F64(data) => append_column(&table, spec, data.view(), chunk_rows)?,
            }
        }

        *self.rows_written.entry(snapshot.channel_id).or_insert(0) += snapshot.rows as u64;
        self.n_flushes += 1;
        spdlog::debug!(
            "Flushed {} rows to {}",
            snapshot.rows,
            table_path(snapshot.channel_id)
        );
        Ok(())
    }

    /// Rows written through this writer for a channel
    pub fn get_rows_written(&self, channel_id: u32) -> u64 {
        self.rows_written.get(&channel_id).copied().unwrap_or(0)
    }

    /// Close the file and move it into place, consume the writer
    pub fn close(mut self) -> Result<(), HDF5WriterError> {
        let size = match self.commit() {
            Ok(size) => size,
            Err(e) => {
                remove_staging_file(&self.staging_path);
                return Err(e);
            }
        };
        let total_rows: u64 = self.rows_written.values().sum();
        spdlog::info!(
            "{} rows written to {} tables in {} flushes. Output file {} is {}.",
            total_rows,
            self.rows_written.len(),
            self.n_flushes,
            self.output_path.display(),
            human_bytes::human_bytes(size as f64)
        );
        Ok(())
    }

    /// Close the handle and rename the staging file over the output, returns the output size
    fn commit(&mut self) -> Result<u64, HDF5WriterError> {
        if let Some(file) = self.file_handle.take() {
            file.flush()?;
            file.close()?;
        }
        std::fs::rename(&self.staging_path, &self.output_path)?;
        Ok(std::fs::metadata(&self.output_path)?.len())
    }

    fn file(&self) -> Result<&File, HDF5WriterError> {
        match &self.file_handle {
            Some(file) => Ok(file),
            None => Err(HDF5WriterError::BadFilePath(self.staging_path.clone())),
        }
    }
}

impl Drop for HDFWriter {
    fn drop(&mut self) {
        // Only an unclosed writer still holds its handle
        if let Some(file) = self.file_handle.take() {
            drop(file);
            spdlog::warn!(
                "Writer for {} was not closed; discarding staged output",
                self.output_path.display()
            );
            remove_staging_file(&self.staging_path);
        }
    }
}

fn remove_staging_file(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        spdlog::error!("Could not remove staging file {}: {e}", path.display());
    }
}

/// Write (or overwrite) a string attribute
fn write_string_attr(
    location: &Location,
    name: &str,
    value: &str,
) -> Result<(), HDF5WriterError> {
    let value = VarLenUnicode::from_str(value)?;
    match location.attr(name) {
        Ok(attr) => attr.write_scalar(&value)?,
        Err(_) => location
            .new_attr::<VarLenUnicode>()
            .create(name)?
            .write_scalar(&value)?,
    }
    Ok(())
}

/// Walk a `/` separated path from `parent`, creating any missing groups
fn require_groups(parent: &Group, path: &str) -> Result<Group, HDF5WriterError> {
    let mut group = parent.clone();
    for name in path.split('/') {
        group = match group.group(name) {
            Ok(g) => g,
            Err(_) => group.create_group(name)?,
        };
    }
    Ok(group)
}

/// Append the rows of one column to its dataset, making the dataset on first use
fn append_column<T: Element>(
    table: &Group,
    spec: &ColumnSpec,
    data: ArrayView2<T>,
    chunk_rows: usize,
) -> Result<(), HDF5WriterError> {
    let (parent, leaf) = match spec.name.rsplit_once('/') {
        Some((groups, leaf)) => (require_groups(table, groups)?, leaf),
        None => (table.clone(), spec.name.as_str()),
    };
    let rows = data.nrows();
    let width = spec.width();

    let dataset = match parent.dataset(leaf) {
        Ok(ds) => ds,
        Err(_) => {
            let (extents, chunk) = if spec.is_vector() {
                (
                    vec![Extent::resizable(0), Extent::fixed(width)],
                    vec![chunk_rows, width],
                )
            } else {
                (vec![Extent::resizable(0)], vec![chunk_rows])
            };
            let ds = parent
                .new_dataset::<T>()
                .chunk(chunk)
                .shape(SimpleExtents::from_vec(extents))
                .create(leaf)?;
            if let Some(units) = &spec.units {
                write_string_attr(&ds, "units", units)?;
            }
            ds
        }
    };

    let shape = dataset.shape();
    let compatible = if spec.is_vector() {
        shape.len() == 2 && shape[1] == width
    } else {
        shape.len() == 1
    };
    if !compatible {
        return Err(HDF5WriterError::ShapeConflict(
            spec.name.clone(),
            shape,
            width,
        ));
    }

    let start = shape[0];
    let end = start + rows;
    if spec.is_vector() {
        dataset.resize(vec![end, width])?;
        dataset.write_slice(data, s![start..end, ..])?;
    } else {
        dataset.resize(vec![end])?;
        dataset.write_slice(data.column(0), s![start..end])?;
    }
    Ok(())
}
