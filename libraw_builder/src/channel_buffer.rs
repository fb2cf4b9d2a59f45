use bit_set::BitSet;
use fxhash::FxHashMap;

use super::column::{ColumnData, ColumnSpec, ColumnView, FieldValue, TableLayout};
use super::error::ChannelBufferError;

/// ChannelBuffer is a fixed capacity, append-only row store for a single channel.
///
/// Every column is allocated for `capacity` rows up front and is never resized. The decode
/// loop writes fields into the row under the cursor with [`ChannelBuffer::set_field`] and
/// finalizes it with [`ChannelBuffer::commit_row`]. When [`ChannelBuffer::is_full`] is true
/// the caller must write the [`ChannelBuffer::snapshot`] to storage and then
/// [`ChannelBuffer::clear`] the buffer before committing any more rows. At the end of the
/// input the caller flushes whatever partial fill is left.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    channel_id: u32,
    capacity: usize,
    layout: TableLayout,
    columns: Vec<ColumnData>,
    column_index: FxHashMap<String, usize>,
    cursor: usize,
    written: BitSet, // Columns written since the last commit
}

impl ChannelBuffer {
    /// Create a new ChannelBuffer from a list of column specs.
    ///
    /// Fails with a ConfigurationError if capacity is zero or the specs do not form a valid
    /// table layout.
    pub fn new(
        channel_id: u32,
        capacity: usize,
        specs: Vec<ColumnSpec>,
    ) -> Result<Self, ChannelBufferError> {
        let layout = TableLayout::new(specs)?;
        Self::with_layout(channel_id, capacity, &layout)
    }

    /// Create a new ChannelBuffer from an already validated layout
    pub fn with_layout(
        channel_id: u32,
        capacity: usize,
        layout: &TableLayout,
    ) -> Result<Self, ChannelBufferError> {
        if capacity == 0 {
            return Err(ChannelBufferError::ConfigurationError(format!(
                "channel {channel_id} was given a capacity of zero rows"
            )));
        }
        if layout.is_empty() {
            return Err(ChannelBufferError::ConfigurationError(format!(
                "channel {channel_id} was given a layout with no columns"
            )));
        }

        let columns = layout
            .columns()
            .iter()
            .map(|spec| ColumnData::new(spec, capacity))
            .collect();
        let column_index = layout
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.name.clone(), idx))
            .collect();

        Ok(Self {
            channel_id,
            capacity,
            layout: layout.clone(),
            columns,
            column_index,
            cursor: 0,
            written: BitSet::with_capacity(layout.len()),
        })
    }

    /// Write a value into the named column at the current row.
    ///
    /// Nothing is written if the value does not fit the column; the buffer is left exactly
    /// as it was.
    pub fn set_field(
        &mut self,
        field_name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), ChannelBufferError> {
        let value = value.into();
        let idx = match self.column_index.get(field_name) {
            Some(idx) => *idx,
            None => {
                return Err(ChannelBufferError::UnknownField {
                    channel: self.channel_id,
                    field: String::from(field_name),
                })
            }
        };
        if self.is_full() {
            return Err(ChannelBufferError::BufferOverflow {
                channel: self.channel_id,
                capacity: self.capacity,
            });
        }

        let spec = &self.layout.columns()[idx];
        if value.dtype() != spec.dtype {
            return Err(ChannelBufferError::TypeMismatch {
                channel: self.channel_id,
                field: spec.name.clone(),
                expected: spec.dtype,
                given: value.dtype(),
            });
        }
        if value.length() != spec.length {
            return Err(ChannelBufferError::ShapeMismatch {
                channel: self.channel_id,
                field: spec.name.clone(),
                expected: spec.length,
                given: value.length(),
            });
        }

        let given = value.dtype();
        if !self.columns[idx].write(self.cursor, value) {
            return Err(ChannelBufferError::TypeMismatch {
                channel: self.channel_id,
                field: spec.name.clone(),
                expected: spec.dtype,
                given,
            });
        }
        self.written.insert(idx);
        Ok(())
    }

    /// Finalize the current row and advance the cursor.
    ///
    /// Columns that were not written since the last commit are zeroed for this row, so
    /// values left over from an earlier fill cycle can never become visible.
    pub fn commit_row(&mut self) -> Result<(), ChannelBufferError> {
        if self.is_full() {
            return Err(ChannelBufferError::BufferOverflow {
                channel: self.channel_id,
                capacity: self.capacity,
            });
        }
        for (idx, column) in self.columns.iter_mut().enumerate() {
            if !self.written.contains(idx) {
                column.zero_row(self.cursor);
            }
        }
        self.written.clear();
        self.cursor += 1;
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.cursor == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Reset the cursor. Old rows are not zeroed, they are simply overwritten by the next
    /// fill cycle. Any uncommitted writes are discarded as well.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.written.clear();
    }

    /// Borrow the committed rows `[0, cursor)` of every column, in layout order
    pub fn snapshot(&self) -> Snapshot<'_> {
        let columns = self
            .layout
            .columns()
            .iter()
            .zip(self.columns.iter())
            .map(|(spec, data)| (spec, data.view(self.cursor)))
            .collect();
        Snapshot {
            channel_id: self.channel_id,
            rows: self.cursor,
            capacity: self.capacity,
            columns,
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of committed rows
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }
}

/// The committed contents of a ChannelBuffer, ready to be written to storage.
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    pub channel_id: u32,
    pub rows: usize,
    /// Capacity of the buffer the rows came from
    pub capacity: usize,
    columns: Vec<(&'a ColumnSpec, ColumnView<'a>)>,
}

impl<'a> Snapshot<'a> {
    pub fn column(&self, name: &str) -> Option<&ColumnView<'a>> {
        self.columns
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map(|(_, view)| view)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&'a ColumnSpec, &ColumnView<'a>)> {
        self.columns.iter().map(|(spec, view)| (*spec, view))
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}
