use fxhash::FxHashSet;
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::error::ColumnSpecError;

/// The element types a column can hold. These map one-to-one onto native HDF5 types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    U16,
    U32,
    I32,
    I64,
    F64,
}

impl DataType {
    /// Code used for this type in the binary event stream
    pub fn code(&self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::U16 => 1,
            Self::U32 => 2,
            Self::I32 => 3,
            Self::I64 => 4,
            Self::F64 => 5,
        }
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::U16 => 2,
            Self::U32 | Self::I32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Bool),
            1 => Some(Self::U16),
            2 => Some(Self::U32),
            3 => Some(Self::I32),
            4 => Some(Self::I64),
            5 => Some(Self::F64),
            _ => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// Description of a single column of a channel table.
///
/// A column with no `length` is a scalar column (one value per row). A column with
/// `length: Some(n)` is a vector column holding exactly `n` values per row (waveform samples).
/// Names may contain `/` to place the column inside a nested table, e.g. `waveform/values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl ColumnSpec {
    pub fn scalar(name: &str, dtype: DataType) -> Self {
        Self {
            name: String::from(name),
            dtype,
            length: None,
            units: None,
        }
    }

    pub fn vector(name: &str, dtype: DataType, length: usize) -> Self {
        Self {
            name: String::from(name),
            dtype,
            length: Some(length),
            units: None,
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(String::from(units));
        self
    }

    /// Number of elements stored per row
    pub fn width(&self) -> usize {
        self.length.unwrap_or(1)
    }

    pub fn is_vector(&self) -> bool {
        self.length.is_some()
    }

    fn validate(&self) -> Result<(), ColumnSpecError> {
        if self.name.is_empty() {
            return Err(ColumnSpecError::EmptyName);
        }
        if self.name.split('/').any(|segment| segment.is_empty()) {
            return Err(ColumnSpecError::BadPath(self.name.clone()));
        }
        if self.length == Some(0) {
            return Err(ColumnSpecError::ZeroLength(self.name.clone()));
        }
        Ok(())
    }
}

/// The validated, ordered set of columns shared by every channel table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    columns: Vec<ColumnSpec>,
}

impl TableLayout {
    /// Validate a list of column specs. Names must be non-empty and unique, and vector
    /// columns must have at least one element. A column cannot also be the parent table of
    /// another column (`waveform` next to `waveform/t0`).
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, ColumnSpecError> {
        let mut seen = FxHashSet::default();
        for spec in columns.iter() {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ColumnSpecError::DuplicateName(spec.name.clone()));
            }
        }
        for spec in columns.iter() {
            for (idx, _) in spec.name.match_indices('/') {
                let parent = &spec.name[..idx];
                if seen.contains(parent) {
                    return Err(ColumnSpecError::PathConflict(
                        String::from(parent),
                        spec.name.clone(),
                    ));
                }
            }
        }
        Ok(Self { columns })
    }

    /// The standard raw tier layout of a digitizer channel.
    ///
    /// If `windowed` is set the digitizer records a presummed and a windowed trace per
    /// event, so two waveform tables are made instead of one.
    pub fn default_raw(waveform_length: usize, windowed: bool) -> Result<Self, ColumnSpecError> {
        let mut columns = vec![
            ColumnSpec::scalar("timestamp", DataType::F64).with_units("s"),
            ColumnSpec::scalar("daq_energy_sum", DataType::F64),
            ColumnSpec::scalar("time_of_first_hit_sec", DataType::F64),
            ColumnSpec::scalar("event_type", DataType::I32),
            ColumnSpec::scalar("daq_crate", DataType::U32),
            ColumnSpec::scalar("daq_card", DataType::U32),
            ColumnSpec::scalar("daq_channel", DataType::U32),
            ColumnSpec::scalar("clock_freq_hz", DataType::F64).with_units("Hz"),
            ColumnSpec::scalar("bit_resolution", DataType::U32),
            ColumnSpec::scalar("nr_of_channels", DataType::U32),
            ColumnSpec::scalar("event_number", DataType::I32),
            ColumnSpec::scalar("pre_trigger", DataType::U32),
            ColumnSpec::scalar("trigger_number", DataType::U32),
            ColumnSpec::scalar("is_muon_vetoed", DataType::Bool),
            ColumnSpec::scalar("muon_veto_sample", DataType::U32),
            ColumnSpec::scalar("waveform_tag", DataType::I32),
            ColumnSpec::scalar("is_inverted", DataType::Bool),
        ];
        let tables: &[&str] = if windowed {
            &["waveform_presummed", "waveform_windowed"]
        } else {
            &["waveform"]
        };
        for table in tables {
            for stamp in ["t0", "dt"] {
                columns.push(
                    ColumnSpec::scalar(&format!("{table}/{stamp}"), DataType::F64).with_units("ns"),
                );
            }
            columns.push(ColumnSpec::vector(
                &format!("{table}/values"),
                DataType::U16,
                waveform_length,
            ));
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A single decoded value destined for one column of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    U16(u16),
    U32(u32),
    I32(i32),
    I64(i64),
    F64(f64),
    BoolVec(Vec<bool>),
    U16Vec(Vec<u16>),
    U32Vec(Vec<u32>),
    I32Vec(Vec<i32>),
    I64Vec(Vec<i64>),
    F64Vec(Vec<f64>),
}

impl FieldValue {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Bool(_) | Self::BoolVec(_) => DataType::Bool,
            Self::U16(_) | Self::U16Vec(_) => DataType::U16,
            Self::U32(_) | Self::U32Vec(_) => DataType::U32,
            Self::I32(_) | Self::I32Vec(_) => DataType::I32,
            Self::I64(_) | Self::I64Vec(_) => DataType::I64,
            Self::F64(_) | Self::F64Vec(_) => DataType::F64,
        }
    }

    /// None for scalars, the element count for vectors
    pub fn length(&self) -> Option<usize> {
        match self {
            Self::BoolVec(v) => Some(v.len()),
            Self::U16Vec(v) => Some(v.len()),
            Self::U32Vec(v) => Some(v.len()),
            Self::I32Vec(v) => Some(v.len()),
            Self::I64Vec(v) => Some(v.len()),
            Self::F64Vec(v) => Some(v.len()),
            _ => None,
        }
    }
}

/// Pre-allocated storage for one column. Every column is held as a `(rows, width)` matrix;
/// scalar columns simply have a width of one.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Bool(Array2<bool>),
    U16(Array2<u16>),
    U32(Array2<u32>),
    I32(Array2<i32>),
    I64(Array2<i64>),
    F64(Array2<f64>),
}

/// A borrowed, read-only slice of a column's valid rows.
#[derive(Debug, Clone)]
pub enum ColumnView<'a> {
    Bool(ArrayView2<'a, bool>),
    U16(ArrayView2<'a, u16>),
    U32(ArrayView2<'a, u32>),
    I32(ArrayView2<'a, i32>),
    I64(ArrayView2<'a, i64>),
    F64(ArrayView2<'a, f64>),
}

/// Rust types which can be stored in a column
pub trait Element: Copy + Default + hdf5::H5Type + 'static {
    const DTYPE: DataType;

    /// Extract the typed view if the column holds this element type
    fn view<'a>(column: &ColumnView<'a>) -> Option<ArrayView2<'a, Self>>;
}

macro_rules! impl_element {
    ($($ty:ty => $scalar:ident, $vector:ident);* $(;)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = DataType::$scalar;

                fn view<'a>(column: &ColumnView<'a>) -> Option<ArrayView2<'a, Self>> {
                    match column {
                        ColumnView::$scalar(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$scalar(value)
                }
            }

            impl From<Vec<$ty>> for FieldValue {
                fn from(value: Vec<$ty>) -> Self {
                    FieldValue::$vector(value)
                }
            }
        )*

        impl ColumnData {
            /// Allocate a zeroed column for `rows` rows of the given spec
            pub fn new(spec: &ColumnSpec, rows: usize) -> Self {
                let shape = (rows, spec.width());
                match spec.dtype {
                    $(DataType::$scalar => Self::$scalar(Array2::default(shape)),)*
                }
            }

            /// Write a value into a row. The caller must already have checked the type and
            /// shape against the column spec; returns false if the type does not match.
            pub fn write(&mut self, row: usize, value: FieldValue) -> bool {
                match (self, value) {
                    $(
                        (Self::$scalar(data), FieldValue::$scalar(v)) => data[[row, 0]] = v,
                        (Self::$scalar(data), FieldValue::$vector(v)) => {
                            data.row_mut(row).assign(&ArrayView1::from(v.as_slice()))
                        }
                    )*
                    _ => return false,
                }
                true
            }

            /// Reset a single row to the default (zero) value
            pub fn zero_row(&mut self, row: usize) {
                match self {
                    $(Self::$scalar(data) => data.row_mut(row).fill(<$ty>::default()),)*
                }
            }

            /// View the first `rows` rows
            pub fn view(&self, rows: usize) -> ColumnView<'_> {
                match self {
                    $(Self::$scalar(data) => ColumnView::$scalar(data.slice(s![..rows, ..])),)*
                }
            }

            pub fn rows(&self) -> usize {
                match self {
                    $(Self::$scalar(data) => data.nrows(),)*
                }
            }
        }

        impl<'a> ColumnView<'a> {
            pub fn dtype(&self) -> DataType {
                match self {
                    $(Self::$scalar(_) => DataType::$scalar,)*
                }
            }

            pub fn rows(&self) -> usize {
                match self {
                    $(Self::$scalar(v) => v.nrows(),)*
                }
            }

            pub fn width(&self) -> usize {
                match self {
                    $(Self::$scalar(v) => v.ncols(),)*
                }
            }
        }
    };
}

impl_element! {
    bool => Bool, BoolVec;
    u16 => U16, U16Vec;
    u32 => U32, U32Vec;
    i32 => I32, I32Vec;
    i64 => I64, I64Vec;
    f64 => F64, F64Vec;
}

impl<'a> ColumnView<'a> {
    /// Get the typed values of the column, or None if `T` is not the column's type
    pub fn values<T: Element>(&self) -> Option<ArrayView2<'a, T>> {
        T::view(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_rejects_duplicates() {
        let result = TableLayout::new(vec![
            ColumnSpec::scalar("x", DataType::F64),
            ColumnSpec::scalar("x", DataType::U32),
        ]);
        assert_eq!(result, Err(ColumnSpecError::DuplicateName(String::from("x"))));
    }

    #[test]
    fn test_layout_rejects_malformed_specs() {
        assert_eq!(
            TableLayout::new(vec![ColumnSpec::scalar("", DataType::F64)]),
            Err(ColumnSpecError::EmptyName)
        );
        assert_eq!(
            TableLayout::new(vec![ColumnSpec::vector("w", DataType::U16, 0)]),
            Err(ColumnSpecError::ZeroLength(String::from("w")))
        );
        assert_eq!(
            TableLayout::new(vec![ColumnSpec::scalar("waveform//t0", DataType::F64)]),
            Err(ColumnSpecError::BadPath(String::from("waveform//t0")))
        );
    }

    #[test]
    fn test_layout_rejects_column_used_as_table() {
        let result = TableLayout::new(vec![
            ColumnSpec::scalar("waveform", DataType::F64),
            ColumnSpec::scalar("waveform/t0", DataType::F64),
        ]);
        assert_eq!(
            result,
            Err(ColumnSpecError::PathConflict(
                String::from("waveform"),
                String::from("waveform/t0")
            ))
        );
        // Order does not matter, and deeper nesting is checked too
        let result = TableLayout::new(vec![
            ColumnSpec::vector("a/b/c", DataType::U16, 4),
            ColumnSpec::scalar("a/b", DataType::U32),
        ]);
        assert!(matches!(result, Err(ColumnSpecError::PathConflict(p, _)) if p == "a/b"));
        // Shared prefixes which are not whole segments are fine
        assert!(TableLayout::new(vec![
            ColumnSpec::scalar("wave", DataType::F64),
            ColumnSpec::scalar("waveform/t0", DataType::F64),
        ])
        .is_ok());
    }

    #[test]
    fn test_default_raw_layout() {
        let single = TableLayout::default_raw(8, false).unwrap();
        assert_eq!(single.len(), 20);
        let values = single
            .columns()
            .iter()
            .find(|c| c.name == "waveform/values")
            .unwrap();
        assert_eq!(values.length, Some(8));
        assert_eq!(values.dtype, DataType::U16);
        let t0 = single
            .columns()
            .iter()
            .find(|c| c.name == "waveform/t0")
            .unwrap();
        assert_eq!(t0.dtype, DataType::F64);
        assert_eq!(t0.units.as_deref(), Some("ns"));

        let windowed = TableLayout::default_raw(8, true).unwrap();
        assert_eq!(windowed.len(), 23);
        assert!(windowed
            .columns()
            .iter()
            .any(|c| c.name == "waveform_windowed/values"));
        assert!(TableLayout::default_raw(0, false).is_err());
    }

    #[test]
    fn test_column_write_and_view() {
        let spec = ColumnSpec::vector("w", DataType::I32, 3);
        let mut column = ColumnData::new(&spec, 4);
        assert!(column.write(1, FieldValue::from(vec![1i32, 2, 3])));
        assert!(!column.write(2, FieldValue::from(1.0f64)));
        let view = column.view(2);
        assert_eq!(view.rows(), 2);
        assert_eq!(view.width(), 3);
        let values = view.values::<i32>().unwrap();
        assert_eq!(values.row(0).to_vec(), vec![0, 0, 0]);
        assert_eq!(values.row(1).to_vec(), vec![1, 2, 3]);
        assert!(view.values::<f64>().is_none());
    }

    #[test]
    fn test_dtype_codes() {
        for dtype in [
            DataType::Bool,
            DataType::U16,
            DataType::U32,
            DataType::I32,
            DataType::I64,
            DataType::F64,
        ] {
            assert_eq!(DataType::from_code(dtype.code()), Some(dtype));
        }
        assert_eq!(DataType::from_code(42), None);
    }
}
