//! # raw_builder
//!
//! raw_builder builds the raw tier of a detector data-processing pipeline. It takes the
//! decoded events of a DAQ run, sorts the fields of every channel into fixed size row
//! buffers, and writes the buffers out as per-channel tables in an HDF5 file.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### HDF5
//!
//! Before building and running raw_builder, HDF5 must be installed. Typically this will
//! be installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If a custom install is needed, write the
//! following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./raw_builder_cli` from the top
//! level repository.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! experiment: ''
//! datatype: cal
//! timestamp: ''
//! channel_map_path: null
//! output_path: None
//! buffer_size: 1024
//! waveform_length: 1024
//! windowed_waveforms: false
//! layout: null
//! n_threads: 1
//! ```
//!
//! - `channel_map_path`: path to the channel map CSV. Required.
//! - `output_path`: directory the `.h5` files are written to. Each input file `name.ext`
//! produces `name.h5`.
//! - `buffer_size`: number of rows each channel buffers before it is flushed to disk.
//! - `waveform_length`, `windowed_waveforms`: shape of the default raw layout.
//! - `layout`: optional explicit list of columns which replaces the default raw layout, e.g.
//!
//! ```yml
//! layout:
//!   - name: timestamp
//!     dtype: f64
//!     units: s
//!   - name: waveform/values
//!     dtype: u16
//!     length: 2000
//! ```
//!
//! ### Channel Map Format
//!
//! The channel map is a CSV file. The columns are as follows:
//!
//! ```csv
//! daq_id,channel_id,capacity
//! ```
//!
//! `daq_id` is the identifier the digitizer stamps on its data, `channel_id` names the
//! output table, and `capacity` (optional) overrides `buffer_size` for that channel.
//!
//! ## Output
//!
//! The data format used in the HDF5 data is as follows:
//!
//! ```text
//! name.h5 - version, experiment, datatype, timestamp, created
//! |---- ch###
//! |    |---- raw
//! |    |    |---- timestamp(dset) - units
//! |    |    |---- daq_energy_sum(dset)
//! |    |    |---- ...
//! |    |    |---- waveform
//! |    |    |    |---- t0(dset) - units
//! |    |    |    |---- dt(dset) - units
//! |    |    |    |---- values(dset)
//! ```
//!
//! In the default layout the waveform `t0` and `dt` columns are `f64` in `ns`, the units the
//! digitizer reports the trace offset and sampling period in. Integer seconds cannot hold a
//! sampling period, so they are not stored that way.
//!
//! Every dataset has one entry per event of the channel. Re-running into an existing file
//! appends to its tables.
pub mod channel_buffer;
pub mod channel_buffers;
pub mod channel_map;
pub mod column;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod event_file;
pub mod hdf_writer;
pub mod process;
pub mod worker_status;
