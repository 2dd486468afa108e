//! Types and traits for recording training metrics.
//!
//! * [`Record`] - A container of key-value pairs
//! * [`RecordValue`] - The types of values a [`Record`] holds
//! * [`Recorder`] - Writes records to an output destination
//! * [`AggregateRecorder`] - Stores records and writes values aggregated over them
//! * [`BufferedRecorder`] - Keeps aggregated records in memory
//! * [`NullRecorder`] - Discards all records
//!
//! ```rust
//! use alphamat_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("episode_return", -4.5);
//! record.insert("error_norm", RecordValue::Scalar(0.25));
//! assert_eq!(record.get_scalar("error_norm").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
