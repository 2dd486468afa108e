use super::{Record, RecordValue};

/// Writes a record to an output destination with [`Recorder::write`].
pub trait Recorder {
    /// Write a record to the [`Recorder`].
    fn write(&mut self, record: Record);

    /// Writes a single named scalar at the given step.
    ///
    /// The default implementation writes a record holding `name` and `"step"`.
    fn record(&mut self, name: &str, value: f32, step: usize) {
        self.write(Record::from_slice(&[
            (name, RecordValue::Scalar(value)),
            ("step", RecordValue::Scalar(step as f32)),
        ]));
    }
}

/// Stores records, then writes values aggregated from them.
pub trait AggregateRecorder: Recorder {
    /// Store the record.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records and clears them.
    fn flush(&mut self, step: i64);
}
