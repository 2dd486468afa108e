//! Writes training records of alphamat to TFRecord files read by TensorBoard.
use alphamat_core::record::{AggregateRecorder, Record, RecordValue, Recorder};
use log::warn;
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    ignore_unsupported_value: bool,
    storage: Vec<Record>,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "step".to_string(),
            ignore_unsupported_value: true,
            storage: vec![],
        }
    }

    /// Construct a [`TensorboardRecorder`] warning on values it can not write.
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new_with_check_unsupported_value<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            ignore_unsupported_value: false,
            ..Self::new(logdir)
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [`Record`] into a TFRecord.
    ///
    /// The step is taken from the `"step"` entry; a record without it is
    /// dropped. Only [`RecordValue::Scalar`] is written.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without {:?} is dropped", self.step_key);
                return;
            }
        };

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::DateTime(_) | RecordValue::String(_) => {} // discard value
                RecordValue::Array1(_) => {
                    if !self.ignore_unsupported_value {
                        warn!("Unsupported value: {:?}", (k, v));
                    }
                }
            }
        }
    }

    fn record(&mut self, name: &str, value: f32, step: usize) {
        self.writer.add_scalar(name, value, step);
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.push(record);
    }

    /// Writes scalars averaged over the stored records at `step`.
    fn flush(&mut self, step: i64) {
        if !self.storage.is_empty() {
            let mut record = Record::average(self.storage.drain(..));
            record.insert(self.step_key.clone(), RecordValue::Scalar(step as f32));
            self.write(record);
        }
        self.writer.flush();
    }
}
