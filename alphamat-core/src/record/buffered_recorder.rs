use super::{AggregateRecorder, Record, RecordValue, Recorder};

/// Keeps records in memory.
///
/// Written records are kept as they are. On [`AggregateRecorder::flush`],
/// scalars of the stored records are averaged per key, other values keep the
/// latest one, and the result is written with a `"step"` entry.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: Vec<Record>,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the written values of a scalar key, in order of writing.
    pub fn scalars(&self, key: &str) -> Vec<f32> {
        self.buf
            .iter()
            .filter_map(|r| r.get_scalar(key).ok())
            .collect()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.push(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let mut record = Record::average(self.storage.drain(..));
        record.insert("step", RecordValue::Scalar(step as f32));
        self.write(record);
    }
}
