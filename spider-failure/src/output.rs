//! Append-only numeric record streams.
//!
//! Every record is a row of numbers written as one tab-separated line. The
//! stream also keeps its records in memory so a run can be inspected without
//! reading the file back.

use std::{
    cell::RefCell,
    fmt::Write as _,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

struct StreamInner {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    records: Vec<Vec<f64>>,
}

/// Shared handle to an output stream. Clones append to the same stream.
#[derive(Clone)]
pub struct OutputStream {
    inner: Rc<RefCell<StreamInner>>,
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("OutputStream")
            .field("path", &inner.path)
            .field("records", &inner.records.len())
            .finish()
    }
}

impl OutputStream {
    /// A stream that only keeps records in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(None, None)
    }

    /// Creates (or truncates) `path` once and appends every record to it.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self::from_parts(Some(path), Some(BufWriter::new(file))))
    }

    /// File-backed when `path` is set, in memory otherwise.
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => Self::create(path),
            None => Ok(Self::in_memory()),
        }
    }

    fn from_parts(path: Option<PathBuf>, writer: Option<BufWriter<File>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StreamInner {
                path,
                writer,
                records: Vec::new(),
            })),
        }
    }

    /// Appends one record.
    pub fn append(&self, fields: &[f64]) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(writer) = inner.writer.as_mut() {
            let mut line = String::new();
            for (i, value) in fields.iter().enumerate() {
                if i > 0 {
                    line.push('\t');
                }
                // Writing into a String cannot fail
                let _ = write!(line, "{value}");
            }
            line.push('\n');
            writer.write_all(line.as_bytes())?;
        }
        inner.records.push(fields.to_vec());
        Ok(())
    }

    /// Flushes buffered lines to the file, if any.
    pub fn flush(&self) -> io::Result<()> {
        match self.inner.borrow_mut().writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Every record appended so far.
    pub fn records(&self) -> Vec<Vec<f64>> {
        self.inner.borrow().records.clone()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    /// Whether nothing was appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.borrow().path.clone()
    }
}
