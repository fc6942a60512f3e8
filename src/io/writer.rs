//! Temp/output file writer, giving `is_out_zip` a real effect.
//!
//! Mirrors the teacher's `create_buffered_reader` (gzip-aware reading) on
//! the write side, via `flate2`.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// A writer that is either plain or gzip-compressed, selected by `is_out_zip`.
pub enum Writer {
    Plain(BufWriter<File>),
    Gz(Box<GzEncoder<BufWriter<File>>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(w) => w.write(buf),
            Writer::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(w) => w.flush(),
            Writer::Gz(w) => w.flush(),
        }
    }
}

impl Writer {
    /// Flushes and finalizes the underlying file (writing the gzip trailer
    /// when compressed), consuming the writer.
    pub fn close(self, path: &Path) -> CoreResult<()> {
        let result = match self {
            Writer::Plain(mut w) => w.flush(),
            Writer::Gz(w) => w.finish().map(|_| ()),
        };
        result.map_err(|e| CoreError::TempWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Opens a writer at `path`, appending `.gz` and compressing when `gzip` is set.
pub fn create_writer(path: &Path, gzip: bool) -> CoreResult<(Writer, PathBuf)> {
    let actual_path = if gzip {
        let mut p = path.as_os_str().to_owned();
        p.push(".gz");
        PathBuf::from(p)
    } else {
        path.to_path_buf()
    };

    let file = File::create(&actual_path).map_err(|e| CoreError::TempWriteError {
        path: actual_path.display().to_string(),
        source: e,
    })?;

    let writer = if gzip {
        Writer::Gz(Box::new(GzEncoder::new(BufWriter::new(file), Compression::default())))
    } else {
        Writer::Plain(BufWriter::new(file))
    };

    Ok((writer, actual_path))
}

/// Removes a temp file, ignoring "not found".
pub fn remove_temp(path: &Path) -> CoreResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::TempWriteError {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
