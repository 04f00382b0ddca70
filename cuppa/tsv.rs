//! Tab-delimited file access with transparent gzip support.

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl OutputError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Destination of a tsv writer; gzip streams must be finished explicitly.
pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputSink {
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut writer) => writer.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Opens a tab-delimited writer at `path`, gzip-compressed when it ends in `.gz`.
pub fn create_tsv_writer(path: &Path) -> Result<csv::Writer<OutputSink>, OutputError> {
    let file = File::create(path).map_err(|e| OutputError::io(path, e))?;
    let buffered = BufWriter::new(file);
    let sink = if is_gzip_path(path) {
        OutputSink::Gzip(GzEncoder::new(buffered, Compression::default()))
    } else {
        OutputSink::Plain(buffered)
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(sink))
}

/// Flushes every pending record and finalizes the gzip trailer, if any.
pub fn finish_tsv_writer(writer: csv::Writer<OutputSink>, path: &Path) -> Result<(), OutputError> {
    let sink = writer
        .into_inner()
        .map_err(|e| OutputError::io(path, e.into_error()))?;
    sink.finish().map_err(|e| OutputError::io(path, e))
}

/// Opens `path` for reading, decompressing `.gz` files on the fly.
pub fn open_text_reader(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    if is_gzip_path(path) {
        Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// The full, decompressed contents of `path`.
pub fn read_decompressed(path: &Path) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    open_text_reader(path)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}
