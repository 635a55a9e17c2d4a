//! Line-by-line access to the text members of a CCLF zip archive.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::error::ImportError;

pub struct CclfArchive {
    name: String,
    archive: ZipArchive<BufReader<File>>,
}

impl CclfArchive {
    /// Open the archive at `path`. `name` is only used in logs and errors.
    pub fn open(path: &Path, name: &str) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|e| ImportError::archive(name, e))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| ImportError::archive(name, e))?;
        Ok(Self {
            name: name.to_string(),
            archive,
        })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Feed every non-blank line of every member to `f`, in archive order.
    ///
    /// Lines arrive without their terminator (`\n` or `\r\n`) but otherwise
    /// untouched, so fixed-width offsets stay valid. Stops at the first
    /// error `f` returns. Returns the number of lines visited.
    pub fn for_each_record<F>(&mut self, f: F) -> Result<u64, ImportError>
    where
        F: FnMut(&[u8]) -> Result<(), ImportError>,
    {
        self.scan(true, f)
    }

    /// Like [`for_each_record`](Self::for_each_record) but blank lines are
    /// passed through too.
    pub fn for_each_line<F>(&mut self, f: F) -> Result<u64, ImportError>
    where
        F: FnMut(&[u8]) -> Result<(), ImportError>,
    {
        self.scan(false, f)
    }

    #[instrument(level = "debug", skip(self, f), fields(archive = %self.name))]
    fn scan<F>(&mut self, skip_blank: bool, mut f: F) -> Result<u64, ImportError>
    where
        F: FnMut(&[u8]) -> Result<(), ImportError>,
    {
        let mut visited = 0u64;
        for i in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index(i)
                .map_err(|e| ImportError::archive(&self.name, e))?;
            debug!(member = %entry.name(), index = i, "reading file from archive");

            let mut reader = BufReader::new(entry);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let n = reader
                    .read_until(b'\n', &mut buf)
                    .map_err(|e| ImportError::archive(&self.name, e))?;
                if n == 0 {
                    break;
                }
                let line = strip_terminator(&buf);
                if skip_blank && line.trim_ascii().is_empty() {
                    continue;
                }
                visited += 1;
                f(line)?;
            }
        }
        Ok(visited)
    }
}

fn strip_terminator(buf: &[u8]) -> &[u8] {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    line.strip_suffix(b"\r").unwrap_or(line)
}
