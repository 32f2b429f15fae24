//! File-backed scan block sink.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use blewatch::blocklog::{BlockSink, ScanBlock};

pub struct FileSink {
    out: BufWriter<File>,
}

impl FileSink {
    /// Create the log file up front, so a bad path fails at startup
    /// rather than at the first rotation.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<FileSink> {
        Ok(FileSink {
            out: BufWriter::new(File::create(path)?),
        })
    }
}

impl BlockSink for FileSink {
    fn write_block(&mut self, block: &ScanBlock) -> io::Result<()> {
        self.out.write_all(block.render().as_bytes())?;
        self.out.flush()
    }
}
