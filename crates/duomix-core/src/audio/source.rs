//! Headered PCM sources
//!
//! Each source is a raw little-endian mono 16-bit stream behind a fixed-size
//! header. The header is skipped once at open; at end of data the reader seeks
//! back to the first payload byte and keeps going, so playback loops forever
//! and end-of-stream is never reported as an error.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// A producer-side PCM input
pub trait PcmSource: Send {
    /// Fill `buf` with payload bytes, looping at end of data
    ///
    /// Returns fewer than `buf.len()` bytes only when the payload is empty.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Looping reader over a headered PCM stream
pub struct HeaderedPcmSource<R> {
    reader: R,
    header_len: u64,
}

impl<R: Read + Seek> HeaderedPcmSource<R> {
    /// Wrap `reader`, positioning it just past the header
    pub fn open(mut reader: R, header_len: u64) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(header_len))?;
        Ok(Self {
            reader,
            header_len,
        })
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(self.header_len))?;
        Ok(())
    }
}

impl HeaderedPcmSource<BufReader<File>> {
    /// Open a file source
    pub fn from_path(path: &Path, header_len: u64) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file), header_len)
    }
}

impl<R: Read + Seek + Send> PcmSource for HeaderedPcmSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        // Set after a rewind until the next successful read; a second EOF in
        // that state means there is no payload at all.
        let mut just_rewound = false;

        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    if just_rewound {
                        break;
                    }
                    self.rewind()?;
                    just_rewound = true;
                }
                Ok(n) => {
                    filled += n;
                    just_rewound = false;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}
