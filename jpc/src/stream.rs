use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

trait Source: Read + Seek + Send {}
impl<T: Read + Seek + Send> Source for T {}

/// Seekable byte reader over a file or an in-memory buffer.
///
/// The underlying handle is owned by the stream and released by [`close`] or
/// when the stream is dropped, whichever comes first. Once closed, every
/// operation fails.
///
/// [`close`]: ByteStream::close
pub struct ByteStream {
    source: Option<Box<dyn Source>>,
    length: u64,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("length", &self.length)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream closed")
}

impl ByteStream {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<ByteStream> {
        let file = File::open(path)?;
        ByteStream::from_reader(BufReader::new(file))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> ByteStream {
        ByteStream {
            length: bytes.len() as u64,
            source: Some(Box::new(Cursor::new(bytes))),
        }
    }

    /// Wraps any seekable reader. The reader is rewound to its start.
    pub fn from_reader<R: Read + Seek + Send + 'static>(mut reader: R) -> io::Result<ByteStream> {
        let length = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        Ok(ByteStream {
            source: Some(Box::new(reader)),
            length,
        })
    }

    fn source(&mut self) -> io::Result<&mut Box<dyn Source>> {
        self.source.as_mut().ok_or_else(closed)
    }

    /// Ends the stream at byte offset `end`, so that reads and [`len`] stop
    /// there. Used for a codestream embedded in a container with more boxes
    /// after it.
    ///
    /// [`len`]: ByteStream::len
    pub fn limit(&mut self, end: u64) {
        self.length = self.length.min(end);
    }

    /// Offset one past the last readable byte.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.source()?.stream_position()
    }

    /// Bytes left between the current position and the end of the stream.
    pub fn remaining(&mut self) -> io::Result<u64> {
        let position = self.position()?;
        Ok(self.length.saturating_sub(position))
    }

    /// Reads exactly `n` bytes, failing with `UnexpectedEof` if fewer remain.
    pub fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if (n as u64) > self.remaining()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("requested {} bytes past the end of the stream", n),
            ));
        }

        let mut buffer = vec![0; n];
        self.source()?.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        if (N as u64) > self.remaining()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("requested {} bytes past the end of the stream", N),
            ));
        }

        let mut buffer = [0; N];
        self.source()?.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Reads two bytes and rewinds.
    pub fn peek_marker(&mut self) -> io::Result<[u8; 2]> {
        let marker = self.read_array::<2>()?;
        self.source()?.seek(SeekFrom::Current(-2))?;
        Ok(marker)
    }

    pub fn seek(&mut self, position: u64) -> io::Result<()> {
        self.source()?.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let position = self.position()?;
        self.seek(position + n)
    }

    /// Releases the underlying handle. Calling it again has no effect.
    pub fn close(&mut self) {
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = usize::try_from(self.remaining()?).unwrap_or(usize::MAX);
        let n = buf.len().min(remaining);
        self.source()?.read(&mut buf[..n])
    }
}

impl Seek for ByteStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.source()?.seek(pos)
    }
}
