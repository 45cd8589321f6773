use std::io::{self, Read, Write};
use std::ops::Deref;

// Once this many consumed bytes accumulate at the front of the buffer
// they are compacted away, so the allocation stays proportional to the
// unconsumed data.
const COMPACT_BYTES: usize = 4096;

/// Append-only byte buffer with a read cursor
///
/// The unconsumed region is contiguous and exposed through `Deref`, so
/// parsers can look ahead over the whole buffered input. Slices obtained
/// that way are invalidated by the next append or consume; anything that
/// must be retained is copied out first (`take`).
///
/// The same type backs both directions of a connection: the read side
/// appends from the socket and the parser consumes, the write side
/// appends serialized responses and `write_to` consumes.
pub(crate) struct Tokenizer {
    data: Vec<u8>,
    consumed: usize,
}

impl Tokenizer {
    pub fn new() -> Tokenizer {
        Tokenizer {
            data: Vec::new(),
            consumed: 0,
        }
    }

    /// Number of unconsumed bytes
    pub fn len(&self) -> usize {
        self.data.len() - self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.consumed == self.data.len()
    }

    /// Advance the read cursor over `n` already-inspected bytes
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.consumed += n;
        if self.consumed >= self.data.len() {
            self.data.clear();
            self.consumed = 0;
        } else if self.consumed > COMPACT_BYTES {
            self.data.drain(..self.consumed);
            self.consumed = 0;
        }
    }

    /// Copy out the first `n` bytes and consume them
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let bytes = self[..n].to_vec();
        self.consume(n);
        bytes
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append up to `max` bytes read from `src`
    ///
    /// Returns the number of bytes appended; zero means end of stream.
    /// `WouldBlock` and other errors leave the buffer unchanged.
    pub fn read_from<R: Read>(&mut self, src: &mut R, max: usize)
        -> io::Result<usize>
    {
        debug_assert!(max > 0);
        let start = self.data.len();
        self.data.resize(start + max, 0);
        match src.read(&mut self.data[start..]) {
            Ok(bytes) => {
                self.data.truncate(start + bytes);
                Ok(bytes)
            }
            Err(e) => {
                self.data.truncate(start);
                Err(e)
            }
        }
    }

    /// Write unconsumed bytes to `dst` once, consuming whatever was
    /// accepted
    pub fn write_to<W: Write>(&mut self, dst: &mut W) -> io::Result<usize> {
        let bytes = dst.write(&self.data[self.consumed..])?;
        self.consume(bytes);
        Ok(bytes)
    }
}

impl Deref for Tokenizer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data[self.consumed..]
    }
}

impl Write for Tokenizer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::Tokenizer;

    #[test]
    fn append_and_consume() {
        let mut buf = Tokenizer::new();
        buf.extend(b"hello world");
        assert_eq!(buf.len(), 11);
        assert_eq!(&buf[..5], b"hello");
        buf.consume(6);
        assert_eq!(&buf[..], b"world");
        buf.consume(5);
        assert!(buf.is_empty());
    }

    #[test]
    fn take_copies_out() {
        let mut buf = Tokenizer::new();
        buf.extend(b"abcdef");
        let head = buf.take(3);
        assert_eq!(head, b"abc");
        assert_eq!(&buf[..], b"def");
    }

    #[test]
    fn read_caps_at_max() {
        let mut buf = Tokenizer::new();
        let mut src = Cursor::new(b"0123456789".to_vec());
        assert_eq!(buf.read_from(&mut src, 4).unwrap(), 4);
        assert_eq!(&buf[..], b"0123");
        assert_eq!(buf.read_from(&mut src, 100).unwrap(), 6);
        assert_eq!(&buf[..], b"0123456789");
        assert_eq!(buf.read_from(&mut src, 4).unwrap(), 0);
    }

    #[test]
    fn write_drains_front_to_back() {
        let mut buf = Tokenizer::new();
        buf.extend(b"response bytes");
        let mut dst = Vec::new();
        while !buf.is_empty() {
            buf.write_to(&mut dst).unwrap();
        }
        assert_eq!(dst, b"response bytes");
    }

    #[test]
    fn compacts_after_large_consume() {
        let mut buf = Tokenizer::new();
        buf.extend(&[b'x'; 8192]);
        buf.consume(5000);
        assert_eq!(buf.len(), 3192);
        buf.extend(b"tail");
        assert_eq!(buf.len(), 3196);
        assert_eq!(&buf[3192..], b"tail");
    }
}
