//! Byte views over the data of low-level function blocks.
//!
//! A block's bytes are opaque to the tape. The callback that recorded them
//! writes them through a [`ByteWriter`] and reads them back, in recording
//! order, through a [`ByteReader`] during replay.
//!
//! Identifiers stored in a block should be written with
//! [`ByteWriter::write_identifier`]. The tape only sizes the adjoint vector
//! for identifiers it has seen, and that is how it sees the ones a block
//! refers to.

use crate::statement::{Identifier, PASSIVE};

/// Plain values that can be stored in a byte view, little-endian.
pub trait ByteValue: Copy {
    const SIZE: usize;

    fn write_to(self, out: &mut [u8]);
    fn read_from(bytes: &[u8]) -> Self;
}

macro_rules! impl_byte_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl ByteValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn write_to(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_from(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_byte_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64);

/// Write view over a block's reserved bytes.
///
/// The view has exactly the size declared when the block was pushed and
/// must be filled completely.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    data: &'a mut [u8],
    written: usize,
    largest: Identifier,
}

impl<'a> ByteWriter<'a> {
    pub(crate) fn new(data: &'a mut [u8]) -> Self {
        ByteWriter {
            data,
            written: 0,
            largest: PASSIVE,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.written
    }

    /// Release the view as read-only bytes.
    pub(crate) fn into_bytes(self) -> &'a [u8] {
        self.data
    }

    pub fn write<T: ByteValue>(&mut self, value: T) {
        let end = self.claim(T::SIZE);
        value.write_to(&mut self.data[end - T::SIZE..end]);
    }

    /// Write an identifier and remember it for adjoint vector sizing.
    pub fn write_identifier(&mut self, identifier: Identifier) {
        self.largest = self.largest.max(identifier);
        self.write(identifier);
    }

    /// Largest identifier written with
    /// [`write_identifier`](Self::write_identifier).
    pub fn largest_identifier(&self) -> Identifier {
        self.largest
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.claim(bytes.len());
        self.data[end - bytes.len()..end].copy_from_slice(bytes);
    }

    fn claim(&mut self, n: usize) -> usize {
        assert!(
            n <= self.remaining(),
            "byte view overflow: writing {n} bytes with {} of {} left",
            self.remaining(),
            self.data.len()
        );
        self.written += n;
        self.written
    }
}

/// Read view over a block's bytes, in recording order.
#[derive(Clone, Copy, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    read: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, read: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read
    }

    /// All bytes of the view, independent of what was read.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn read<T: ByteValue>(&mut self) -> T {
        let bytes = self.take(T::SIZE);
        T::read_from(bytes)
    }

    #[inline]
    pub fn read_identifier(&mut self) -> Identifier {
        self.read()
    }

    pub fn read_bytes(&mut self, n: usize) -> &'a [u8] {
        self.take(n)
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        assert!(
            n <= self.remaining(),
            "byte view underflow: reading {n} bytes with {} of {} left",
            self.remaining(),
            self.data.len()
        );
        let bytes = &self.data[self.read..self.read + n];
        self.read += n;
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut buf = [0u8; 16];
        let mut w = ByteWriter::new(&mut buf);
        w.write(7u32);
        w.write(2.5f64);
        w.write_bytes(&[1, 2, 3, 4]);
        assert_eq!(w.remaining(), 0);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read::<u32>(), 7);
        assert_eq!(r.read::<f64>(), 2.5);
        assert_eq!(r.read_bytes(4), &[1, 2, 3, 4]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn identifiers_are_tracked() {
        let mut buf = [0u8; 12];
        let mut w = ByteWriter::new(&mut buf);
        assert_eq!(w.largest_identifier(), PASSIVE);
        w.write_identifier(9);
        w.write(40u32);
        w.write_identifier(3);
        assert_eq!(w.largest_identifier(), 9);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_identifier(), 9);
        assert_eq!(r.read::<u32>(), 40);
        assert_eq!(r.read_identifier(), 3);
    }

    #[test]
    #[should_panic(expected = "byte view overflow")]
    fn overflow_panics() {
        let mut buf = [0u8; 4];
        let mut w = ByteWriter::new(&mut buf);
        w.write(1.0f64);
    }
}
