//! Byte buffer with reserved headroom for headers written after the body.

use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

/// Growable byte buffer that can be extended at both ends.
///
/// The body is appended first; headers computed from it (message key, key
/// id, transport length prefix) are prepended into the reserved headroom
/// without shifting the body.
#[derive(Clone, Debug, Default)]
pub struct DequeBuffer {
    buf: Vec<u8>,
    head: usize,
}

impl DequeBuffer {
    /// Create an empty buffer with `front` bytes of headroom and room for
    /// `back` bytes of body.
    pub fn with_capacity(back: usize, front: usize) -> Self {
        let mut buf = Vec::with_capacity(front + back);
        buf.resize(front, 0);
        Self { buf, head: front }
    }

    /// Prepend `slice`, growing the headroom if it is too small.
    pub fn extend_front(&mut self, slice: &[u8]) {
        if self.head < slice.len() {
            let shift = slice.len() - self.head;
            self.buf.splice(0..0, std::iter::repeat_n(0, shift));
            self.head += shift;
        }
        self.head -= slice.len();
        self.buf[self.head..self.head + slice.len()].copy_from_slice(slice);
    }

    /// Number of bytes between the head and the end.
    pub fn len(&self) -> usize { self.buf.len() - self.head }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool { self.head == self.buf.len() }

    /// Take the written bytes, dropping any unused headroom.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.head);
        self.buf
    }
}

impl AsRef<[u8]> for DequeBuffer {
    fn as_ref(&self) -> &[u8] { &self.buf[self.head..] }
}

impl AsMut<[u8]> for DequeBuffer {
    fn as_mut(&mut self) -> &mut [u8] { &mut self.buf[self.head..] }
}

impl<I: SliceIndex<[u8]>> Index<I> for DequeBuffer {
    type Output = I::Output;
    fn index(&self, i: I) -> &Self::Output { self.as_ref().index(i) }
}

impl<I: SliceIndex<[u8]>> IndexMut<I> for DequeBuffer {
    fn index_mut(&mut self, i: I) -> &mut Self::Output { self.as_mut().index_mut(i) }
}

impl Extend<u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}

impl<'a> Extend<&'a u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = &'a u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}
