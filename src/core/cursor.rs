//! Byte-level access used by both readers.
//!
//! [`ByteCursor`] walks an HBN stream front to back (with the occasional
//! backward seek during resync). [`WordView`] reads a WDM buffer as either
//! 32-bit integers or 32-bit floats at a word index, without copying.

use crate::core::constants::WORD_SIZE;
use crate::core::error::{HspfError, Result};

pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(HspfError::UnexpectedEnd {
                position: self.position,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Reads `n` bytes as text, dropping trailing whitespace and NULs.
    pub fn read_trimmed(&mut self, n: usize) -> Result<String> {
        let raw = self.read_bytes(n)?;
        Ok(String::from_utf8_lossy(raw)
            .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The `n` bytes at absolute `pos`, without moving the cursor.
    pub fn peek_at(&self, pos: usize, n: usize) -> Option<&'a [u8]> {
        self.data.get(pos..pos.checked_add(n)?)
    }

    pub fn seek_to(&mut self, pos: usize) -> Result<()> {
        self.seek_relative(pos as i64 - self.position as i64)
    }

    /// Moves the cursor by `delta` bytes; backward moves are allowed.
    pub fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let target = self.position as i64 + delta;
        if target < 0 || target > self.data.len() as i64 {
            return Err(HspfError::SeekOutOfBounds {
                position: self.position,
                delta,
            });
        }
        self.position = target as usize;
        Ok(())
    }
}

/// Dual integer/float interpretation of one immutable word buffer.
#[derive(Clone, Copy)]
pub struct WordView<'a> {
    bytes: &'a [u8],
}

impl<'a> WordView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Number of whole words in the buffer.
    pub fn len(&self) -> usize {
        self.bytes.len() / WORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn word(&self, index: usize) -> Result<[u8; 4]> {
        let start = index * WORD_SIZE;
        let slice = self
            .bytes
            .get(start..start + WORD_SIZE)
            .ok_or(HspfError::UnexpectedEnd {
                position: start,
                needed: WORD_SIZE,
                available: self.bytes.len().saturating_sub(start),
            })?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        self.word(index).map(i32::from_le_bytes)
    }

    pub fn real(&self, index: usize) -> Result<f32> {
        self.word(index).map(f32::from_le_bytes)
    }

    /// Reads an integer at `base + offset`, where `offset` comes from the file.
    pub fn int_at(&self, base: usize, offset: i64) -> Result<i32> {
        self.int(resolve(base, offset)?)
    }

    pub fn real_at(&self, base: usize, offset: i64) -> Result<f32> {
        self.real(resolve(base, offset)?)
    }
}

fn resolve(base: usize, offset: i64) -> Result<usize> {
    let index = base as i64 + offset;
    if index < 0 {
        return Err(HspfError::CorruptedData(format!(
            "word offset {} from {} points before the start of the file",
            offset, base
        )));
    }
    Ok(index as usize)
}
