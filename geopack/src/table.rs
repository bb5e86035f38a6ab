//! Byte-cursor primitives for the container's record tables.
//!
//! The header and feature records are plain little-endian field sequences
//! written and read through these two cursors; there is no schema compiler
//! or reflection involved. Vectors are length-prefixed with a `u32` element
//! count, byte blocks with a `u32` byte length.

use crate::error::{GeopackError, GeopackResult};

/// Appends little-endian fields to a growing byte buffer.
#[derive(Debug, Default)]
pub struct TableBuilder {
    buf: Vec<u8>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder { buf: Vec::new() }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// u32 element count followed by the doubles.
    pub fn put_f64_vec(&mut self, values: &[f64]) {
        self.put_u32(values.len() as u32);
        for v in values {
            self.put_f64(*v);
        }
    }

    /// u32 element count followed by the integers.
    pub fn put_u32_vec(&mut self, values: &[u32]) {
        self.put_u32(values.len() as u32);
        for v in values {
            self.put_u32(*v);
        }
    }

    /// u32 byte length followed by the raw bytes.
    pub fn put_block(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads little-endian fields from a byte slice, tracking its own position.
#[derive(Debug)]
pub struct TableReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TableReader<'a> {
    pub fn new(data: &'a [u8]) -> TableReader<'a> {
        TableReader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> GeopackResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(GeopackError::truncated(what));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self, what: &str) -> GeopackResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u16(&mut self, what: &str) -> GeopackResult<u16> {
        Ok(u16::from_le_bytes(self.take(2, what)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self, what: &str) -> GeopackResult<u32> {
        Ok(u32::from_le_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self, what: &str) -> GeopackResult<u64> {
        Ok(u64::from_le_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self, what: &str) -> GeopackResult<f64> {
        Ok(f64::from_le_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    pub fn read_f64_vec(&mut self, what: &str) -> GeopackResult<Vec<f64>> {
        let count = self.read_u32(what)? as usize;
        let mut values = Vec::with_capacity(count.min(self.remaining() / 8));
        for _ in 0..count {
            values.push(self.read_f64(what)?);
        }
        Ok(values)
    }

    pub fn read_u32_vec(&mut self, what: &str) -> GeopackResult<Vec<u32>> {
        let count = self.read_u32(what)? as usize;
        let mut values = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            values.push(self.read_u32(what)?);
        }
        Ok(values)
    }

    pub fn read_block(&mut self, what: &str) -> GeopackResult<&'a [u8]> {
        let len = self.read_u32(what)? as usize;
        self.take(len, what)
    }
}
