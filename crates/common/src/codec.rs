//! Little-endian byte reader and writer used by the module codec.

use crate::error::ModuleError;

/// Cursor over a module byte stream.
///
/// Every read names the field being read so truncation errors can say
/// what was expected and where.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ModuleError> {
        if self.remaining() < n {
            return Err(ModuleError::UnexpectedEof {
                offset: self.pos,
                what,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], ModuleError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, ModuleError> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16, ModuleError> {
        self.array(what).map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, ModuleError> {
        self.array(what).map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&mut self, what: &'static str) -> Result<i32, ModuleError> {
        self.array(what).map(i32::from_le_bytes)
    }

    pub(crate) fn f32(&mut self, what: &'static str) -> Result<f32, ModuleError> {
        self.array(what).map(f32::from_le_bytes)
    }

    /// A UTF-8 string of `len` bytes.
    pub(crate) fn string(&mut self, len: usize, what: &'static str) -> Result<String, ModuleError> {
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ModuleError::InvalidUtf8 { what })
    }
}

/// Growable output buffer.
#[derive(Default)]
pub(crate) struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    pub(crate) fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    /// A count or length that must fit in a u32.
    pub(crate) fn len32(&mut self, n: usize, what: &'static str) -> Result<(), ModuleError> {
        let n = u32::try_from(n).map_err(|_| ModuleError::FieldOverflow { what })?;
        self.u32(n);
        Ok(())
    }

    /// A name with a one-byte length prefix.
    pub(crate) fn short_name(&mut self, name: &str) -> Result<(), ModuleError> {
        let len = u8::try_from(name.len()).map_err(|_| ModuleError::NameTooLong {
            name: name.to_owned(),
        })?;
        self.u8(len);
        self.bytes(name.as_bytes());
        Ok(())
    }
}
