//! Fixed-size byte image of the caller's configuration structure.

/// A caller-owned configuration structure that is persisted wholesale.
///
/// `SIZE` is the length of the persisted region. `encode` always receives a
/// buffer of exactly `SIZE` bytes, and so does `decode`. The bytes are taken
/// as-is on load: there is no validity marker for this region.
pub trait ConfigBlob {
    const SIZE: usize;

    fn encode(&self, out: &mut [u8]);

    fn decode(&mut self, bytes: &[u8]);
}

/// Little-endian cursor used by `ConfigBlob::encode` implementations.
///
/// Writes past the end of the buffer are dropped, so a `SIZE` that is too
/// small truncates instead of panicking.
pub struct BlobWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BlobWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        let start = self.pos.min(self.buf.len());
        let end = (self.pos + data.len()).min(self.buf.len());
        self.buf[start..end].copy_from_slice(&data[..end - start]);
        self.pos += data.len();
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.bytes(&[v as u8])
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes(&[v])
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }
}

/// Counterpart of [`BlobWriter`]. Reads past the end yield zero bytes.
pub struct BlobReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn bytes(&mut self, out: &mut [u8]) {
        for b in out.iter_mut() {
            *b = self.buf.get(self.pos).copied().unwrap_or(0);
            self.pos += 1;
        }
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.bytes(&mut out);
        out
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    pub fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.array())
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.array())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    pub fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.array())
    }
}
