//! Little-endian byte and bit cursors for fixed-layout binary records.
//!
//! Bit fields are packed least significant bit first, the layout a C
//! compiler produces for `uint32_t x:N` members on little-endian targets.

/// Writes bit fields LSB first into a fixed-size buffer.
#[derive(Debug)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    position: usize,
}

impl BitWriter {
    /// A zeroed buffer of `len` bytes.
    pub(crate) fn new(len: usize) -> Self {
        Self {
            data: vec![0; len],
            position: 0,
        }
    }

    /// Append the low `width` bits of `value`. Bits past the end of the
    /// buffer are dropped.
    pub(crate) fn put(&mut self, value: u32, width: u32) {
        for bit in 0..width {
            let index = self.position / 8;
            if index >= self.data.len() {
                return;
            }
            if (value >> bit) & 1 != 0 {
                self.data[index] |= 1 << (self.position % 8);
            }
            self.position += 1;
        }
    }

    /// Append a two's complement field.
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn put_signed(&mut self, value: i32, width: u32) {
        self.put(value as u32, width);
    }

    /// Append a boolean flag.
    pub(crate) fn put_flag(&mut self, value: bool) {
        self.put(u32::from(value), 1);
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Reads bit fields LSB first.
#[derive(Debug)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Next `width` bits as an unsigned value; missing bits read as zero.
    pub(crate) fn take(&mut self, width: u32) -> u32 {
        let mut value = 0u32;
        for bit in 0..width {
            let index = self.position / 8;
            let set = self
                .data
                .get(index)
                .is_some_and(|byte| (byte >> (self.position % 8)) & 1 != 0);
            if set {
                value |= 1 << bit;
            }
            self.position += 1;
        }
        value
    }

    /// Next `width` bits, sign-extended.
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn take_signed(&mut self, width: u32) -> i32 {
        let raw = self.take(width);
        let shift = 32 - width;
        ((raw << shift) as i32) >> shift
    }

    pub(crate) fn take_flag(&mut self) -> bool {
        self.take(1) != 0
    }
}

/// Appends little-endian integers and fixed-width strings.
#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    pub(crate) fn u16(&mut self, value: u16) -> &mut Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn i16(&mut self, value: i16) -> &mut Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.data.extend_from_slice(value);
        self
    }

    /// ASCII text in a zero-padded field of `width` bytes.
    ///
    /// Non-ASCII characters become `?`; text longer than the field is cut.
    pub(crate) fn text(&mut self, value: &str, width: usize) -> &mut Self {
        let mut field: Vec<u8> = value
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .take(width)
            .collect();
        field.resize(width, 0);
        self.data.extend_from_slice(&field);
        self
    }

    pub(crate) fn zeros(&mut self, count: usize) -> &mut Self {
        self.data.resize(self.data.len() + count, 0);
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Reads little-endian integers and fixed-width strings; reads past the end
/// yield zeros.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data.get(self.position + i).copied().unwrap_or(0);
        }
        self.position += N;
        out
    }

    pub(crate) fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub(crate) fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub(crate) fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    pub(crate) fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    /// A field of `width` bytes.
    pub(crate) fn bytes(&mut self, width: usize) -> &'a [u8] {
        let start = self.position.min(self.data.len());
        let end = (self.position + width).min(self.data.len());
        self.position += width;
        &self.data[start..end]
    }

    /// Text of a zero-terminated field of `width` bytes.
    pub(crate) fn text(&mut self, width: usize) -> String {
        let field = self.bytes(width);
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    pub(crate) fn skip(&mut self, count: usize) {
        self.position += count;
    }
}
