// Byte-level writers for synthetic HBN streams and WDM files.
#![allow(dead_code)]

pub const BLOCK: usize = 512;

fn back_pointer_width(recpos: usize) -> usize {
    match recpos * 4 + 1 {
        n if n >= 65536 => 3,
        n if n >= 256 => 2,
        _ => 1,
    }
}

pub struct HbnWriter {
    buf: Vec<u8>,
}

impl HbnWriter {
    pub fn new() -> Self {
        Self { buf: vec![0xFD] }
    }

    /// Appends a record; `pointer` overrides the back pointer width.
    pub fn record(
        &mut self,
        kind: u32,
        operation: &str,
        element: u32,
        group: &str,
        payload: &[u8],
        pointer: Option<usize>,
    ) -> &mut Self {
        let v = (24 + payload.len()) as u32;
        self.buf.extend_from_slice(&[
            ((v % 64) * 4) as u8,
            ((v / 64) % 256) as u8,
            ((v / 16384) % 256) as u8,
            (v / 4_194_304) as u8,
        ]);
        self.buf.extend_from_slice(&kind.to_le_bytes());
        self.buf.extend_from_slice(format!("{:<8}", operation).as_bytes());
        self.buf.extend_from_slice(&element.to_le_bytes());
        self.buf.extend_from_slice(format!("{:<8}", group).as_bytes());
        self.buf.extend_from_slice(payload);
        let width = pointer.unwrap_or_else(|| back_pointer_width(28 + payload.len()));
        self.buf.extend(std::iter::repeat(0u8).take(width));
        self
    }

    pub fn header(&mut self, operation: &str, element: u32, group: &str, names: &[&str]) -> &mut Self {
        self.header_with_pointer(operation, element, group, names, None)
    }

    pub fn header_with_pointer(
        &mut self,
        operation: &str,
        element: u32,
        group: &str,
        names: &[&str],
        pointer: Option<usize>,
    ) -> &mut Self {
        let mut payload = Vec::new();
        for name in names {
            payload.extend_from_slice(&(name.len() as u32).to_le_bytes());
            payload.extend_from_slice(name.as_bytes());
        }
        self.record(0, operation, element, group, &payload, pointer)
    }

    /// `time` is `[year, month, day, hour, minute]`.
    pub fn data(
        &mut self,
        operation: &str,
        element: u32,
        group: &str,
        interval: u32,
        time: [u32; 5],
        values: &[f32],
    ) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&interval.to_le_bytes());
        for word in time {
            payload.extend_from_slice(&word.to_le_bytes());
        }
        for value in values {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        self.record(1, operation, element, group, &payload, None)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

pub fn control(nval: i32, compressed: bool) -> i32 {
    (nval << 16) | if compressed { 1 << 5 } else { 0 }
}

pub fn date_word(year: i32, month: i32, day: i32, hour: i32) -> i32 {
    year * 16384 + month * 1024 + day * 32 + hour
}

pub fn real(v: f32) -> i32 {
    v.to_bits() as i32
}

pub enum Attr {
    Int(i32),
    Real(f32),
    Str(&'static str, usize),
}

pub struct WdmBuilder {
    words: Vec<i32>,
}

impl WdmBuilder {
    pub fn new(blocks: usize) -> Self {
        let mut words = vec![0; blocks * BLOCK];
        words[0] = -998;
        words[28] = blocks as i32;
        Self { words }
    }

    pub fn set(&mut self, index: usize, word: i32) -> &mut Self {
        self.words[index] = word;
        self
    }

    /// Writes consecutive words starting at `index`.
    pub fn put(&mut self, index: usize, words: &[i32]) -> &mut Self {
        self.words[index..index + words.len()].copy_from_slice(words);
        self
    }

    pub fn declare_datasets(&mut self, count: i32) -> &mut Self {
        self.words[31] = count;
        self
    }

    /// Lays out a dataset label in `block`; chain entries are zero-based (block, offset).
    pub fn dataset(
        &mut self,
        block: usize,
        dsn: i32,
        attrs: &[(i32, Attr)],
        chain: &[(usize, usize)],
    ) -> &mut Self {
        let index = block * BLOCK;
        let psa = 20usize;
        let pdat = 200usize;
        self.words[index + 4] = dsn;
        self.words[index + 5] = 1;
        self.words[index + 9] = psa as i32;
        self.words[index + 10] = pdat as i32;
        self.words[index + 11] = (pdat + chain.len() + 2) as i32;
        self.words[index + psa - 1] = attrs.len() as i32;

        let mut rel = 100usize;
        for (k, (id, attr)) in attrs.iter().enumerate() {
            self.words[index + psa + 1 + 2 * k] = *id;
            self.words[index + psa + 2 + 2 * k] = (rel + 1) as i32;
            match attr {
                Attr::Int(v) => {
                    self.words[index + rel] = *v;
                    rel += 1;
                }
                Attr::Real(v) => {
                    self.words[index + rel] = real(*v);
                    rel += 1;
                }
                Attr::Str(text, len) => {
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.resize(*len, b' ');
                    for chunk in bytes.chunks(4) {
                        self.words[index + rel] =
                            i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        rel += 1;
                    }
                }
            }
        }

        for (k, (b, off)) in chain.iter().enumerate() {
            self.words[index + pdat + 1 + k] = (((b + 1) << 9) | (off + 1)) as i32;
        }
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
