//! Hand-rolled archive fixtures.
//!
//! Builds stored-method (uncompressed) archives byte by byte, so tests
//! control the exact layout: local header offsets, central directory order,
//! and the trailing comment.

// Packed MS-DOS timestamp: 2024-06-15 12:34:56
pub const DOS_TIME: u16 = (12 << 11) | (34 << 5) | (56 / 2);
pub const DOS_DATE: u16 = ((2024 - 1980) << 9) | (6 << 5) | 15;

struct Entry {
    name: String,
    payload: Vec<u8>,
    crc32: u32,
    lfh_offset: u64,
}

/// Builder for stored-entry ZIP archives.
pub struct ArchiveBuilder {
    local: Vec<u8>,
    entries: Vec<Entry>,
    cd_order: Option<Vec<usize>>,
    comment: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            local: Vec::new(),
            entries: Vec::new(),
            cd_order: None,
            comment: Vec::new(),
        }
    }

    /// Append a stored entry at the current end of the local section.
    pub fn add(&mut self, name: &str, payload: &[u8]) -> &mut Self {
        let lfh_offset = self.local.len() as u64;
        let crc32 = crc32fast::hash(payload);

        self.local.extend_from_slice(b"PK\x03\x04");
        self.local.extend_from_slice(&20u16.to_le_bytes()); // version needed
        self.local.extend_from_slice(&0u16.to_le_bytes()); // flags
        self.local.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        self.local.extend_from_slice(&DOS_TIME.to_le_bytes());
        self.local.extend_from_slice(&DOS_DATE.to_le_bytes());
        self.local.extend_from_slice(&crc32.to_le_bytes());
        self.local
            .extend_from_slice(&(payload.len() as u32).to_le_bytes()); // compressed
        self.local
            .extend_from_slice(&(payload.len() as u32).to_le_bytes()); // uncompressed
        self.local
            .extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.local.extend_from_slice(&0u16.to_le_bytes()); // extra len
        self.local.extend_from_slice(name.as_bytes());
        self.local.extend_from_slice(payload);

        self.entries.push(Entry {
            name: name.to_string(),
            payload: payload.to_vec(),
            crc32,
            lfh_offset,
        });
        self
    }

    /// Emit central directory records in this order (indices into the
    /// entries as added). Defaults to added order.
    pub fn cd_order(&mut self, order: &[usize]) -> &mut Self {
        self.cd_order = Some(order.to_vec());
        self
    }

    pub fn comment(&mut self, comment: &[u8]) -> &mut Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn payload_of(&self, index: usize) -> &[u8] {
        &self.entries[index].payload
    }

    pub fn crc_of(&self, index: usize) -> u32 {
        self.entries[index].crc32
    }

    pub fn lfh_offset_of(&self, index: usize) -> u64 {
        self.entries[index].lfh_offset
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = self.local.clone();
        let cd_offset = data.len() as u64;

        let order: Vec<usize> = match &self.cd_order {
            Some(order) => order.clone(),
            None => (0..self.entries.len()).collect(),
        };

        for &i in &order {
            let entry = &self.entries[i];
            data.extend_from_slice(b"PK\x01\x02");
            data.extend_from_slice(&20u16.to_le_bytes()); // version made by
            data.extend_from_slice(&20u16.to_le_bytes()); // version needed
            data.extend_from_slice(&0u16.to_le_bytes()); // flags
            data.extend_from_slice(&0u16.to_le_bytes()); // method: stored
            data.extend_from_slice(&DOS_TIME.to_le_bytes());
            data.extend_from_slice(&DOS_DATE.to_le_bytes());
            data.extend_from_slice(&entry.crc32.to_le_bytes());
            data.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes()); // extra len
            data.extend_from_slice(&0u16.to_le_bytes()); // comment len
            data.extend_from_slice(&0u16.to_le_bytes()); // disk number
            data.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            data.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            data.extend_from_slice(&(entry.lfh_offset as u32).to_le_bytes());
            data.extend_from_slice(entry.name.as_bytes());
        }

        let cd_size = data.len() as u64 - cd_offset;
        let count = self.entries.len() as u16;

        data.extend_from_slice(b"PK\x05\x06");
        data.extend_from_slice(&0u16.to_le_bytes()); // disk number
        data.extend_from_slice(&0u16.to_le_bytes()); // cd start disk
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&(cd_size as u32).to_le_bytes());
        data.extend_from_slice(&(cd_offset as u32).to_le_bytes());
        data.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.comment);

        data
    }
}

/// Three entries created in the order a, b, c but laid out on disk as
/// a, c, b, so central directory order disagrees with physical order.
/// Local headers land at exactly 0x0, 0x245 and 0xc6 for a, b and c.
pub fn default_zip() -> ArchiveBuilder {
    let mut builder = ArchiveBuilder::new();
    builder
        .add("test/a.txt", &vec![b'a'; 158])
        .add("test/another/path/c.txt", &vec![b'c'; 330])
        .add("test/path/b.txt", &vec![b'b'; 64])
        .cd_order(&[0, 2, 1]);
    builder
}
