//! Page buffers and constants shared by the tree and the page store.
//!
//! Every B+Tree node occupies exactly one 8KB page.

/// Page size in bytes (8KB).
pub const PAGE_SIZE: usize = 8192;

/// A page identifier.
///
/// The upper 16 bits carry the segment id, the lower 48 bits the page number
/// within the segment.
pub type PageId = u64;

/// Number of bits reserved for the page number inside a `PageId`.
pub const SEGMENT_SHIFT: u32 = 48;

/// Build a page id from a segment id and a segment-local page number.
#[must_use]
#[allow(clippy::cast_lossless)] // u64::from is not const
pub const fn page_id(segment_id: u16, local: u64) -> PageId {
    ((segment_id as u64) << SEGMENT_SHIFT) | (local & ((1 << SEGMENT_SHIFT) - 1))
}

/// Extract the segment id from a page id.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // shifted value always fits in 16 bits
pub const fn segment_of(page_id: PageId) -> u16 {
    (page_id >> SEGMENT_SHIFT) as u16
}

/// A raw page buffer.
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Zero the whole page.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Mutable view of `len` bytes at a specific offset.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.data[offset..offset + len]
    }

    /// Read a u16 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a u16 (little-endian) at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a u64 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    /// Write a u64 (little-endian) at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Compute the CRC32 checksum of the whole page.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.data[..])
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_read_write() {
        let mut page = Page::new();

        page.write_u16(0, 0xBEEF);
        assert_eq!(page.read_u16(0), 0xBEEF);

        page.write_u64(200, 0x0102_0304_0506_0708);
        assert_eq!(page.read_u64(200), 0x0102_0304_0506_0708);

        page.write_bytes(500, b"hello");
        assert_eq!(page.read_bytes(500, 5), b"hello");

        page.clear();
        assert_eq!(page.read_u64(200), 0);
        assert_eq!(page.read_bytes(500, 5), &[0u8; 5]);
    }

    #[test]
    fn test_page_id_segments() {
        let id = page_id(7, 42);
        assert_eq!(segment_of(id), 7);
        assert_eq!(id & ((1 << SEGMENT_SHIFT) - 1), 42);
        assert_eq!(page_id(0, 5), 5);
    }

    #[test]
    fn test_checksum_tracks_content() {
        let mut page = Page::new();
        let empty = page.compute_checksum();
        page.write_u16(10, 1);
        assert_ne!(page.compute_checksum(), empty);
        page.write_u16(10, 0);
        assert_eq!(page.compute_checksum(), empty);
    }
}
