use crate::common::{PageId, HASH_HEADER_ARRAY_SIZE, HASH_HEADER_MAX_DEPTH, PAGE_SIZE};

const DIRECTORY_IDS_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = HASH_HEADER_ARRAY_SIZE * 4;

const INVALID_PAGE: u32 = u32::MAX;

/// Header page of the extendible hash index.
///
/// Layout: `2^HASH_HEADER_MAX_DEPTH` 4-byte directory page IDs, followed by
/// a 4-byte `max_depth`. The array is sized for the compile-time maximum
/// depth; the configured `max_depth` bounds the live prefix. The high
/// `max_depth` bits of a key hash select the directory slot.
pub struct HashHeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashHeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_depth: u32) {
        assert!(max_depth <= HASH_HEADER_MAX_DEPTH);
        self.data.fill(0);
        self.set_max_depth(max_depth);
        for i in 0..HASH_HEADER_ARRAY_SIZE {
            self.write_slot(i, INVALID_PAGE);
        }
    }

    pub fn max_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    fn set_max_depth(&mut self, max_depth: u32) {
        self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
            .copy_from_slice(&max_depth.to_le_bytes());
    }

    /// Number of directory slots addressable under the configured depth.
    pub fn max_size(&self) -> usize {
        1 << self.max_depth()
    }

    /// Maps the high bits of a key hash to a directory slot.
    pub fn hash_to_directory_index(&self, hash: u32) -> usize {
        let max_depth = self.max_depth();
        if max_depth == 0 {
            return 0;
        }
        (hash >> (32 - max_depth)) as usize
    }

    pub fn directory_page_id(&self, directory_idx: usize) -> Option<PageId> {
        if directory_idx >= self.max_size() {
            return None;
        }
        let val = self.read_slot(directory_idx);
        if val == INVALID_PAGE {
            None
        } else {
            Some(PageId::new(val))
        }
    }

    pub fn set_directory_page_id(&mut self, directory_idx: usize, page_id: Option<PageId>) {
        if directory_idx >= self.max_size() {
            return;
        }
        let val = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE);
        self.write_slot(directory_idx, val);
    }

    fn read_slot(&self, idx: usize) -> u32 {
        let offset = DIRECTORY_IDS_OFFSET + idx * 4;
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn write_slot(&mut self, idx: usize, val: u32) {
        let offset = DIRECTORY_IDS_OFFSET + idx * 4;
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }
}

/// Read-only view of a header page.
pub struct HashHeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashHeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn max_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn max_size(&self) -> usize {
        1 << self.max_depth()
    }

    pub fn hash_to_directory_index(&self, hash: u32) -> usize {
        let max_depth = self.max_depth();
        if max_depth == 0 {
            return 0;
        }
        (hash >> (32 - max_depth)) as usize
    }

    pub fn directory_page_id(&self, directory_idx: usize) -> Option<PageId> {
        if directory_idx >= self.max_size() {
            return None;
        }
        let offset = DIRECTORY_IDS_OFFSET + directory_idx * 4;
        let val = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        if val == INVALID_PAGE {
            None
        } else {
            Some(PageId::new(val))
        }
    }
}
