use crate::common::{PageId, HASH_DIRECTORY_ARRAY_SIZE, HASH_DIRECTORY_MAX_DEPTH, PAGE_SIZE};

const MAX_DEPTH_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + HASH_DIRECTORY_ARRAY_SIZE;

const INVALID_PAGE: u32 = u32::MAX;

/// Directory page of the extendible hash index.
///
/// Layout: 4-byte `max_depth`, 4-byte `global_depth`,
/// `2^HASH_DIRECTORY_MAX_DEPTH` 1-byte local depths, then the same number of
/// 4-byte bucket page IDs. The low `global_depth` bits of a key hash select
/// the bucket slot.
///
/// Invariants maintained by the index on top of this page:
/// every `local_depth[i] <= global_depth`, and slots whose indices agree
/// modulo `2^local_depth` share one bucket page and one local depth.
pub struct HashDirectoryPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashDirectoryPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_depth: u32) {
        assert!(max_depth <= HASH_DIRECTORY_MAX_DEPTH);
        self.data.fill(0);
        self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
            .copy_from_slice(&max_depth.to_le_bytes());
        for i in 0..HASH_DIRECTORY_ARRAY_SIZE {
            self.write_bucket_slot(i, INVALID_PAGE);
        }
    }

    pub fn max_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    fn set_global_depth(&mut self, depth: u32) {
        self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&depth.to_le_bytes());
    }

    /// Number of live directory slots: `2^global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    /// Number of slots at the configured maximum depth.
    pub fn max_size(&self) -> usize {
        1 << self.max_depth()
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Maps the low bits of a key hash to a bucket slot.
    pub fn hash_to_bucket_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> Option<PageId> {
        if bucket_idx >= self.max_size() {
            return None;
        }
        let val = self.read_bucket_slot(bucket_idx);
        if val == INVALID_PAGE {
            None
        } else {
            Some(PageId::new(val))
        }
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, page_id: Option<PageId>) {
        if bucket_idx >= self.max_size() {
            return;
        }
        let val = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE);
        self.write_bucket_slot(bucket_idx, val);
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] as u32
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u8) {
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        if self.local_depth(bucket_idx) < self.global_depth() {
            self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] += 1;
        }
    }

    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        if self.local_depth(bucket_idx) > 0 {
            self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] -= 1;
        }
    }

    /// Mask selecting the bit that distinguishes a bucket from its split
    /// image: `1 << (local_depth - 1)`.
    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        let local_depth = self.local_depth(bucket_idx);
        debug_assert!(local_depth > 0);
        1u32 << (local_depth - 1)
    }

    /// The slot a bucket splits into (or merges with): the index with the
    /// distinguishing bit flipped.
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        bucket_idx ^ self.local_depth_mask(bucket_idx) as usize
    }

    /// Doubles the directory, duplicating every slot `i` into
    /// `i + 2^global_depth` (bucket page id and local depth both copied).
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth >= self.max_depth() {
            return;
        }
        let half = 1usize << global_depth;
        for i in 0..half {
            let page_id = self.read_bucket_slot(i);
            let depth = self.data[LOCAL_DEPTHS_OFFSET + i];
            self.write_bucket_slot(half + i, page_id);
            self.data[LOCAL_DEPTHS_OFFSET + half + i] = depth;
        }
        self.set_global_depth(global_depth + 1);
    }

    /// Halves the directory and invalidates the dropped upper half.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return;
        }
        self.set_global_depth(global_depth - 1);
        let new_size = self.size();
        for i in new_size..(new_size << 1) {
            self.write_bucket_slot(i, INVALID_PAGE);
            self.data[LOCAL_DEPTHS_OFFSET + i] = 0;
        }
    }

    /// True when every local depth is strictly below the global depth.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    fn read_bucket_slot(&self, idx: usize) -> u32 {
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn write_bucket_slot(&mut self, idx: usize, val: u32) {
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }
}

/// Read-only view of a directory page.
pub struct HashDirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashDirectoryPageRef<'a> {
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

    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn max_size(&self) -> usize {
        1 << self.max_depth()
    }

    pub fn hash_to_bucket_index(&self, hash: u32) -> usize {
        (hash & ((1u32 << self.global_depth()) - 1)) as usize
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> Option<PageId> {
        if bucket_idx >= self.max_size() {
            return None;
        }
        let offset = BUCKET_PAGE_IDS_OFFSET + bucket_idx * 4;
        let val = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        if val == INVALID_PAGE {
            None
        } else {
            Some(PageId::new(val))
        }
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] as u32
    }

    /// Checks the directory invariants; panics with a description on
    /// violation. Intended for tests and debug assertions.
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        let size = self.size();
        for i in 0..size {
            let local_depth = self.local_depth(i);
            assert!(
                local_depth <= global_depth,
                "slot {}: local depth {} exceeds global depth {}",
                i,
                local_depth,
                global_depth
            );
            let Some(page_id) = self.bucket_page_id(i) else {
                continue;
            };
            // Every slot in the same equivalence class points at the same
            // bucket with the same depth
            let class = 1usize << local_depth;
            let mut j = i % class;
            while j < size {
                assert_eq!(
                    self.bucket_page_id(j),
                    Some(page_id),
                    "slots {} and {} disagree on bucket page",
                    i,
                    j
                );
                assert_eq!(
                    self.local_depth(j),
                    local_depth,
                    "slots {} and {} disagree on local depth",
                    i,
                    j
                );
                j += class;
            }
        }
    }
}
