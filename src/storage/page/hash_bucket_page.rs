use crate::common::{
    PageId, RecordId, SlotId, HASH_BUCKET_CAPACITY, HASH_BUCKET_ENTRY_SIZE, PAGE_SIZE,
};

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

/// Bucket page of the extendible hash index.
///
/// Layout: 4-byte `size`, 4-byte `max_size`, then up to `max_size` entries
/// of 10 bytes each: key (4) + value page id (4) + value slot id (2).
/// Entries are kept in insertion order with no duplicates; removal shifts
/// the tail down.
pub struct HashBucketPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashBucketPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_size: u32) {
        assert!(max_size as usize <= HASH_BUCKET_CAPACITY);
        self.data.fill(0);
        self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4].copy_from_slice(&max_size.to_le_bytes());
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.data[SIZE_OFFSET..SIZE_OFFSET + 4].try_into().unwrap())
    }

    fn set_size(&mut self, size: u32) {
        self.data[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
    }

    pub fn max_size(&self) -> u32 {
        u32::from_le_bytes(
            self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: usize) -> u32 {
        debug_assert!(idx < self.size() as usize);
        let offset = Self::entry_offset(idx);
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn value_at(&self, idx: usize) -> RecordId {
        debug_assert!(idx < self.size() as usize);
        let offset = Self::entry_offset(idx) + 4;
        let page = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        let slot = u16::from_le_bytes(self.data[offset + 4..offset + 6].try_into().unwrap());
        RecordId::new(PageId::new(page), SlotId::new(slot))
    }

    /// Linear scan for the key.
    pub fn lookup(&self, key: u32) -> Option<RecordId> {
        for i in 0..self.size() as usize {
            if self.key_at(i) == key {
                return Some(self.value_at(i));
            }
        }
        None
    }

    /// Appends the pair unless the bucket is full or the key is present.
    pub fn insert(&mut self, key: u32, value: RecordId) -> bool {
        if self.is_full() {
            return false;
        }
        if self.lookup(key).is_some() {
            return false;
        }
        let size = self.size();
        self.write_entry(size as usize, key, value);
        self.set_size(size + 1);
        true
    }

    /// Removes the key if present, shifting later entries down.
    pub fn remove(&mut self, key: u32) -> bool {
        for i in 0..self.size() as usize {
            if self.key_at(i) == key {
                self.remove_at(i);
                return true;
            }
        }
        false
    }

    pub fn remove_at(&mut self, idx: usize) {
        let size = self.size() as usize;
        debug_assert!(idx < size);
        for i in idx..size - 1 {
            let key = self.key_at(i + 1);
            let value = self.value_at(i + 1);
            self.write_entry(i, key, value);
        }
        self.set_size(size as u32 - 1);
    }

    /// Drains all entries, leaving the bucket empty. Used when a split
    /// redistributes a bucket's contents.
    pub fn take_entries(&mut self) -> Vec<(u32, RecordId)> {
        let size = self.size() as usize;
        let mut entries = Vec::with_capacity(size);
        for i in 0..size {
            entries.push((self.key_at(i), self.value_at(i)));
        }
        self.set_size(0);
        entries
    }

    fn entry_offset(idx: usize) -> usize {
        ENTRIES_OFFSET + idx * HASH_BUCKET_ENTRY_SIZE
    }

    fn write_entry(&mut self, idx: usize, key: u32, value: RecordId) {
        let offset = Self::entry_offset(idx);
        self.data[offset..offset + 4].copy_from_slice(&key.to_le_bytes());
        self.data[offset + 4..offset + 8].copy_from_slice(&value.page_id.as_u32().to_le_bytes());
        self.data[offset + 8..offset + 10].copy_from_slice(&value.slot_id.as_u16().to_le_bytes());
    }
}

/// Read-only view of a bucket page.
pub struct HashBucketPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashBucketPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.data[SIZE_OFFSET..SIZE_OFFSET + 4].try_into().unwrap())
    }

    pub fn max_size(&self) -> u32 {
        u32::from_le_bytes(
            self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: usize) -> u32 {
        let offset = ENTRIES_OFFSET + idx * HASH_BUCKET_ENTRY_SIZE;
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn value_at(&self, idx: usize) -> RecordId {
        let offset = ENTRIES_OFFSET + idx * HASH_BUCKET_ENTRY_SIZE + 4;
        let page = u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap());
        let slot = u16::from_le_bytes(self.data[offset + 4..offset + 6].try_into().unwrap());
        RecordId::new(PageId::new(page), SlotId::new(slot))
    }

    pub fn lookup(&self, key: u32) -> Option<RecordId> {
        for i in 0..self.size() as usize {
            if self.key_at(i) == key {
                return Some(self.value_at(i));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(page: u32, slot: u16) -> RecordId {
        RecordId::new(PageId::new(page), SlotId::new(slot))
    }

    #[test]
    fn test_bucket_page_init() {
        let mut data = [0xAAu8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(4);

        assert_eq!(page.size(), 0);
        assert_eq!(page.max_size(), 4);
        assert!(page.is_empty());
        assert!(!page.is_full());
    }

    #[test]
    fn test_bucket_page_insert_lookup() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(4);

        assert!(page.insert(10, rid(1, 0)));
        assert!(page.insert(20, rid(2, 1)));

        assert_eq!(page.lookup(10), Some(rid(1, 0)));
        assert_eq!(page.lookup(20), Some(rid(2, 1)));
        assert_eq!(page.lookup(30), None);
    }

    #[test]
    fn test_bucket_page_duplicate_key_refused() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(4);

        assert!(page.insert(10, rid(1, 0)));
        assert!(!page.insert(10, rid(9, 9)));
        assert_eq!(page.size(), 1);
        assert_eq!(page.lookup(10), Some(rid(1, 0)));
    }

    #[test]
    fn test_bucket_page_full_refused() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(2);

        assert!(page.insert(1, rid(1, 0)));
        assert!(page.insert(2, rid(2, 0)));
        assert!(page.is_full());
        assert!(!page.insert(3, rid(3, 0)));
    }

    #[test]
    fn test_bucket_page_remove_shifts_entries() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(4);

        page.insert(1, rid(1, 0));
        page.insert(2, rid(2, 0));
        page.insert(3, rid(3, 0));

        assert!(page.remove(2));
        assert_eq!(page.size(), 2);
        assert_eq!(page.key_at(0), 1);
        assert_eq!(page.key_at(1), 3);
        assert_eq!(page.lookup(2), None);

        assert!(!page.remove(2));
    }

    #[test]
    fn test_bucket_page_take_entries() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HashBucketPage::new(&mut data);
        page.init(4);

        page.insert(1, rid(1, 0));
        page.insert(2, rid(2, 0));

        let entries = page.take_entries();
        assert_eq!(entries, vec![(1, rid(1, 0)), (2, rid(2, 0))]);
        assert!(page.is_empty());
    }

    #[test]
    fn test_bucket_page_layout() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = HashBucketPage::new(&mut data);
            page.init(408);
            page.insert(0x0102_0304, rid(0x0A0B_0C0D, 0x0E0F));
        }

        assert_eq!(&data[0..4], &[1, 0, 0, 0]); // size
        assert_eq!(&data[4..8], &[0x98, 0x01, 0, 0]); // max_size = 408
        assert_eq!(&data[8..12], &[0x04, 0x03, 0x02, 0x01]); // key
        assert_eq!(&data[12..16], &[0x0D, 0x0C, 0x0B, 0x0A]); // value page
        assert_eq!(&data[16..18], &[0x0F, 0x0E]); // value slot

        let page_ref = HashBucketPageRef::new(&data);
        assert_eq!(page_ref.lookup(0x0102_0304), Some(rid(0x0A0B_0C0D, 0x0E0F)));
    }
}
