//! Integration tests for the disk manager

use minnow::common::{PageId, PAGE_SIZE};
use minnow::storage::disk::DiskManager;

#[test]
fn test_disk_manager_allocate_write_read() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let dm = DiskManager::new(&db_path).unwrap();

    let mut page_ids = Vec::new();
    for i in 0..8u8 {
        let pid = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i;
        data[PAGE_SIZE - 1] = i;
        dm.write_page(pid, &data).unwrap();
        page_ids.push(pid);
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(pid, &mut data).unwrap();
        assert_eq!(data[0], i as u8);
        assert_eq!(data[PAGE_SIZE - 1], i as u8);
    }
}

#[test]
fn test_disk_manager_counts_io() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("counts.db");
    let dm = DiskManager::new(&db_path).unwrap();

    let pid = dm.allocate_page().unwrap(); // writes the zero page
    let writes_after_alloc = dm.get_num_writes();
    assert!(writes_after_alloc >= 1);

    let data = [1u8; PAGE_SIZE];
    dm.write_page(pid, &data).unwrap();
    assert_eq!(dm.get_num_writes(), writes_after_alloc + 1);

    let mut out = [0u8; PAGE_SIZE];
    dm.read_page(pid, &mut out).unwrap();
    assert_eq!(dm.get_num_reads(), 1);
}

#[test]
fn test_disk_manager_reopen_preserves_pages() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("reopen.db");

    let pid;
    {
        let dm = DiskManager::new(&db_path).unwrap();
        pid = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[10] = 99;
        dm.write_page(pid, &data).unwrap();
        dm.sync().unwrap();
    }

    let dm = DiskManager::new(&db_path).unwrap();
    assert_eq!(dm.get_num_pages(), 1);

    let mut data = [0u8; PAGE_SIZE];
    dm.read_page(pid, &mut data).unwrap();
    assert_eq!(data[10], 99);

    // New allocations continue past the existing pages
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
}

#[test]
fn test_disk_manager_deallocate_and_reuse() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("reuse.db");
    let dm = DiskManager::new(&db_path).unwrap();

    let p0 = dm.allocate_page().unwrap();
    let p1 = dm.allocate_page().unwrap();
    let p2 = dm.allocate_page().unwrap();

    dm.deallocate_page(p1).unwrap();
    assert_eq!(dm.allocate_page().unwrap(), p1);

    // p0 and p2 were untouched
    assert_ne!(p0, p1);
    assert_ne!(p2, p1);
}
