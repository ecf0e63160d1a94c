use std::sync::Arc;

use minnow::buffer::BufferPoolManager;
use minnow::index::{DefaultKeyHasher, ExtendibleHashIndex};
use minnow::storage::disk::DiskManager;
use minnow::{PageId, RecordId, SlotId};

fn main() {
    env_logger::init();

    println!("Minnow - storage core of a disk-oriented RDBMS");
    println!("===============================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // Buffer pool with 16 frames and LRU-2 replacement
    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    // Hash index: header depth 1, directory depth 9, small buckets so that
    // the demo actually splits
    let index = ExtendibleHashIndex::new(Arc::clone(&bpm), Box::new(DefaultKeyHasher), 1, 9, 8)
        .expect("Failed to create hash index");
    println!("Created extendible hash index (header page {})", index.header_page_id());

    // Insert a batch of records
    for key in 0..64u32 {
        let rid = RecordId::new(PageId::new(100 + key / 8), SlotId::new((key % 8) as u16));
        let inserted = index.insert(key, rid).expect("insert failed");
        assert!(inserted);
    }
    println!("Inserted 64 keys");

    // Duplicate inserts are refused
    let rid = RecordId::new(PageId::new(1), SlotId::new(1));
    assert!(!index.insert(7, rid).expect("insert failed"));
    println!("Duplicate insert of key 7 refused");

    // Point lookups
    for key in [0u32, 31, 63] {
        match index.get_value(key).expect("lookup failed") {
            Some(rid) => println!("key {} -> ({}, slot {})", key, rid.page_id, rid.slot_id.as_u16()),
            None => println!("key {} -> miss", key),
        }
    }

    // Remove half the keys and re-check
    for key in (0..64u32).step_by(2) {
        assert!(index.remove(key).expect("remove failed"));
    }
    assert_eq!(index.get_value(0).expect("lookup failed"), None);
    assert!(index.get_value(1).expect("lookup failed").is_some());
    println!("\nRemoved even keys; odd keys still present");

    bpm.flush_all_pages().expect("flush failed");
    println!("Flushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
