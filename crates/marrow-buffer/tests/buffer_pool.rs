//! End-to-end buffer pool tests: eviction under memory pressure, dirty
//! write-back, guard latching, and multi-threaded pin traffic.

use std::sync::mpsc;
use std::time::Duration;

use marrow_buffer::{BufferError, BufferPoolConfig, BufferPoolManager};
use marrow_storage::DiskManager;
use rand::prelude::*;
use tempfile::{tempdir, TempDir};

const PAGE_SIZE: usize = 4096;

fn create_pool(dir: &TempDir, num_frames: usize, k: usize) -> BufferPoolManager {
    let disk = DiskManager::open(dir.path().join("test.db"), PAGE_SIZE).unwrap();
    let config = BufferPoolConfig::new(num_frames)
        .with_page_size(PAGE_SIZE)
        .with_replacer_k(k);
    BufferPoolManager::new(config, disk).unwrap()
}

/// Resident frames are exactly those pinned or evictable; the rest sit
/// in the free list.
fn assert_frames_partitioned(pool: &BufferPoolManager) {
    let stats = pool.stats();
    let resident = pool.num_frames() - pool.free_frames();
    assert_eq!(stats.pinned_frames + pool.evictable_frames(), resident);
}

#[test]
fn pool_exhaustion_and_reuse() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 3, 2);

    // Fill the pool with three pinned pages.
    let mut pages = Vec::new();
    let mut frames = Vec::new();
    for _ in 0..3 {
        let (page_id, frame) = pool.new_page().unwrap();
        pages.push(page_id);
        frames.push(frame.frame_id());
    }
    assert_eq!(pool.evictable_frames(), 0);
    assert_frames_partitioned(&pool);

    // A fourth allocation has nowhere to go.
    assert!(matches!(pool.new_page(), Err(BufferError::NoFreeFrames)));

    // Unpinning the first page makes its frame the only candidate.
    pool.unpin_page(pages[0], false).unwrap();
    let (new_page, frame) = pool.new_page().unwrap();
    assert!(!pages.contains(&new_page));
    assert_eq!(frame.frame_id(), frames[0]);
    assert!(!pool.contains(pages[0]));
    assert_frames_partitioned(&pool);
}

#[test]
fn dirty_page_survives_eviction() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 1, 2);

    // Write a recognizable pattern and unpin dirty.
    let (p0, frame) = pool.new_page().unwrap();
    frame.write_data().fill(0xAB);
    pool.unpin_page(p0, true).unwrap();

    // The next allocation evicts p0, flushing it on the way out.
    let (p1, _) = pool.new_page().unwrap();
    assert!(!pool.contains(p0));
    pool.unpin_page(p1, false).unwrap();

    // Fetching p0 back reads the flushed bytes.
    let frame = pool.fetch_page(p0).unwrap();
    assert!(frame.read_data().iter().all(|&b| b == 0xAB));
    pool.unpin_page(p0, false).unwrap();
}

#[test]
fn guard_round_trip_through_eviction() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 2, 2);

    let (page_id, mut guard) = pool.new_page_guarded().unwrap();
    guard.data_mut()[..8].copy_from_slice(b"marrowdb");
    drop(guard);

    // Churn through enough new pages to push page_id out of the pool.
    for _ in 0..2 {
        let (other, _) = pool.new_page().unwrap();
        pool.unpin_page(other, false).unwrap();
    }
    assert!(!pool.contains(page_id));

    let guard = pool.fetch_page_read(page_id).unwrap();
    assert_eq!(&guard[..8], b"marrowdb");
}

#[test]
fn unflushed_new_page_reads_back_zeroed() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 1, 2);

    // Allocate a page and evict it while still clean; nothing was ever
    // written to disk for it.
    let (p0, _) = pool.new_page().unwrap();
    pool.unpin_page(p0, false).unwrap();
    let (p1, _) = pool.new_page().unwrap();
    pool.unpin_page(p1, false).unwrap();
    assert!(!pool.contains(p0));

    let frame = pool.fetch_page(p0).unwrap();
    assert!(frame.read_data().iter().all(|&b| b == 0));
    pool.unpin_page(p0, false).unwrap();
}

#[test]
fn delete_returns_frame_to_free_list() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 3, 2);

    let mut pages = Vec::new();
    let mut frames = Vec::new();
    for _ in 0..3 {
        let (page_id, frame) = pool.new_page().unwrap();
        pages.push(page_id);
        frames.push(frame.frame_id());
    }

    // Deleting a pinned page fails and changes nothing.
    let err = pool.delete_page(pages[1]).unwrap_err();
    assert!(matches!(err, BufferError::PagePinned { .. }));
    assert!(pool.contains(pages[1]));
    assert_eq!(pool.free_frames(), 0);

    // After unpinning, the delete succeeds and frees the frame.
    pool.unpin_page(pages[1], false).unwrap();
    pool.delete_page(pages[1]).unwrap();
    assert!(!pool.contains(pages[1]));
    assert_eq!(pool.free_frames(), 1);
    assert_frames_partitioned(&pool);

    // The freed frame is reused by the next allocation.
    let (_, frame) = pool.new_page().unwrap();
    assert_eq!(frame.frame_id(), frames[1]);

    // Deleting an already-gone page stays vacuously successful.
    pool.delete_page(pages[1]).unwrap();
}

#[test]
fn flush_all_is_unconditional() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flush.db");
    let disk = DiskManager::open(&path, PAGE_SIZE).unwrap();
    let config = BufferPoolConfig::new(3).with_page_size(PAGE_SIZE);
    let pool = BufferPoolManager::new(config, disk).unwrap();

    let mut pages = Vec::new();
    for fill in 1..=3u8 {
        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data().fill(fill);
        pool.unpin_page(page_id, true).unwrap();
        pages.push(page_id);
    }
    assert_eq!(pool.stats().dirty_frames, 3);

    // One write per resident page; every dirty bit cleared.
    assert_eq!(pool.flush_all_pages().unwrap(), 3);
    assert_eq!(pool.stats().dirty_frames, 0);

    // A second flush with no intervening mutation still writes every
    // page, and the dirty bits remain clear.
    assert_eq!(pool.flush_all_pages().unwrap(), 3);
    assert_eq!(pool.stats().dirty_frames, 0);
    pool.sync().unwrap();

    // The flushed bytes are on disk.
    drop(pool);
    let disk = DiskManager::open(&path, PAGE_SIZE).unwrap();
    for (i, page_id) in pages.iter().enumerate() {
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(*page_id, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == i as u8 + 1));
    }
}

#[test]
fn reader_blocks_on_writer_and_sees_its_bytes() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 2, 2);

    let (page_id, guard) = pool.new_page_guarded().unwrap();
    drop(guard);

    let mut writer = pool.fetch_page_write(page_id).unwrap();
    writer.data_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);

    let (tx, rx) = mpsc::channel();
    std::thread::scope(|scope| {
        let pool = &pool;
        scope.spawn(move || {
            // Blocks on the frame's read latch until the writer drops.
            let reader = pool.fetch_page_read(page_id).unwrap();
            tx.send(reader[..4].to_vec()).unwrap();
        });

        // The reader must still be parked on the latch.
        std::thread::sleep(Duration::from_millis(100));
        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty)));

        drop(writer);
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    });
}

#[test]
fn concurrent_pin_traffic() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 8, 2);

    // Seed some pages every thread can fetch.
    let mut seeded = Vec::new();
    for fill in 0..4u8 {
        let (page_id, mut guard) = pool.new_page_guarded().unwrap();
        guard.data_mut().fill(fill);
        seeded.push((page_id, fill));
        drop(guard);
    }

    std::thread::scope(|scope| {
        for seed in 0..4u64 {
            let pool = &pool;
            let seeded = &seeded;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..200 {
                    if rng.gen_bool(0.5) {
                        // Read a seeded page and check its fill byte.
                        let (page_id, fill) = seeded[rng.gen_range(0..seeded.len())];
                        let guard = pool.fetch_page_read(page_id).unwrap();
                        assert!(guard.iter().all(|&b| b == fill));
                    } else {
                        // Churn a private page through the pool.
                        match pool.new_page_guarded() {
                            Ok((_, mut guard)) => {
                                guard.data_mut()[0] = 0xEE;
                            }
                            Err(BufferError::NoFreeFrames) => {
                                // Another thread holds every frame; retry
                                // on the next iteration.
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            });
        }
    });

    // All guards are gone: nothing stays pinned and the seeded pages
    // still carry their fill bytes.
    assert_eq!(pool.stats().pinned_frames, 0);
    for (page_id, fill) in seeded {
        let guard = pool.fetch_page_read(page_id).unwrap();
        assert!(guard.iter().all(|&b| b == fill));
    }
    assert_frames_partitioned(&pool);
}

#[test]
fn fetch_miss_then_hit_counts() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 2, 2);

    let (page_id, _) = pool.new_page().unwrap();
    pool.unpin_page(page_id, true).unwrap();

    // Evict it, then fetch twice: one miss, one hit.
    let (other, _) = pool.new_page().unwrap();
    pool.unpin_page(other, false).unwrap();
    let (other2, _) = pool.new_page().unwrap();
    pool.unpin_page(other2, false).unwrap();
    assert!(!pool.contains(page_id));

    pool.fetch_page(page_id).unwrap();
    pool.unpin_page(page_id, false).unwrap();
    pool.fetch_page(page_id).unwrap();
    pool.unpin_page(page_id, false).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert!(stats.evictions >= 1);
}
