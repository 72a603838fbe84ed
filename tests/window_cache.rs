use std::io::Write;
use std::sync::Arc;

use quarry::{
    FilePackIo, ObjectKind, Pack, WindowCache, WindowCacheConfig, WindowCursor,
};
use tempfile::NamedTempFile;

fn pack_file(len: usize) -> (NamedTempFile, Arc<Pack>) {
    let mut tmp = NamedTempFile::new().expect("temp file");
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    tmp.write_all(&data).expect("write pack");
    let pack = Pack::new(Box::new(FilePackIo::new(tmp.path())));
    (tmp, pack)
}

fn cache_16k_8k() -> WindowCache {
    WindowCache::new(WindowCacheConfig {
        packed_git_limit: 16 * 1024,
        packed_git_window_size: 8 * 1024,
        packed_git_mmap: false,
        delta_base_cache_limit: 64 * 1024,
    })
    .expect("config")
}

#[test]
fn pressure_scenario_evicts_oldest_window() {
    let cache = cache_16k_8k();
    let (_tmp, pack) = pack_file(24 * 1024);
    let mut cursor = WindowCursor::new();

    for offset in [0u64, 8192, 16384] {
        cache.get(&mut cursor, &pack, offset).expect("get");
        cursor.release();
    }

    assert_eq!(cache.open_window_count(), 2);
    assert_eq!(cache.open_byte_count(), 16384);
    assert_eq!(pack.open_count(), 2);
}

#[test]
fn reads_through_cursor_return_exact_pack_bytes() {
    let cache = cache_16k_8k();
    let (_tmp, pack) = pack_file(24 * 1024);
    let mut cursor = WindowCursor::new();

    let mut buf = vec![0u8; 1000];
    let n = cursor.copy(&cache, &pack, 7000, &mut buf).expect("copy");
    assert_eq!(n, 1000);
    let expect: Vec<u8> = (7000..8000).map(|i| (i % 251) as u8).collect();
    assert_eq!(buf, expect);
}

#[test]
fn two_packs_share_one_cache() {
    let cache = cache_16k_8k();
    let (_ta, pack_a) = pack_file(8 * 1024);
    let (_tb, pack_b) = pack_file(8 * 1024);
    let mut cursor = WindowCursor::new();

    cache.get(&mut cursor, &pack_a, 0).expect("get a");
    cursor.release();
    cache.get(&mut cursor, &pack_b, 0).expect("get b");
    cursor.release();

    assert_eq!(cache.open_window_count(), 2);
    assert_eq!(pack_a.open_count(), 1);
    assert_eq!(pack_b.open_count(), 1);

    cache.purge(&pack_a);
    assert_eq!(pack_a.open_count(), 0);
    assert_eq!(pack_b.open_count(), 1);
    assert_eq!(cache.open_window_count(), 1);
}

#[test]
fn reconfigure_to_mmap_swaps_every_window() {
    let cache = cache_16k_8k();
    let (_tmp, pack) = pack_file(24 * 1024);
    let mut cursor = WindowCursor::new();
    cache.get(&mut cursor, &pack, 0).expect("get");
    cursor.release();

    cache
        .reconfigure(WindowCacheConfig {
            packed_git_limit: 16 * 1024,
            packed_git_window_size: 8 * 1024,
            packed_git_mmap: true,
            delta_base_cache_limit: 64 * 1024,
        })
        .expect("reconfigure");
    assert_eq!(cache.open_window_count(), 0);

    let mut buf = vec![0u8; 16];
    let n = cursor.copy(&cache, &pack, 100, &mut buf).expect("copy");
    assert_eq!(n, 16);
    let expect: Vec<u8> = (100..116).map(|i| (i % 251) as u8).collect();
    assert_eq!(buf, expect);
}

#[test]
fn delta_base_cache_round_trips_through_the_window_cache() {
    let cache = cache_16k_8k();
    let (_tmp, pack) = pack_file(8 * 1024);

    assert!(cache.delta_base(&pack, 64).is_none());
    let payload: Arc<[u8]> = vec![7u8; 128].into();
    cache.store_delta_base(&pack, 64, ObjectKind::Blob, Arc::clone(&payload));

    let (kind, data) = cache.delta_base(&pack, 64).expect("cached");
    assert_eq!(kind, ObjectKind::Blob);
    assert_eq!(data.as_ref(), payload.as_ref());
    assert_eq!(cache.delta_base_bytes(), 128);

    // Purging a pack also drops its inflated bases.
    cache.purge(&pack);
    assert!(cache.delta_base(&pack, 64).is_none());
}

#[test]
fn delta_base_cache_honors_reconfigured_limit() {
    let cache = cache_16k_8k();
    let (_tmp, pack) = pack_file(8 * 1024);
    for i in 0..8u64 {
        cache.store_delta_base(&pack, i * 16, ObjectKind::Blob, vec![0u8; 1024].into());
    }
    assert_eq!(cache.delta_base_bytes(), 8 * 1024);

    cache
        .reconfigure(WindowCacheConfig {
            packed_git_limit: 16 * 1024,
            packed_git_window_size: 8 * 1024,
            packed_git_mmap: false,
            delta_base_cache_limit: 2 * 1024,
        })
        .expect("reconfigure");
    assert!(cache.delta_base_bytes() <= 2 * 1024);
}

#[test]
fn randomized_two_pack_stress_keeps_invariants() {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    let cache = cache_16k_8k();
    let (_ta, pack_a) = pack_file(64 * 1024);
    let (_tb, pack_b) = pack_file(40 * 1024);
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut cursor = WindowCursor::new();

    for _ in 0..500 {
        let (pack, len) = if rng.gen_bool(0.5) {
            (&pack_a, 64 * 1024u64)
        } else {
            (&pack_b, 40 * 1024u64)
        };
        let offset = rng.gen_range(0..len);
        cache.get(&mut cursor, pack, offset).expect("get");
        let mut byte = [0u8; 1];
        assert_eq!(cursor.window().expect("pinned").copy(offset, &mut byte), 1);
        assert_eq!(byte[0], (offset % 251) as u8);
        cursor.release();

        assert!(cache.open_byte_count() <= 16 * 1024);
        assert!(cache.open_window_count() <= 2);
    }

    // Open counts track live windows exactly, so a pack with no
    // windows is logically closed.
    let total = pack_a.open_count() + pack_b.open_count();
    assert_eq!(total as usize, cache.open_window_count());
}

#[test]
fn global_cache_is_a_singleton() {
    let a = WindowCache::global() as *const WindowCache;
    let b = WindowCache::global() as *const WindowCache;
    assert_eq!(a, b);
}
