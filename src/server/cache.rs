//! Bounded LRU caches for image metadata and encoded tiles.
//!
//! Both caches are shared across requests and safe for concurrent use; both
//! count lookups, hits, and inserts. A configured capacity of zero disables
//! a cache entirely (the constructors return `None`).
//!
//! The tile cache is deliberately narrow: only JPEG outputs whose requested
//! dimensions are at most 1024 pixels are admitted, keyed by the full IIIF
//! path without the query string. That keeps the cache to viewer tile
//! traffic instead of arbitrary large renders.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::iiif::{Format, Id, Size, Url};
use crate::img::ImageInfo;

/// Largest requested dimension an encoded tile may have and still be cached.
const MAX_CACHEABLE_DIMENSION: u32 = 1024;

// =============================================================================
// Counters
// =============================================================================

/// Lookup/hit/insert counters for one cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    gets: AtomicU64,
    hits: AtomicU64,
    sets: AtomicU64,
}

impl CacheStats {
    fn get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// `(gets, hits, sets)` so far.
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.gets.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
        )
    }
}

// =============================================================================
// Info cache
// =============================================================================

/// LRU cache of decoder metadata keyed by identifier.
pub struct InfoCache {
    cache: RwLock<LruCache<Id, ImageInfo>>,
    stats: CacheStats,
}

impl InfoCache {
    /// Returns `None` when `capacity` is zero (cache disabled).
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(InfoCache {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: CacheStats::default(),
        })
    }

    pub async fn get(&self, id: &Id) -> Option<ImageInfo> {
        self.stats.get();
        let found = self.cache.write().await.get(id).copied();
        if found.is_some() {
            self.stats.hit();
        }
        found
    }

    pub async fn put(&self, id: Id, info: ImageInfo) {
        self.stats.set();
        self.cache.write().await.put(id, info);
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// =============================================================================
// Tile cache
// =============================================================================

/// LRU cache of encoded response bodies keyed by canonical request path.
pub struct TileCache {
    cache: RwLock<LruCache<String, Bytes>>,
    stats: CacheStats,
}

impl TileCache {
    /// Returns `None` when `capacity` is zero (cache disabled).
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(TileCache {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: CacheStats::default(),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.stats.get();
        let found = self.cache.write().await.get(key).cloned();
        if found.is_some() {
            self.stats.hit();
        }
        found
    }

    pub async fn put(&self, key: String, data: Bytes) {
        self.stats.set();
        self.cache.write().await.put(key, data);
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// The tile cache key for a request, if the request is cacheable.
///
/// Cacheable means: an encoded JPEG command whose requested width is known,
/// positive, and at most 1024, with any requested height at most 1024.
pub fn cache_key(url: &Url) -> Option<String> {
    if url.info || url.format != Format::Jpg {
        return None;
    }
    let (w, h) = match url.size {
        Size::Exact(w, h) | Size::BestFit(w, h) => (w, h),
        Size::Width(w) => (w, 0),
        _ => (0, 0),
    };
    if w > 0 && w <= MAX_CACHEABLE_DIMENSION && h <= MAX_CACHEABLE_DIMENSION {
        Some(url.path.clone())
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn info(w: u32) -> ImageInfo {
        ImageInfo { width: w, height: 100, tile_width: 0, tile_height: 0, levels: 1 }
    }

    #[test]
    fn test_zero_capacity_disables() {
        assert!(InfoCache::new(0).is_none());
        assert!(TileCache::new(0).is_none());
    }

    #[tokio::test]
    async fn test_info_cache_get_put() {
        let cache = InfoCache::new(4).unwrap();
        let id = Id::new("img1");
        assert!(cache.get(&id).await.is_none());

        cache.put(id.clone(), info(600)).await;
        assert_eq!(cache.get(&id).await.unwrap().width, 600);

        let (gets, hits, sets) = cache.stats().snapshot();
        assert_eq!((gets, hits, sets), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_info_cache_evicts_lru() {
        let cache = InfoCache::new(2).unwrap();
        cache.put(Id::new("a"), info(1)).await;
        cache.put(Id::new("b"), info(2)).await;
        cache.get(&Id::new("a")).await;
        cache.put(Id::new("c"), info(3)).await;

        assert!(cache.get(&Id::new("a")).await.is_some());
        assert!(cache.get(&Id::new("b")).await.is_none());
        assert!(cache.get(&Id::new("c")).await.is_some());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_tile_cache_get_put() {
        let cache = TileCache::new(4).unwrap();
        let key = "img1/full/200,/0/default.jpg".to_string();
        assert!(cache.get(&key).await.is_none());

        cache.put(key.clone(), Bytes::from_static(b"jpeg")).await;
        assert_eq!(cache.get(&key).await.unwrap(), Bytes::from_static(b"jpeg"));

        let (gets, hits, sets) = cache.stats().snapshot();
        assert_eq!((gets, hits, sets), (2, 1, 1));
    }

    #[test]
    fn test_cache_key_admission_rules() {
        let key = |p: &str| cache_key(&Url::parse(p).unwrap());

        // JPEG with bounded requested dimensions is cacheable
        assert!(key("x/full/1024,1024/0/default.jpg").is_some());
        assert!(key("x/full/!512,512/0/default.jpg").is_some());
        assert!(key("x/full/200,/0/default.jpg").is_some());

        // Anything over 1024 in either dimension is not
        assert!(key("x/full/1025,100/0/default.jpg").is_none());
        assert!(key("x/full/100,1025/0/default.jpg").is_none());

        // Unknown output width is not cacheable
        assert!(key("x/full/max/0/default.jpg").is_none());
        assert!(key("x/full/,512/0/default.jpg").is_none());
        assert!(key("x/full/pct:50/0/default.jpg").is_none());

        // Non-JPEG formats and info requests are never cached
        assert!(key("x/full/512,512/0/default.png").is_none());
        assert!(key("x/info.json").is_none());
    }

    #[test]
    fn test_cache_key_is_request_path() {
        let u = Url::parse("img1/full/512,/90/gray.jpg").unwrap();
        assert_eq!(cache_key(&u).unwrap(), "img1/full/512,/90/gray.jpg");
    }
}
