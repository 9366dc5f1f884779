use crate::key::TileKey;
use crate::quadtree::QuadTree;

use parking_lot::Mutex;
use quadscape_core::SmallKeyHashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Identifies a cached tile across datasets.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    pub label: Arc<str>,
    pub key: TileKey,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub evictions: u64,
}

/// Maps tile keys to [`QuadTree`] nodes under a byte budget, evicting the least recently used nodes that are not in
/// use.
///
/// One cache can serve several datasets; entries are keyed by dataset label. All bookkeeping happens under a single
/// mutex, so lookups, insertions and evictions see a consistent byte total.
pub struct TileCache {
    max_bytes: usize,
    inner: Mutex<CacheInner>,
}

struct CacheEntry {
    node: Arc<QuadTree>,
    last_access: u64,
}

#[derive(Default)]
struct CacheInner {
    tiles: SmallKeyHashMap<CacheKey, CacheEntry>,
    /// Accesses in order, oldest first. An access is stale once its entry has been touched again or removed.
    usage: VecDeque<(u64, CacheKey)>,
    access_counter: u64,
    total_bytes: usize,
    evictions: u64,
}

impl TileCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.tiles.len(),
            bytes: inner.total_bytes,
            max_bytes: self.max_bytes,
            evictions: inner.evictions,
        }
    }

    /// Looks up a tile and marks it as most recently used.
    pub fn get(&self, label: &Arc<str>, key: &TileKey) -> Option<Arc<QuadTree>> {
        let cache_key = CacheKey {
            label: label.clone(),
            key: key.clone(),
        };
        let mut inner = self.inner.lock();
        let node = inner.tiles.get(&cache_key)?.node.clone();
        inner.touch(&cache_key);
        Some(node)
    }

    pub fn contains(&self, label: &Arc<str>, key: &TileKey) -> bool {
        let cache_key = CacheKey {
            label: label.clone(),
            key: key.clone(),
        };
        self.inner.lock().tiles.contains_key(&cache_key)
    }

    /// Returns the cached node, or inserts the one built by `create`. The flag is `true` if `create` ran.
    ///
    /// Lookup and insertion are one atomic step, so only one caller ever creates a given tile.
    pub fn get_or_insert_with(
        &self,
        label: &Arc<str>,
        key: &TileKey,
        create: impl FnOnce() -> Arc<QuadTree>,
    ) -> (Arc<QuadTree>, bool) {
        let cache_key = CacheKey {
            label: label.clone(),
            key: key.clone(),
        };
        let mut inner = self.inner.lock();
        if let Some(node) = inner.tiles.get(&cache_key).map(|e| e.node.clone()) {
            inner.touch(&cache_key);
            return (node, false);
        }

        let node = create();
        inner.total_bytes += node.size_in_bytes();
        inner.tiles.insert(
            cache_key.clone(),
            CacheEntry {
                node: node.clone(),
                last_access: 0,
            },
        );
        inner.touch(&cache_key);
        self.evict(&mut inner, &cache_key);

        (node, true)
    }

    /// Inserts `node`, replacing and disposing any node cached under the same key.
    pub fn insert(&self, label: &Arc<str>, node: Arc<QuadTree>) {
        let cache_key = CacheKey {
            label: label.clone(),
            key: node.key().clone(),
        };
        let mut inner = self.inner.lock();
        let size = node.size_in_bytes();
        let entry = CacheEntry {
            node: node.clone(),
            last_access: 0,
        };
        if let Some(old) = inner.tiles.insert(cache_key.clone(), entry) {
            inner.total_bytes -= old.node.size_in_bytes();
            if !Arc::ptr_eq(&old.node, &node) {
                old.node.dispose();
            }
        }
        inner.total_bytes += size;
        inner.touch(&cache_key);
        self.evict(&mut inner, &cache_key);
    }

    pub fn remove(&self, label: &Arc<str>, key: &TileKey) -> Option<Arc<QuadTree>> {
        let cache_key = CacheKey {
            label: label.clone(),
            key: key.clone(),
        };
        let mut inner = self.inner.lock();
        let entry = inner.tiles.remove(&cache_key)?;
        inner.total_bytes -= entry.node.size_in_bytes();
        Some(entry.node)
    }

    /// Disposes and forgets every tile of one dataset.
    pub fn clear(&self, label: &str) {
        let mut inner = self.inner.lock();
        let mut freed = 0;
        inner.tiles.retain(|k, entry| {
            if &*k.label == label {
                freed += entry.node.size_in_bytes();
                entry.node.dispose();
                false
            } else {
                true
            }
        });
        inner.usage.retain(|(_, k)| &*k.label != label);
        inner.total_bytes -= freed;
        log::debug!("Cleared cached tiles of {:?}, freed {} bytes", label, freed);
    }

    /// Calls `f` on every cached tile of one dataset.
    pub fn for_each_tile(&self, label: &str, mut f: impl FnMut(&Arc<QuadTree>)) {
        let nodes: Vec<_> = {
            let inner = self.inner.lock();
            inner
                .tiles
                .iter()
                .filter(|(k, _)| &*k.label == label)
                .map(|(_, entry)| entry.node.clone())
                .collect()
        };
        for node in nodes.iter() {
            f(node);
        }
    }

    /// Evicts least recently used tiles until the budget holds. Tiles in use or still loading, and `protect`, stay.
    fn evict(&self, inner: &mut CacheInner, protect: &CacheKey) {
        let mut i = 0;
        while inner.total_bytes > self.max_bytes && i < inner.usage.len() {
            let (stamp, candidate) = &inner.usage[i];
            let evictable = match inner.tiles.get(candidate) {
                Some(entry) if entry.last_access == *stamp => {
                    candidate != protect && !entry.node.state().is_in_use() && !entry.node.state().is_loading()
                }
                // Stale access, drop it.
                _ => true,
            };
            if !evictable {
                i += 1;
                continue;
            }
            let Some((stamp, cache_key)) = inner.usage.remove(i) else {
                break;
            };
            if inner.tiles.get(&cache_key).map_or(false, |e| e.last_access == stamp) {
                if let Some(entry) = inner.tiles.remove(&cache_key) {
                    inner.total_bytes -= entry.node.size_in_bytes();
                    inner.evictions += 1;
                    entry.node.dispose();
                    log::debug!("Evicted tile {} of {:?}", cache_key.key, cache_key.label);
                }
            }
        }

        if inner.total_bytes > self.max_bytes {
            log::warn!(
                "Tile cache holds {} bytes over its budget of {}, every other tile is in use",
                inner.total_bytes - self.max_bytes,
                self.max_bytes
            );
        }
    }
}

impl CacheInner {
    /// Stamps `cache_key` as the most recent access. Constant time; the old access stays queued until it is pruned.
    fn touch(&mut self, cache_key: &CacheKey) {
        self.access_counter += 1;
        let stamp = self.access_counter;
        if let Some(entry) = self.tiles.get_mut(cache_key) {
            entry.last_access = stamp;
        }
        self.usage.push_back((stamp, cache_key.clone()));
        if self.usage.len() > 2 * self.tiles.len() + 64 {
            self.prune();
        }
    }

    /// Drops every stale access from the queue.
    fn prune(&mut self) {
        let tiles = &self.tiles;
        self.usage
            .retain(|(stamp, k)| tiles.get(k).map_or(false, |e| e.last_access == *stamp));
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
