//! Size-checked cache of GPU resources
//!
//! Every persistent texture and buffer the pipeline owns lives in a
//! [`ResourceCache`]. Entries are identified by name, format and usage; their
//! size is only a compatibility check. A request whose size differs from the
//! stored entry releases the old resource and replaces it under the same key.

use std::collections::HashMap;

/// A GPU object that can be stored in a [`ResourceCache`]
///
/// Handles are cheap clones of the same underlying object, so the cache hands
/// out clones and keeps the original for later requests.
pub trait CachedResource: Clone {
    /// Frees the underlying GPU memory
    fn release(&self);
}

impl CachedResource for wgpu::Texture {
    fn release(&self) {
        self.destroy();
    }
}

impl CachedResource for wgpu::Buffer {
    fn release(&self) {
        self.destroy();
    }
}

/// Usage flags of a cached resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    Texture(wgpu::TextureUsages),
    Buffer(wgpu::BufferUsages),
}

/// Lookup key for a cached resource
///
/// Buffers use `(bytes_per_row, rows)` as their width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: Option<wgpu::TextureFormat>,
    pub usage: ResourceUsage,
}

impl ResourceKey {
    pub fn texture(name: &'static str, (width, height): (u32, u32), format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> Self {
        Self {
            name,
            width,
            height,
            format: Some(format),
            usage: ResourceUsage::Texture(usage),
        }
    }

    pub fn buffer(name: &'static str, bytes_per_row: u32, rows: u32, usage: wgpu::BufferUsages) -> Self {
        Self {
            name,
            width: bytes_per_row,
            height: rows,
            format: None,
            usage: ResourceUsage::Buffer(usage),
        }
    }

    /// Total size in bytes of a buffer key
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn slot(&self) -> SlotKey {
        SlotKey {
            name: self.name,
            format: self.format,
            usage: self.usage,
        }
    }
}

/// Identity of a cache entry; size is deliberately excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    name: &'static str,
    format: Option<wgpu::TextureFormat>,
    usage: ResourceUsage,
}

#[derive(Debug)]
struct CacheEntry<R> {
    width: u32,
    height: u32,
    resource: R,
}

/// Allocation counters of a single cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from an existing entry
    pub hits: u64,
    /// Constructor invocations, including replacements
    pub creations: u64,
    /// Entries released because the requested size changed
    pub replacements: u64,
}

/// Cache of GPU resources keyed by [`ResourceKey`]
#[derive(Debug)]
pub struct ResourceCache<R: CachedResource> {
    label: &'static str,
    entries: HashMap<SlotKey, CacheEntry<R>>,
    stats: CacheStats,
}

impl<R: CachedResource> ResourceCache<R> {
    /// Creates an empty cache; `label` only appears in log output
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Returns the resource for `key`, creating it with `create` when absent or size-incompatible
    ///
    /// A superseded resource is released before `create` runs.
    pub fn get_or_create<F>(&mut self, key: &ResourceKey, create: F) -> R
    where
        F: FnOnce(&ResourceKey) -> R,
    {
        let slot = key.slot();

        if let Some(entry) = self.entries.get(&slot) {
            if entry.width == key.width && entry.height == key.height {
                self.stats.hits += 1;
                return entry.resource.clone();
            }

            tracing::debug!(
                cache = self.label,
                name = key.name,
                old_width = entry.width,
                old_height = entry.height,
                width = key.width,
                height = key.height,
                "replacing cached resource"
            );
            entry.resource.release();
            self.entries.remove(&slot);
            self.stats.replacements += 1;
        } else {
            tracing::debug!(cache = self.label, name = key.name, width = key.width, height = key.height, "allocating cached resource");
        }

        let resource = create(key);
        self.stats.creations += 1;
        self.entries.insert(
            slot,
            CacheEntry {
                width: key.width,
                height: key.height,
                resource: resource.clone(),
            },
        );
        resource
    }

    /// Returns the cached size of the entry `key` would map to, if present
    pub fn cached_size(&self, key: &ResourceKey) -> Option<(u32, u32)> {
        self.entries.get(&key.slot()).map(|entry| (entry.width, entry.height))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Releases every cached resource
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.resource.release();
        }
    }
}

impl<R: CachedResource> Drop for ResourceCache<R> {
    fn drop(&mut self) {
        self.clear();
    }
}
