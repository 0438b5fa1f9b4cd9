//! In-memory cache of generation results

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use dashmap::DashMap;
use log::{debug, trace};
use tokio::time::Instant;

use crate::request::{GenerationRequest, NameSuggestion};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Order-insensitive identity of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey
{   animal: String
  , traits: Vec<String>
  , theme: Option<String>
  , num_names: usize
}

impl From<&GenerationRequest> for CacheKey
{   fn from(request: &GenerationRequest) -> Self
    {   let mut traits: Vec<String> = request
          .traits()
          .iter()
          .map(|t| t.to_ascii_lowercase())
          .collect();
        traits.sort();
        traits.dedup();

        CacheKey
        {   animal: request.animal().to_ascii_lowercase()
          , traits
          , theme: request.theme().map(str::to_ascii_lowercase)
          , num_names: request.num_names()
        }
    }
}

struct CacheEntry
{   suggestions: Vec<NameSuggestion>
  , inserted_at: Instant
  , last_used: AtomicU64
}

/// Bounded LRU cache with optional time-to-live.
///
/// Backed by a sharded map, so concurrent callers only contend when their
/// keys share a shard. Writers to the same key are last-writer-wins.
pub struct ResultCache
{   entries: DashMap<CacheKey, CacheEntry>
  , capacity: usize
  , ttl: Option<Duration>
  , clock: AtomicU64
}

impl ResultCache
{   pub fn new(capacity: usize, ttl: Option<Duration>) -> Self
    {   ResultCache
        {   entries: DashMap::new()
          , capacity: capacity.max(1)
          , ttl
          , clock: AtomicU64::new(0)
        }
    }

    pub fn capacity(&self) -> usize
    {   self.capacity
    }

    /// Cached suggestions for `key`. Expired entries count as a miss
    /// and are removed.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<NameSuggestion>>
    {   {   let entry = self.entries.get(key)?;
            if self.is_fresh(&entry)
            {   entry.last_used.store(self.tick(), Ordering::Relaxed);
                trace!("Cache hit: {:?}", key);
                return Some(entry.suggestions.clone());
            }
        }
        if self.entries.remove_if(key, |_, entry| !self.is_fresh(entry)).is_some()
        {   debug!("Cache entry expired: {:?}", key);
        }
        None
    }

    /// Store suggestions, evicting the least recently used entry when
    /// full. Empty results are never stored.
    pub fn put(&self, key: CacheKey, suggestions: Vec<NameSuggestion>)
    {   if suggestions.is_empty()
        {   return;
        }
        let entry = CacheEntry
        {   suggestions
          , inserted_at: Instant::now()
          , last_used: AtomicU64::new(self.tick())
        };
        trace!("Cache store: {:?}", key);
        self.entries.insert(key, entry);

        if self.entries.len() > self.capacity && self.ttl.is_some()
        {   self.entries.retain(|_, entry| self.is_fresh(entry));
        }
        while self.entries.len() > self.capacity
        {   let oldest = self.entries
              .iter()
              .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
              .map(|entry| entry.key().clone());
            match oldest
            {   Some(key) => {
                  debug!("Cache full, evicting {:?}", key);
                  self.entries.remove(&key);
                }
              , None => break
            }
        }
    }

    pub fn len(&self) -> usize
    {   self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.entries.is_empty()
    }

    pub fn clear(&self)
    {   self.entries.clear();
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool
    {   self.ttl.map_or(true, |ttl| entry.inserted_at.elapsed() < ttl)
    }

    fn tick(&self) -> u64
    {   self.clock.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ResultCache
{   fn default() -> Self
    {   ResultCache::new(DEFAULT_CAPACITY, Some(DEFAULT_TTL))
    }
}
