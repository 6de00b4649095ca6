//! Registry of data links, keyed by generation-checked handles.

use slab::Slab;


/// Handle to a registered data link.
///
/// Handles stay valid until the link is closed. Keys of closed links are
/// reused, but every insert gets a new generation, so stale handles never
/// refer to another link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId {
    key: u32,
    generation: u32,
}

impl LinkId {
    pub fn key(&self) -> u32 {
        self.key
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.key, self.generation)
    }
}


#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: T,
}


#[derive(Debug)]
pub struct Arena<T> {
    slab: Slab<Entry<T>>,
    generation: u32,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { slab: Slab::new(), generation: 0 }
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    pub fn insert(&mut self, value: T) -> LinkId {
        let generation = self.generation;
        self.generation = self.generation.wrapping_add(1);

        let key = self.slab.insert(Entry { generation, value });

        LinkId { key: key as u32, generation }
    }

    pub fn remove(&mut self, id: LinkId) -> Option<T> {
        self.get(id)?;
        self.slab.try_remove(id.key as usize).map(|entry| entry.value)
    }

    pub fn contains(&self, id: LinkId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: LinkId) -> Option<&T> {
        self.slab.get(id.key as usize)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut T> {
        self.slab.get_mut(id.key as usize)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &mut entry.value)
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (LinkId, &T)> {
        self.slab.iter().map(|(key, entry)| {
            let id = LinkId { key: key as u32, generation: entry.generation };
            (id, &entry.value)
        })
    }

    pub fn ids(&self) -> Vec<LinkId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
