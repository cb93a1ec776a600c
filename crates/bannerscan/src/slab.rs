/// Indexed storage with O(1) insert/remove/lookup and reused slots.
///
/// `mio::Token` values are cast from slab indices, so a lookup on an event is
/// a direct `Vec` index rather than the linear scan a small connection table
/// could get away with. At the high end of this tool's concurrency range
/// (hundreds of thousands of in-flight connections) the difference is the
/// whole ballgame.
pub struct Slab<T> {
    entries: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Slab<T> {
    pub fn with_capacity(cap: usize) -> Self {
        Self { entries: Vec::with_capacity(cap), free: Vec::new() }
    }

    /// Inserts `value`, returning the index it was stored at.
    pub fn insert(&mut self, value: T) -> usize {
        let idx = self.reserve();
        self.fill(idx, value);
        idx
    }

    /// Claims a slot without a value yet. Used when the index (cast to a
    /// `mio::Token`) is needed to register a resource before the value that
    /// will occupy the slot can be constructed.
    pub fn reserve(&mut self) -> usize {
        if let Some(idx) = self.free.pop() {
            idx
        } else {
            self.entries.push(None);
            self.entries.len() - 1
        }
    }

    /// Fills a slot previously returned by `reserve`.
    pub fn fill(&mut self, idx: usize, value: T) {
        self.entries[idx] = Some(value);
    }

    /// Releases a slot reserved but never filled.
    pub fn cancel(&mut self, idx: usize) {
        self.free.push(idx);
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.entries.get_mut(idx).and_then(Option::as_mut)
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.entries.get(idx).and_then(Option::as_ref)
    }

    /// Removes and returns the entry at `idx`, freeing the slot for reuse.
    pub fn remove(&mut self, idx: usize) -> Option<T> {
        let slot = self.entries.get_mut(idx)?;
        let value = slot.take()?;
        self.free.push(idx);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices currently holding a live value, in slot order.
    pub fn iter_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| e.is_some().then_some(i))
    }
}
