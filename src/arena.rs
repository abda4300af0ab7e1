//! Generation-checked slot arena for live sessions.
//!
//! Keys stay valid only while their slot holds the value they were issued
//! for. A freed slot is reused with a bumped generation, so a stale key (for
//! example one carried by a late completion event) never reaches the new
//! occupant.

/// Handle to a value in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation-checked keys.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Insert a value.
    pub fn insert(&mut self, value: T) -> SessionKey {
        self.insert_with(|_| value)
    }

    /// Insert a value built from its own key.
    pub fn insert_with(&mut self, build: impl FnOnce(SessionKey) -> T) -> SessionKey {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let key = SessionKey {
            index,
            generation: slot.generation,
        };
        slot.value = Some(build(key));
        self.len += 1;
        key
    }

    /// Value for `key`, if still live.
    pub fn get(&self, key: SessionKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable value for `key`, if still live.
    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `key` refers to a live value.
    pub fn contains(&self, key: SessionKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove and return the value for `key`.
    pub fn remove(&mut self, key: SessionKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Keys of all live values, in slot order.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| SessionKey {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Iterate over live values.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
