//! Mark-and-sweep object heap.
//!
//! Objects live in an arena of slots. An [`ObjectRef`] is a slot index plus
//! the slot's generation at allocation time; freeing a slot bumps its
//! generation, so handles to collected objects are detected instead of
//! silently aliasing whatever reuses the slot. The heap never moves objects.

use ember_common::{ObjectRef, RuntimeValue};

#[derive(Debug)]
struct HeapObject {
    fields: Vec<RuntimeValue>,
    marked: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

/// Result of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub freed: usize,
    pub survivors: usize,
}

/// Per-instance object heap.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    threshold: usize,
    initial_threshold: usize,
    max_fields: usize,
}

/// Field limit used when none is configured.
pub const DEFAULT_MAX_FIELDS: usize = 1 << 16;

impl Heap {
    pub fn new(initial_threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            threshold: initial_threshold,
            initial_threshold,
            max_fields: DEFAULT_MAX_FIELDS,
        }
    }

    /// Largest object [`Heap::allocate`] accepts.
    pub fn max_fields(&self) -> usize {
        self.max_fields
    }

    pub fn set_max_fields(&mut self, max_fields: usize) {
        self.max_fields = max_fields;
    }

    /// Number of allocated objects.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Live count at which the next allocation collects first.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_collect(&self) -> bool {
        self.live >= self.threshold
    }

    /// Allocate an object with `field_count` null fields.
    ///
    /// Returns `None` when `field_count` exceeds [`Heap::max_fields`], the
    /// fields cannot be reserved, or the arena has no addressable slot left.
    pub fn allocate(&mut self, field_count: usize) -> Option<ObjectRef> {
        if field_count > self.max_fields {
            return None;
        }
        let mut fields = Vec::new();
        fields.try_reserve_exact(field_count).ok()?;
        fields.resize(field_count, RuntimeValue::Null);
        let object = HeapObject {
            fields,
            marked: false,
        };

        let r = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                ObjectRef::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.try_reserve(1).ok()?;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ObjectRef::new(index, 0)
            }
        };
        self.live += 1;
        Some(r)
    }

    fn live_object(&self, r: ObjectRef) -> Option<&HeapObject> {
        self.slots
            .get(r.index() as usize)
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_ref())
    }

    /// Fields of a live object, or `None` for a stale handle.
    pub fn fields(&self, r: ObjectRef) -> Option<&[RuntimeValue]> {
        self.live_object(r).map(|o| o.fields.as_slice())
    }

    pub fn fields_mut(&mut self, r: ObjectRef) -> Option<&mut [RuntimeValue]> {
        self.slots
            .get_mut(r.index() as usize)
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_mut())
            .map(|o| o.fields.as_mut_slice())
    }

    pub fn contains(&self, r: ObjectRef) -> bool {
        self.live_object(r).is_some()
    }

    /// Collect every object not reachable from `roots`.
    pub fn collect<'a, I>(&mut self, roots: I) -> CollectStats
    where
        I: IntoIterator<Item = &'a RuntimeValue>,
    {
        let mut worklist: Vec<ObjectRef> = roots.into_iter().filter_map(|v| v.as_object()).collect();

        while let Some(r) = worklist.pop() {
            let Some(slot) = self.slots.get_mut(r.index() as usize) else {
                continue;
            };
            if slot.generation != r.generation() {
                continue;
            }
            let Some(object) = slot.object.as_mut() else {
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            worklist.extend(object.fields.iter().filter_map(|v| v.as_object()));
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = slot.object.as_mut() else {
                continue;
            };
            if object.marked {
                object.marked = false;
                continue;
            }
            slot.object = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            freed += 1;
        }

        self.live -= freed;
        self.threshold = (self.live * 2).max(self.initial_threshold);
        CollectStats {
            freed,
            survivors: self.live,
        }
    }

    /// Free every object and restore the initial threshold.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.live = 0;
        self.threshold = self.initial_threshold;
    }
}
