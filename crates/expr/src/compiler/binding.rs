//! Arena of variable bindings.
//!
//! Binding constructs (`let`, `for`, quantifiers, function parameters) own a
//! [`BindingId`]; variable references hold the same id as a non-owning handle.
//! Ids carry a generation so that a handle to a removed binding never aliases
//! a binding that later reuses the slot.

use crate::types::SequenceType;
use crate::xdm::ExpandedName;

/// Reference count added by a plain reference.
pub const PLAIN_REFERENCE: u32 = 1;
/// Reference count added by a reference evaluated repeatedly (inside a loop).
pub const LOOP_REFERENCE: u32 = 10;
/// Sentinel count for a variable filtered inside a loop; such a variable is
/// worth materializing completely.
pub const FILTERED: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId {
    index: u32,
    generation: u32,
}

impl BindingId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Let,
    For,
    Quantified,
    Param,
    /// Created by loop-invariant promotion.
    Promoted,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: ExpandedName,
    pub kind: BindingKind,
    pub declared: Option<SequenceType>,
    /// Type of the initializer, once known.
    pub inferred: Option<SequenceType>,
    pub slot: Option<usize>,
    pub ref_count: u32,
    pub indexed: bool,
}

impl Binding {
    pub fn new(name: ExpandedName, kind: BindingKind, declared: Option<SequenceType>) -> Self {
        Self { name, kind, declared, inferred: None, slot: None, ref_count: 0, indexed: false }
    }

    /// Best known static type of the variable's value.
    pub fn static_type(&self) -> SequenceType {
        match (self.declared, self.inferred) {
            (_, Some(inferred)) => inferred,
            (Some(declared), None) => declared,
            (None, None) => SequenceType::ANY,
        }
    }
}

struct Entry {
    generation: u32,
    binding: Option<Binding>,
}

#[derive(Default)]
pub struct Bindings {
    entries: Vec<Entry>,
    free: Vec<u32>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, binding: Binding) -> BindingId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.generation += 1;
            entry.binding = Some(binding);
            return BindingId { index, generation: entry.generation };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry { generation: 0, binding: Some(binding) });
        BindingId { index, generation: 0 }
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.entries.get(id.index()).filter(|e| e.generation == id.generation).and_then(|e| e.binding.as_ref())
    }

    pub fn get_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.entries
            .get_mut(id.index())
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.binding.as_mut())
    }

    pub fn contains(&self, id: BindingId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: BindingId) -> Option<Binding> {
        let entry = self.entries.get_mut(id.index()).filter(|e| e.generation == id.generation)?;
        let removed = entry.binding.take();
        if removed.is_some() {
            self.free.push(id.index);
        }
        removed
    }

    /// Fresh binding with the same declaration; used when a binding construct
    /// is copied. Slot and reference count start over.
    pub fn duplicate(&mut self, id: BindingId) -> Option<BindingId> {
        let original = self.get(id)?;
        let mut copy = Binding::new(original.name.clone(), original.kind, original.declared);
        copy.inferred = original.inferred;
        Some(self.insert(copy))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.binding.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            #[allow(clippy::cast_possible_truncation)]
            let id = BindingId { index: i as u32, generation: e.generation };
            e.binding.as_ref().map(|b| (id, b))
        })
    }
}
