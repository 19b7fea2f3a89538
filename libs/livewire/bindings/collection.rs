use crate::core::{CallbackResult, Change, ChangeEvent};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;

/// Entities that can be kept in a [`LiveCollection`]
pub trait Identifiable {
    type Id: PartialEq + Clone + Debug;

    fn id(&self) -> Self::Id;
}

/// In-memory list kept current by INSERT/UPDATE/DELETE changes
///
/// Newest inserts come first. Updates for unknown ids are treated as
/// inserts, deletes for unknown ids are ignored. Clones share the same list.
#[derive(Debug)]
pub struct LiveCollection<T> {
    items: Arc<RwLock<Vec<T>>>,
    capacity: Option<usize>,
}

impl<T> Clone for LiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            capacity: self.capacity,
        }
    }
}

impl<T: Identifiable + Clone> LiveCollection<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            capacity: None,
        }
    }

    /// Keep at most `capacity` items, dropping the oldest
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            capacity: Some(capacity),
        }
    }

    /// Seed with an initial load
    pub fn replace_all(&self, items: Vec<T>) {
        let mut guard = self.items.write();
        *guard = items;
        if let Some(cap) = self.capacity {
            guard.truncate(cap);
        }
    }

    pub fn apply(&self, change: &Change<T>) {
        let mut items = self.items.write();
        match change {
            Change::Insert { new } => {
                let id = new.id();
                items.retain(|item| item.id() != id);
                items.insert(0, new.clone());
                if let Some(cap) = self.capacity {
                    items.truncate(cap);
                }
            }
            Change::Update { new, .. } => {
                let id = new.id();
                match items.iter_mut().find(|item| item.id() == id) {
                    Some(slot) => *slot = new.clone(),
                    None => {
                        items.insert(0, new.clone());
                        if let Some(cap) = self.capacity {
                            items.truncate(cap);
                        }
                    }
                }
            }
            Change::Delete { old } => {
                let id = old.id();
                items.retain(|item| item.id() != id);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.items.read().iter().find(|item| &item.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }
}

impl<T> LiveCollection<T>
where
    T: Identifiable + Clone + Send + Sync + 'static,
{
    /// Subscription callback that applies every change to this collection
    pub fn callback(&self) -> impl Fn(ChangeEvent<T>) -> CallbackResult + Send + Sync + 'static {
        let collection = self.clone();
        move |event: ChangeEvent<T>| {
            collection.apply(&event.change);
            Ok(())
        }
    }
}

impl<T: Identifiable + Clone> Default for LiveCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        label: &'static str,
    }

    impl Identifiable for Item {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }
    }

    fn item(id: u32, label: &'static str) -> Item {
        Item { id, label }
    }

    #[test]
    fn test_insert_update_delete() {
        let collection = LiveCollection::new();
        collection.apply(&Change::Insert { new: item(1, "a") });
        collection.apply(&Change::Insert { new: item(2, "b") });
        assert_eq!(collection.snapshot(), vec![item(2, "b"), item(1, "a")]);

        collection.apply(&Change::Update {
            old: None,
            new: item(1, "a2"),
        });
        assert_eq!(collection.get(&1), Some(item(1, "a2")));
        assert_eq!(collection.snapshot()[1].label, "a2");

        collection.apply(&Change::Delete { old: item(2, "b") });
        collection.apply(&Change::Delete { old: item(9, "missing") });
        assert_eq!(collection.snapshot(), vec![item(1, "a2")]);
    }

    #[test]
    fn test_duplicate_insert_moves_to_front() {
        let collection = LiveCollection::new();
        collection.replace_all(vec![item(1, "a"), item(2, "b")]);
        collection.apply(&Change::Insert { new: item(2, "b2") });
        assert_eq!(collection.snapshot(), vec![item(2, "b2"), item(1, "a")]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let collection = LiveCollection::with_capacity(2);
        for id in 1..=3 {
            collection.apply(&Change::Insert { new: item(id, "x") });
        }
        let ids: Vec<u32> = collection.snapshot().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
