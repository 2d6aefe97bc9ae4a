//! Object registry: identity-preserving ids for objects handed out by
//! reference.
//!
//! Keyed by `Arc` pointer identity; ids come from a monotonically increasing
//! counter and are never reused, including after `release`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use dynbus_core::protocol::ObjectId;

use super::class::RemoteObject;

fn identity(obj: &Arc<dyn RemoteObject>) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

#[derive(Default)]
pub struct ObjectRegistry {
    ids: DashMap<usize, ObjectId>,
    objects: DashMap<ObjectId, Arc<dyn RemoteObject>>,
    next: AtomicU64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `obj`, assigning the next one on first sight.
    pub fn id_of(&self, obj: &Arc<dyn RemoteObject>) -> ObjectId {
        *self.ids.entry(identity(obj)).or_insert_with(|| {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            self.objects.insert(id, Arc::clone(obj));
            id
        })
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<dyn RemoteObject>> {
        self.objects.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Forget `id`. A later marshal of the same object assigns a fresh id.
    pub fn release(&self, id: ObjectId) -> bool {
        match self.objects.remove(&id) {
            Some((_, obj)) => {
                self.ids.remove(&identity(&obj));
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::class::{Class, ClassBuilder};
    use std::any::Any;

    struct Thing;

    impl RemoteObject for Thing {
        fn class(&self) -> Arc<Class> {
            ClassBuilder::<Thing>::new("Thing").build()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn same_object_same_id() {
        let reg = ObjectRegistry::new();
        let a: Arc<dyn RemoteObject> = Arc::new(Thing);
        let b: Arc<dyn RemoteObject> = Arc::new(Thing);
        let ia = reg.id_of(&a);
        assert_eq!(reg.id_of(&Arc::clone(&a)), ia);
        let ib = reg.id_of(&b);
        assert_ne!(ia, ib);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn released_ids_are_not_reused() {
        let reg = ObjectRegistry::new();
        let a: Arc<dyn RemoteObject> = Arc::new(Thing);
        let first = reg.id_of(&a);
        assert!(reg.release(first));
        assert!(!reg.release(first));
        assert!(reg.get(first).is_none());
        let second = reg.id_of(&a);
        assert!(second > first);
    }
}
