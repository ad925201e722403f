//! Listener traits notified by the dispatcher and the imports registry.

use std::sync::Arc;

use remote_model::{ExportEndpoint, ImportEndpoint, Properties};

/// Receives the lifecycle of locally exported endpoints.
///
/// Callbacks run while the dispatcher lock is held: they must return
/// quickly and must not call back into the dispatcher.
pub trait ExportListener: Send + Sync {
    /// Endpoints created for a single service event.
    fn endpoints_added(&self, endpoints: &[ExportEndpoint]);

    fn endpoint_updated(&self, endpoint: &ExportEndpoint, old_properties: &Properties);

    fn endpoint_removed(&self, endpoint: &ExportEndpoint);
}

/// Receives the lifecycle of endpoints imported from other frameworks.
///
/// Same constraints as [`ExportListener`], with the registry lock.
pub trait ImportListener: Send + Sync {
    fn endpoint_added(&self, endpoint: &ImportEndpoint);

    fn endpoint_updated(&self, endpoint: &ImportEndpoint, old_properties: &Properties);

    fn endpoint_removed(&self, endpoint: &ImportEndpoint);
}

/// Handle returned when attaching a listener, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners kept in registration order.
pub(crate) struct ListenerList<T: ?Sized> {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<T>)>,
}

impl<T: ?Sized> ListenerList<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: Arc<T>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        before != self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter().map(|(_, listener)| listener)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_removal_is_exact() {
        let mut list: ListenerList<str> = ListenerList::new();
        let a = list.add(Arc::from("a"));
        let b = list.add(Arc::from("b"));
        assert_ne!(a, b);

        assert!(list.remove(a));
        assert!(!list.remove(a));
        let left: Vec<&str> = list.iter().map(|s| &**s).collect();
        assert_eq!(left, vec!["b"]);
    }
}
