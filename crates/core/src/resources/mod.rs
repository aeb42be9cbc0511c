use parking_lot::Mutex;

/// Categories of native resources, declared in teardown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    TrackingEngine,
    CameraTrack,
    VideoElement,
    Texture,
    Material,
    Geometry,
    OverlayNode,
    RenderTarget,
    Renderer,
    ObjectUrl,
}

/// Opaque ticket returned by [`ResourceRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: u64,
    kind: ResourceKind,
}

impl ResourceHandle {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

type Disposer = Box<dyn FnOnce() + Send>;

struct Entry {
    handle: ResourceHandle,
    label: String,
    disposer: Disposer,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    live: Vec<Entry>,
    released: usize,
}

/// Tracks every allocated native/GPU/media resource so each one is disposed
/// exactly once. Disposers run outside the internal lock, so they may touch
/// other locked state freely.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: Mutex<RegistryInner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        kind: ResourceKind,
        label: impl Into<String>,
        disposer: impl FnOnce() + Send + 'static,
    ) -> ResourceHandle {
        let mut inner = self.inner.lock();
        let handle = ResourceHandle {
            id: inner.next_id,
            kind,
        };
        inner.next_id += 1;
        let label = label.into();
        tracing::trace!(?kind, %label, "registered resource");
        inner.live.push(Entry {
            handle,
            label,
            disposer: Box::new(disposer),
        });
        handle
    }

    /// Disposes a single resource. Returns `false` if it was already released.
    pub fn release(&self, handle: ResourceHandle) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            let position = inner.live.iter().position(|entry| entry.handle == handle);
            position.map(|index| {
                inner.released += 1;
                inner.live.remove(index)
            })
        };

        match entry {
            Some(entry) => {
                run(entry);
                true
            }
            None => false,
        }
    }

    /// Disposes every remaining resource in [`ResourceKind`] order, oldest
    /// first within a kind. Calling it again is a no-op.
    pub fn release_all(&self) -> usize {
        let mut entries = {
            let mut inner = self.inner.lock();
            inner.released += inner.live.len();
            std::mem::take(&mut inner.live)
        };
        entries.sort_by_key(|entry| (entry.handle.kind, entry.handle.id));

        let count = entries.len();
        for entry in entries {
            run(entry);
        }
        count
    }

    pub fn is_live(&self, handle: ResourceHandle) -> bool {
        self.inner
            .lock()
            .live
            .iter()
            .any(|entry| entry.handle == handle)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn live_kinds(&self) -> Vec<ResourceKind> {
        self.inner
            .lock()
            .live
            .iter()
            .map(|entry| entry.handle.kind)
            .collect()
    }

    pub fn released_count(&self) -> usize {
        self.inner.lock().released
    }
}

fn run(entry: Entry) {
    tracing::trace!(kind = ?entry.handle.kind, label = %entry.label, "releasing resource");
    (entry.disposer)();
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResourceRegistry")
            .field("live", &inner.live.len())
            .field("released", &inner.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn releases_each_resource_once() {
        let registry = ResourceRegistry::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let handle = registry.register(ResourceKind::Texture, "video texture", move || {
            *counter.lock() += 1;
        });

        assert!(registry.release(handle));
        assert!(!registry.release(handle));
        assert_eq!(registry.release_all(), 0);
        assert_eq!(*hits.lock(), 1);
        assert!(!registry.is_live(handle));
    }

    #[test]
    fn release_all_follows_teardown_order() {
        let registry = ResourceRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for kind in [
            ResourceKind::ObjectUrl,
            ResourceKind::Renderer,
            ResourceKind::RenderTarget,
            ResourceKind::Texture,
            ResourceKind::VideoElement,
            ResourceKind::TrackingEngine,
        ] {
            let order = order.clone();
            registry.register(kind, format!("{kind:?}"), move || order.lock().push(kind));
        }

        assert_eq!(registry.release_all(), 6);
        assert_eq!(
            *order.lock(),
            vec![
                ResourceKind::TrackingEngine,
                ResourceKind::VideoElement,
                ResourceKind::Texture,
                ResourceKind::RenderTarget,
                ResourceKind::Renderer,
                ResourceKind::ObjectUrl,
            ]
        );
        assert_eq!(registry.release_all(), 0);
        assert_eq!(registry.released_count(), 6);
    }

    #[test]
    fn disposers_may_reenter_the_registry() {
        let registry = Arc::new(ResourceRegistry::new());
        let inner = registry.clone();
        registry.register(ResourceKind::OverlayNode, "node", move || {
            let _ = inner.live_count();
        });

        assert_eq!(registry.release_all(), 1);
    }
}
