//! # IDs
//! Layers need an identity that survives being moved around the stack, removed, and re-inserted by undo.
//! Paths change as the stack is edited, so coalescing and command targets are keyed by `FuzzID<T>` instead.
//!
//! IDs are unique within this execution of the program and namespaced by `T` at the type level only.
//! They are *not* stable across saves - the container format does not store them.

// One counter for every namespace. Values are never compared across namespaces,
// so sharing a counter costs nothing but a few skipped numbers.
static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub struct FuzzID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    // Namespace marker
    _phantom: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> Clone for FuzzID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for FuzzID<T> {}
impl<T: std::any::Any> PartialEq for FuzzID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for FuzzID<T> {}
impl<T: std::any::Any> std::hash::Hash for FuzzID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T: std::any::Any> FuzzID<T> {
    /// Get the raw numeric value of this ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
}
impl<T: std::any::Any> Default for FuzzID<T> {
    fn default() -> Self {
        let id = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // Starts at one and would take centuries to wrap.
        let Some(id) = std::num::NonZeroU64::new(id) else {
            log::error!("{} ID overflow!", std::any::type_name::<T>());
            std::process::abort();
        };
        Self {
            id,
            _phantom: std::marker::PhantomData,
        }
    }
}
impl<T: std::any::Any> std::fmt::Display for FuzzID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        // rsplit always yields at least one element.
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.id)
    }
}
impl<T: std::any::Any> std::fmt::Debug for FuzzID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::FuzzID;
    #[test]
    fn unique() {
        struct Namespace;
        let mut ids: Vec<_> = (0..256)
            .map(|_| FuzzID::<Namespace>::default().id())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 256, "had duplicate ids");
    }
    #[test]
    fn display_is_namespaced() {
        struct Soup;
        let id = FuzzID::<Soup>::default();
        assert_eq!(id.to_string(), format!("Soup#{}", id.id()));
    }
}
