use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{Response, TransportRequest};

/// Transforms every outgoing attempt before it reaches the transport.
pub type RequestInterceptor = dyn Fn(&mut TransportRequest) + Send + Sync;
/// Transforms every successful response before it is decoded.
pub type ResponseInterceptor = dyn Fn(&mut Response) + Send + Sync;

/// Handle returned on registration, used to eject an interceptor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InterceptorId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl InterceptorId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered interceptor list. Cloned into each request as a snapshot.
pub(crate) struct Chain<T: ?Sized> {
    entries: Vec<(InterceptorId, Arc<T>)>,
}

impl<T: ?Sized> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> Default for Chain<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> Chain<T> {
    pub(crate) fn push(&mut self, interceptor: Arc<T>) -> InterceptorId {
        let id = InterceptorId::next();
        self.entries.push((id, interceptor));
        id
    }

    /// Returns `false` when `id` is not registered.
    pub(crate) fn remove(&mut self, id: InterceptorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter().map(|(_, interceptor)| interceptor)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Chain;

    type Hook = dyn Fn(&mut Vec<&'static str>) + Send + Sync;

    #[test]
    fn runs_in_registration_order() {
        let mut chain: Chain<Hook> = Chain::default();
        chain.push(Arc::new(|log: &mut Vec<&'static str>| log.push("first")));
        chain.push(Arc::new(|log: &mut Vec<&'static str>| log.push("second")));

        let mut log = Vec::new();
        for hook in chain.iter() {
            hook(&mut log);
        }
        assert_eq!(log, ["first", "second"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut chain: Chain<Hook> = Chain::default();
        let id = chain.push(Arc::new(|_: &mut Vec<&'static str>| {}));

        assert!(chain.remove(id));
        assert!(!chain.remove(id));
        assert_eq!(chain.len(), 0);
    }
}
