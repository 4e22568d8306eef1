use crate::context::ContextShared;
use crate::handle::NativeHandle;
use crate::native::{NativeApi, RawHandle};
use std::fmt;
use std::sync::{Arc, Weak};

/// Native interface handle for one resolved path, acquired from
/// [`crate::Context::resolve_path`].
///
/// Carries no behavior beyond the handle's lifetime. Wrap it in a
/// [`crate::TypedInterface`] to receive reports or read state.
pub struct InterfaceHandle {
    handle: Arc<NativeHandle>,
    context: Weak<ContextShared>,
    path: String,
    stream_capacity: usize,
}

impl InterfaceHandle {
    pub(crate) fn new(
        handle: Arc<NativeHandle>,
        context: Weak<ContextShared>,
        path: String,
        stream_capacity: usize,
    ) -> Self {
        Self {
            handle,
            context,
            path,
            stream_capacity,
        }
    }

    /// The path this handle was resolved from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once this handle or its context has been disposed.
    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    /// Release the native handle. Later calls do nothing.
    pub fn dispose(&self) {
        if self.handle.release() {
            log::debug!("Disposed interface {}", self.path);
        }
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    /// Run `f` against the live native handle, serialized with every other
    /// call on the owning session. `None` once disposed.
    pub(crate) fn with_live<R>(&self, f: impl FnOnce(&dyn NativeApi, RawHandle) -> R) -> Option<R> {
        self.handle.with_live(f)
    }

    pub(crate) fn context(&self) -> Option<Arc<ContextShared>> {
        self.context.upgrade()
    }

    pub(crate) fn stream_capacity(&self) -> usize {
        self.stream_capacity
    }
}

impl Drop for InterfaceHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("path", &self.path)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::{MockCall, MockNative};
    use crate::Context;
    use std::sync::Arc;

    #[test]
    fn test_dispose_before_context() {
        let mock = Arc::new(MockNative::new());
        let ctx = Context::with_native(mock.clone(), "org.example.test", 0).unwrap();
        let iface = ctx.resolve_path("/me/head").unwrap();
        assert_eq!(iface.path(), "/me/head");
        assert!(!iface.is_disposed());

        iface.dispose();
        iface.dispose();
        assert!(iface.is_disposed());

        drop(iface);
        drop(ctx);
        assert_eq!(mock.count(|c| matches!(c, MockCall::FreeInterface(_))), 1);
    }

    #[test]
    fn test_context_dispose_kills_handle() {
        let mock = Arc::new(MockNative::new());
        let ctx = Context::with_native(mock.clone(), "org.example.test", 0).unwrap();
        let iface = ctx.resolve_path("/me/hands/left").unwrap();

        ctx.dispose();
        assert!(iface.is_disposed());
        assert!(iface.context().is_some());

        drop(ctx);
        assert!(iface.context().is_none());
    }
}
