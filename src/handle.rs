use crate::native::{NativeApi, RawHandle, RETURN_SUCCESS};
use parking_lot::ReentrantMutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything a [`crate::Context`] can dispose when it shuts down.
///
/// `dispose` must be idempotent and must not panic: it runs during the
/// context's cascade and from `Drop`.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// Exclusive access to the native library for one client context.
///
/// The library is single-threaded per context, so every native call made on
/// behalf of a context and its resources goes through [`Session::call`].
/// The lock is re-entrant: callbacks run inside `client_update` on the
/// pumping thread and may call back into the library from there.
pub(crate) struct Session {
    api: Arc<dyn NativeApi>,
    lock: ReentrantMutex<()>,
}

impl Session {
    pub(crate) fn new(api: Arc<dyn NativeApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            lock: ReentrantMutex::new(()),
        })
    }

    pub(crate) fn call<R>(&self, f: impl FnOnce(&dyn NativeApi) -> R) -> R {
        let _guard = self.lock.lock();
        f(self.api.as_ref())
    }
}

/// Which native destroy call releases a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Context,
    Interface,
    Display,
    JointOptions,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Context => f.write_str("context"),
            HandleKind::Interface => f.write_str("interface"),
            HandleKind::Display => f.write_str("display"),
            HandleKind::JointOptions => f.write_str("joint client options"),
        }
    }
}

/// One owned native handle, released exactly once.
///
/// Release happens on the first of `release()`, the owner's cascade, or
/// `Drop`. Later attempts do nothing. The released flag is only flipped
/// while the session lock is held, so [`NativeHandle::with_live`] never
/// hands out a handle that is being destroyed.
pub(crate) struct NativeHandle {
    session: Arc<Session>,
    raw: RawHandle,
    kind: HandleKind,
    released: AtomicBool,
}

impl NativeHandle {
    /// Take ownership of `raw`. Returns `None` for the invalid sentinel, in
    /// which case there is nothing to release.
    pub(crate) fn acquire(session: Arc<Session>, raw: RawHandle, kind: HandleKind) -> Option<Self> {
        if !raw.is_valid() {
            return None;
        }
        Some(Self {
            session,
            raw,
            kind,
            released: AtomicBool::new(false),
        })
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Run `f` against the live handle under the session lock. `None` once
    /// the handle has been released.
    pub(crate) fn with_live<R>(&self, f: impl FnOnce(&dyn NativeApi, RawHandle) -> R) -> Option<R> {
        self.session.call(|api| self.is_valid().then(|| f(api, self.raw)))
    }

    /// Give up ownership without a native destroy call, for handles a native
    /// call consumes. Returns the raw value if it was still owned.
    pub(crate) fn disown(&self) -> Option<RawHandle> {
        self.session.call(|_| {
            (!self.released.swap(true, Ordering::AcqRel)).then_some(self.raw)
        })
    }

    /// Release the handle. Returns true only if this call performed the
    /// release and the native layer reported success.
    pub(crate) fn release(&self) -> bool {
        self.session.call(|api| {
            if self.released.swap(true, Ordering::AcqRel) {
                return false;
            }

            let code = match self.kind {
                HandleKind::Context => api.client_shutdown(self.raw),
                HandleKind::Interface => api.free_interface(self.raw),
                HandleKind::Display => api.free_display(self.raw),
                HandleKind::JointOptions => api.joint_free_options(self.raw),
            };

            if code == RETURN_SUCCESS {
                log::debug!("Released {} handle {:#x}", self.kind, self.raw.as_raw());
                true
            } else {
                log::warn!(
                    "Native release of {} handle {:#x} reported failure",
                    self.kind,
                    self.raw.as_raw()
                );
                false
            }
        })
    }
}

impl Disposable for NativeHandle {
    fn dispose(&self) {
        self.release();
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind)
            .field("raw", &format_args!("{:#x}", self.raw.as_raw()))
            .field("released", &!self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockNative};

    #[test]
    fn test_invalid_sentinel_is_not_acquired() {
        let session = Session::new(Arc::new(MockNative::new()));
        assert!(NativeHandle::acquire(session.clone(), RawHandle::INVALID, HandleKind::Interface).is_none());
        assert!(NativeHandle::acquire(session, RawHandle::from_raw(usize::MAX), HandleKind::Interface).is_none());
    }

    #[test]
    fn test_release_is_exactly_once() {
        let mock = Arc::new(MockNative::new());
        let raw = RawHandle::from_raw(0x40);
        let handle = NativeHandle::acquire(Session::new(mock.clone()), raw, HandleKind::Interface).unwrap();

        assert!(handle.release());
        assert!(!handle.release());
        assert!(!handle.release());
        assert!(!handle.is_valid());
        assert!(handle.with_live(|_, raw| raw).is_none());
        drop(handle);

        assert_eq!(mock.count(|c| matches!(c, MockCall::FreeInterface(r) if *r == raw)), 1);
    }

    #[test]
    fn test_drop_releases() {
        let mock = Arc::new(MockNative::new());
        let raw = RawHandle::from_raw(0x80);
        drop(NativeHandle::acquire(Session::new(mock.clone()), raw, HandleKind::Display).unwrap());
        assert_eq!(mock.count(|c| matches!(c, MockCall::FreeDisplay(r) if *r == raw)), 1);
    }

    #[test]
    fn test_failed_release_still_counts_as_released() {
        let mock = Arc::new(MockNative::new());
        mock.fail_next_free();
        let raw = RawHandle::from_raw(0xc0);
        let handle = NativeHandle::acquire(Session::new(mock.clone()), raw, HandleKind::Interface).unwrap();

        assert!(!handle.release());
        assert!(!handle.is_valid());
        drop(handle);
        assert_eq!(mock.count(|c| matches!(c, MockCall::FreeInterface(_))), 1);
    }

    #[test]
    fn test_disowned_handle_is_never_freed() {
        let mock = Arc::new(MockNative::new());
        let raw = RawHandle::from_raw(0x100);
        let handle = NativeHandle::acquire(Session::new(mock.clone()), raw, HandleKind::JointOptions).unwrap();

        assert_eq!(handle.disown(), Some(raw));
        assert_eq!(handle.disown(), None);
        assert!(!handle.release());
        drop(handle);
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointFreeOptions(_))), 0);
    }

    #[test]
    fn test_session_lock_is_reentrant() {
        let session = Session::new(Arc::new(MockNative::new()));
        let depth = session.call(|_| session.call(|_| session.call(|_| 3)));
        assert_eq!(depth, 3);
    }
}
