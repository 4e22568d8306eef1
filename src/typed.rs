use crate::error::check;
use crate::event::{Handler, InterfaceState, ReportEvent, ReportSource, Subscribers, SubscriptionId};
use crate::handle::Disposable;
use crate::interface::InterfaceHandle;
use crate::kinds::{self, Access, NativeReport, ReportKind};
use crate::stream::ReportStream;
use crate::types::TimeValue;
use crate::{ClientError, Result};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const DISPOSED: u8 = 2;

/// Lifecycle of a typed interface: `Created -> Started -> Disposed`, or
/// straight from `Created` to `Disposed`. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    Disposed,
}

/// What the native callback points at.
///
/// The context's child registry holds one strong reference from `start()`
/// until after the session is shut down, so the userdata pointer handed to
/// the native library never dangles while a callback can still arrive.
struct Dispatcher<K: ReportKind> {
    lifecycle: AtomicU8,
    /// Set once the context registry holds this dispatcher.
    in_registry: AtomicBool,
    subscribers: Arc<Subscribers<K::Report>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ReportKind> Dispatcher<K> {
    fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(CREATED),
            in_registry: AtomicBool::new(false),
            subscribers: Arc::new(Subscribers::new()),
            _kind: PhantomData,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        match self.lifecycle.load(Ordering::Acquire) {
            CREATED => Lifecycle::Created,
            STARTED => Lifecycle::Started,
            _ => Lifecycle::Disposed,
        }
    }

    fn is_live(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) != DISPOSED
    }

    fn dispatch(&self, timestamp: TimeValue, report: &NativeReport<K::Payload>) {
        let event = ReportEvent {
            timestamp,
            sensor: report.sensor,
            value: K::report(&report.payload),
        };
        self.subscribers.emit(&event);
    }
}

impl<K: ReportKind> Disposable for Dispatcher<K> {
    fn dispose(&self) {
        self.lifecycle.store(DISPOSED, Ordering::Release);
        self.subscribers.clear();
    }
}

/// Registered with the native library for every started interface of kind `K`.
///
/// Must never unwind into native code, and must not touch the dispatcher's
/// state once it is disposed.
unsafe extern "C" fn trampoline<K: ReportKind>(
    userdata: *mut c_void,
    timestamp: *const TimeValue,
    report: *const c_void,
) {
    if userdata.is_null() || timestamp.is_null() || report.is_null() {
        return;
    }

    // SAFETY: userdata is the `Arc::as_ptr` of a `Dispatcher<K>` kept alive
    // by the context registry until the session is shut down. A handler may
    // dispose the context, so hold our own reference until we return.
    let dispatcher = unsafe {
        let ptr = userdata as *const Dispatcher<K>;
        Arc::increment_strong_count(ptr);
        Arc::from_raw(ptr)
    };
    if !dispatcher.is_live() {
        log::trace!(
            "Dropping {:?} report for a disposed interface",
            K::CATEGORY
        );
        return;
    }

    // SAFETY: `K` guarantees the payload layout for its category.
    let (timestamp, report) = unsafe { (*timestamp, &*(report as *const NativeReport<K::Payload>)) };

    let result = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(timestamp, report)));
    if result.is_err() {
        log::error!("Subscriber panicked while handling a {:?} report", K::CATEGORY);
    }
}

/// Typed view of one native interface.
///
/// `K` selects the report category, which fixes the report type delivered
/// to subscribers and the state type returned by [`ReportSource::state`].
/// The native callback is registered on the first subscription and stays
/// registered until the context shuts down, since the native library has
/// no unregister call.
pub struct TypedInterface<K: ReportKind> {
    handle: InterfaceHandle,
    dispatcher: Arc<Dispatcher<K>>,
}

impl<K: ReportKind> TypedInterface<K> {
    /// Take ownership of `handle`.
    pub fn new(handle: InterfaceHandle) -> Self {
        Self {
            handle,
            dispatcher: Arc::new(Dispatcher::new()),
        }
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.handle.is_disposed() {
            Lifecycle::Disposed
        } else {
            self.dispatcher.lifecycle()
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.subscribers.len()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            // The context cascade may have released our handle behind our back.
            self.dispatcher.dispose();
            return Err(ClientError::UseAfterDispose("TypedInterface"));
        }
        Ok(())
    }

    /// Only reached by the thread that moved the lifecycle to `Started`.
    fn register(&self) -> Result<()> {
        if !self.dispatcher.in_registry.load(Ordering::Acquire) {
            let context = self
                .handle
                .context()
                .ok_or(ClientError::UseAfterDispose("Context"))?;
            context.register_child(self.dispatcher.clone())?;
            self.dispatcher.in_registry.store(true, Ordering::Release);
        }

        let userdata = Arc::as_ptr(&self.dispatcher) as *mut c_void;
        // SAFETY: the registry entry above keeps `userdata` alive until the
        // session is shut down.
        let code = self
            .handle
            .with_live(|api, raw| unsafe {
                api.register_callback(raw, K::CATEGORY, trampoline::<K>, userdata)
            })
            .ok_or(ClientError::UseAfterDispose("TypedInterface"))?;
        check(code, K::CATEGORY.register_call())
    }
}

impl<K: ReportKind> ReportSource for TypedInterface<K> {
    type Report = K::Report;
    type State = K::State;

    fn state(&self) -> Result<InterfaceState<K::State>> {
        if !K::ACCESS.contains(Access::POLL) {
            return Err(ClientError::NoStateAccessor(K::CATEGORY));
        }
        self.ensure_live()?;

        let mut timestamp = TimeValue::default();
        let mut payload = K::Payload::default();
        // SAFETY: `payload` is a `K::Payload`, the layout `K` guarantees for
        // its category.
        let code = self
            .handle
            .with_live(|api, raw| unsafe {
                api.get_state(
                    raw,
                    K::CATEGORY,
                    &mut timestamp,
                    &mut payload as *mut K::Payload as *mut c_void,
                    std::mem::size_of::<K::Payload>(),
                )
            })
            .ok_or(ClientError::UseAfterDispose("TypedInterface"))?;
        check(code, K::CATEGORY.state_call())?;

        Ok(InterfaceState {
            timestamp,
            value: K::state(payload),
        })
    }

    fn start(&self) -> Result<()> {
        if !K::ACCESS.contains(Access::PUSH) {
            return Err(ClientError::NoCallback(K::CATEGORY));
        }
        self.ensure_live()?;

        match self.dispatcher.lifecycle.compare_exchange(
            CREATED,
            STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STARTED) => return Ok(()),
            Err(_) => return Err(ClientError::UseAfterDispose("TypedInterface")),
        }

        if let Err(e) = self.register() {
            log::warn!("Failed to start {} ({:?}): {}", self.path(), K::CATEGORY, e);
            let _ = self.dispatcher.lifecycle.compare_exchange(
                STARTED,
                CREATED,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return Err(e);
        }

        log::debug!("Started {:?} interface {}", K::CATEGORY, self.path());
        Ok(())
    }

    fn subscribe_handler(&self, handler: Handler<K::Report>) -> Result<SubscriptionId> {
        self.start()?;
        Ok(self.dispatcher.subscribers.add(handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.subscribers.remove(id)
    }

    fn stream(&self) -> Result<ReportStream<K::Report>> {
        self.start()?;
        Ok(ReportStream::attach(
            &self.dispatcher.subscribers,
            self.handle.stream_capacity(),
        ))
    }

    fn dispose(&self) {
        self.dispatcher.dispose();
        self.handle.dispose();
    }

    fn is_disposed(&self) -> bool {
        !self.dispatcher.is_live() || self.handle.is_disposed()
    }
}

impl<K: ReportKind> Drop for TypedInterface<K> {
    fn drop(&mut self) {
        ReportSource::dispose(self);
    }
}

impl<K: ReportKind> fmt::Debug for TypedInterface<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedInterface")
            .field("category", &K::CATEGORY)
            .field("path", &self.path())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

pub type PositionInterface = TypedInterface<kinds::Position>;
pub type OrientationInterface = TypedInterface<kinds::Orientation>;
pub type PoseInterface = TypedInterface<kinds::Pose>;
pub type ButtonInterface = TypedInterface<kinds::Button>;
pub type AnalogInterface = TypedInterface<kinds::Analog>;
pub type Location2DInterface = TypedInterface<kinds::Location2D>;
pub type DirectionInterface = TypedInterface<kinds::Direction>;
pub type EyeTracker2DInterface = TypedInterface<kinds::EyeTracker2D>;
pub type EyeTracker3DInterface = TypedInterface<kinds::EyeTracker3D>;
pub type EyeTrackerBlinkInterface = TypedInterface<kinds::EyeTrackerBlink>;
pub type NaviVelocityInterface = TypedInterface<kinds::NaviVelocity>;
pub type NaviPositionInterface = TypedInterface<kinds::NaviPosition>;
