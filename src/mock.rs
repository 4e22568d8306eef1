//! In-process stand-in for the native library.
//!
//! [`MockNative`] implements [`NativeApi`] without any tracking hardware. It
//! records every call, hands out fake handles, keeps registered callbacks and
//! delivers scripted reports through them on the next
//! [`crate::Context::update`], the same way the real library does.

use crate::kinds::{NativeReport, ReportKind};
use crate::native::{
    Category, JointOption, NativeApi, RawCallback, RawHandle, ReturnCode, RETURN_FAILURE,
    RETURN_SUCCESS,
};
use crate::types::TimeValue;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STEP: usize = 0x10;

/// One recorded native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Init(String),
    Update(RawHandle),
    Shutdown(RawHandle),
    GetStringParameter(String),
    GetInterface(String),
    FreeInterface(RawHandle),
    RegisterCallback(RawHandle, Category),
    GetState(RawHandle, Category),
    GetDisplay,
    FreeDisplay(RawHandle),
    CheckDisplayStartup(RawHandle),
    JointCreateOptions,
    /// Options handle and the native entry point applied to it.
    JointOption(RawHandle, &'static str),
    JointFreeOptions(RawHandle),
    /// Application identifier and the options handle consumed.
    JointInit(String, RawHandle),
}

/// Invokes one callback with a scripted report.
type Delivery = Arc<dyn Fn(RawCallback, usize) + Send + Sync>;

/// Writes a scripted state into a caller buffer, false on a size mismatch.
type StateWriter = Box<dyn Fn(&mut TimeValue, *mut c_void, usize) -> bool + Send>;

struct Registration {
    ctx: RawHandle,
    path: String,
    category: Category,
    callback: RawCallback,
    userdata: usize,
}

struct Pending {
    path: String,
    category: Category,
    deliver: Delivery,
}

struct OpenInterface {
    ctx: RawHandle,
    path: String,
}

#[derive(Default)]
struct Inner {
    next_handle: usize,
    calls: Vec<MockCall>,
    interfaces: HashMap<RawHandle, OpenInterface>,
    rejected: HashSet<String>,
    registrations: Vec<Registration>,
    pending: Vec<Pending>,
    states: HashMap<(String, Category), StateWriter>,
    string_parameters: HashMap<String, String>,
    display_ready: bool,
    joint_options: HashSet<RawHandle>,
    call_delay: Option<Duration>,
    fail_init: bool,
    fail_updates: bool,
    fail_next_free: bool,
    fail_next_register: bool,
    fail_next_option: bool,
}

impl Inner {
    fn allocate(&mut self) -> RawHandle {
        if self.next_handle == 0 {
            self.next_handle = FIRST_HANDLE;
        }
        let raw = RawHandle::from_raw(self.next_handle);
        self.next_handle += HANDLE_STEP;
        raw
    }

    fn take_free_failure(&mut self) -> ReturnCode {
        if std::mem::take(&mut self.fail_next_free) {
            RETURN_FAILURE
        } else {
            RETURN_SUCCESS
        }
    }
}

/// Scriptable fake of the native ClientKit library.
///
/// Callback registrations outlive `free_interface` and are only dropped by
/// `client_shutdown`, matching the real library. Callbacks are always invoked
/// without the mock's lock held, so subscribers may call back into it.
#[derive(Default)]
pub struct MockNative {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Marks one native call as running for the concurrency counters.
struct InFlight<'a>(&'a MockNative);

impl<'a> InFlight<'a> {
    fn enter(mock: &'a MockNative) -> Self {
        let now = mock.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        mock.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = crate::lock(&mock.inner).call_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Self(mock)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockNative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        crate::lock(&self.inner).calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        crate::lock(&self.inner).calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of callbacks still registered with a live session.
    pub fn registrations(&self) -> usize {
        crate::lock(&self.inner).registrations.len()
    }

    /// Make every later `client_init` return the invalid handle.
    pub fn fail_init(&self) {
        crate::lock(&self.inner).fail_init = true;
    }

    pub fn fail_updates(&self, fail: bool) {
        crate::lock(&self.inner).fail_updates = fail;
    }

    /// Make the next interface or display release report failure.
    pub fn fail_next_free(&self) {
        crate::lock(&self.inner).fail_next_free = true;
    }

    pub fn fail_next_register(&self) {
        crate::lock(&self.inner).fail_next_register = true;
    }

    /// Make the next joint client option report failure.
    pub fn fail_next_option(&self) {
        crate::lock(&self.inner).fail_next_option = true;
    }

    /// Hold every update, interface, registration and state call for
    /// `delay` so overlapping callers become visible.
    pub fn set_call_delay(&self, delay: Duration) {
        crate::lock(&self.inner).call_delay = Some(delay);
    }

    /// Highest number of native calls seen running at the same time.
    /// Callbacks delivered during an update do not count towards it.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make `path` unresolvable.
    pub fn reject_path(&self, path: &str) {
        crate::lock(&self.inner).rejected.insert(path.to_string());
    }

    pub fn set_string_parameter(&self, path: &str, value: &str) {
        crate::lock(&self.inner)
            .string_parameters
            .insert(path.to_string(), value.to_string());
    }

    pub fn set_display_ready(&self, ready: bool) {
        crate::lock(&self.inner).display_ready = ready;
    }

    /// Script the state returned for kind `K` on every interface opened at
    /// `path`.
    pub fn set_state<K: ReportKind>(&self, path: &str, timestamp: TimeValue, payload: K::Payload)
    where
        K::Payload: Send,
    {
        let writer: StateWriter = Box::new(move |out_ts, out, size| {
            if size != std::mem::size_of::<K::Payload>() {
                return false;
            }
            *out_ts = timestamp;
            // SAFETY: the caller promises `out` is valid for `size` bytes of
            // the payload type for this category.
            unsafe { out.cast::<K::Payload>().write(payload) };
            true
        });
        crate::lock(&self.inner)
            .states
            .insert((path.to_string(), K::CATEGORY), writer);
    }

    /// Queue a report for kind `K` at `path`, delivered during the next
    /// successful `client_update`.
    pub fn queue_report<K: ReportKind>(
        &self,
        path: &str,
        timestamp: TimeValue,
        sensor: i32,
        payload: K::Payload,
    ) where
        K::Payload: Send + Sync,
    {
        let pending = Pending {
            path: path.to_string(),
            category: K::CATEGORY,
            deliver: report_delivery::<K>(timestamp, sensor, payload),
        };
        crate::lock(&self.inner).pending.push(pending);
    }

    /// Invoke every callback registered for kind `K` at `path` right away,
    /// outside of any update.
    pub fn fire<K: ReportKind>(&self, path: &str, timestamp: TimeValue, sensor: i32, payload: K::Payload)
    where
        K::Payload: Send + Sync,
    {
        let deliver = report_delivery::<K>(timestamp, sensor, payload);
        let targets: Vec<(RawCallback, usize)> = crate::lock(&self.inner)
            .registrations
            .iter()
            .filter(|r| r.path == path && r.category == K::CATEGORY)
            .map(|r| (r.callback, r.userdata))
            .collect();

        for (callback, userdata) in targets {
            deliver(callback, userdata);
        }
    }
}

fn report_delivery<K: ReportKind>(timestamp: TimeValue, sensor: i32, payload: K::Payload) -> Delivery
where
    K::Payload: Send + Sync,
{
    Arc::new(move |callback: RawCallback, userdata: usize| {
        let report = NativeReport { sensor, payload };
        // SAFETY: callbacks are only matched against registrations of the
        // same category, whose payload layout is `K::Payload`.
        unsafe {
            callback(
                userdata as *mut c_void,
                &timestamp,
                &report as *const NativeReport<K::Payload> as *const c_void,
            )
        };
    })
}

impl NativeApi for MockNative {
    fn client_init(&self, application_id: &CStr, _flags: u32) -> RawHandle {
        let mut inner = crate::lock(&self.inner);
        inner
            .calls
            .push(MockCall::Init(application_id.to_string_lossy().into_owned()));
        if inner.fail_init {
            return RawHandle::INVALID;
        }
        inner.allocate()
    }

    fn client_update(&self, ctx: RawHandle) -> ReturnCode {
        let deliveries: Vec<(RawCallback, usize, Delivery)> = {
            let _running = InFlight::enter(self);
            let mut inner = crate::lock(&self.inner);
            inner.calls.push(MockCall::Update(ctx));
            if inner.fail_updates {
                return RETURN_FAILURE;
            }

            let pending = std::mem::take(&mut inner.pending);
            let mut deliveries = Vec::new();
            for report in pending {
                for r in inner.registrations.iter().filter(|r| {
                    r.ctx == ctx && r.path == report.path && r.category == report.category
                }) {
                    deliveries.push((r.callback, r.userdata, Arc::clone(&report.deliver)));
                }
            }
            deliveries
        };

        for (callback, userdata, deliver) in deliveries {
            deliver(callback, userdata);
        }
        RETURN_SUCCESS
    }

    fn client_shutdown(&self, ctx: RawHandle) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::Shutdown(ctx));
        inner.registrations.retain(|r| r.ctx != ctx);
        inner.interfaces.retain(|_, iface| iface.ctx != ctx);
        RETURN_SUCCESS
    }

    fn get_string_parameter_length(&self, _ctx: RawHandle, path: &CStr, len: &mut usize) -> ReturnCode {
        let inner = crate::lock(&self.inner);
        *len = inner
            .string_parameters
            .get(path.to_string_lossy().as_ref())
            .map_or(0, |value| value.len() + 1);
        RETURN_SUCCESS
    }

    fn get_string_parameter(&self, _ctx: RawHandle, path: &CStr, buf: &mut [u8]) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        let path = path.to_string_lossy().into_owned();
        inner.calls.push(MockCall::GetStringParameter(path.clone()));

        let Some(value) = inner.string_parameters.get(&path) else {
            return RETURN_FAILURE;
        };
        let bytes = value.as_bytes();
        if buf.len() <= bytes.len() {
            return RETURN_FAILURE;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[bytes.len()] = 0;
        RETURN_SUCCESS
    }

    fn get_interface(&self, ctx: RawHandle, path: &CStr, iface: &mut RawHandle) -> ReturnCode {
        let _running = InFlight::enter(self);
        let mut inner = crate::lock(&self.inner);
        let path = path.to_string_lossy().into_owned();
        inner.calls.push(MockCall::GetInterface(path.clone()));
        if inner.rejected.contains(&path) {
            return RETURN_FAILURE;
        }

        let raw = inner.allocate();
        inner.interfaces.insert(raw, OpenInterface { ctx, path });
        *iface = raw;
        RETURN_SUCCESS
    }

    fn free_interface(&self, iface: RawHandle) -> ReturnCode {
        let _running = InFlight::enter(self);
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::FreeInterface(iface));
        inner.interfaces.remove(&iface);
        inner.take_free_failure()
    }

    unsafe fn register_callback(
        &self,
        iface: RawHandle,
        category: Category,
        callback: RawCallback,
        userdata: *mut c_void,
    ) -> ReturnCode {
        let _running = InFlight::enter(self);
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::RegisterCallback(iface, category));
        if std::mem::take(&mut inner.fail_next_register) {
            return RETURN_FAILURE;
        }

        let Some(open) = inner.interfaces.get(&iface) else {
            return RETURN_FAILURE;
        };
        let registration = Registration {
            ctx: open.ctx,
            path: open.path.clone(),
            category,
            callback,
            userdata: userdata as usize,
        };
        inner.registrations.push(registration);
        RETURN_SUCCESS
    }

    unsafe fn get_state(
        &self,
        iface: RawHandle,
        category: Category,
        timestamp: &mut TimeValue,
        state: *mut c_void,
        state_size: usize,
    ) -> ReturnCode {
        let _running = InFlight::enter(self);
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::GetState(iface, category));

        let Some(open) = inner.interfaces.get(&iface) else {
            return RETURN_FAILURE;
        };
        match inner.states.get(&(open.path.clone(), category)) {
            Some(writer) if writer(timestamp, state, state_size) => RETURN_SUCCESS,
            _ => RETURN_FAILURE,
        }
    }

    fn get_display(&self, _ctx: RawHandle, display: &mut RawHandle) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::GetDisplay);
        *display = inner.allocate();
        RETURN_SUCCESS
    }

    fn free_display(&self, display: RawHandle) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::FreeDisplay(display));
        inner.take_free_failure()
    }

    fn check_display_startup(&self, display: RawHandle) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::CheckDisplayStartup(display));
        if inner.display_ready {
            RETURN_SUCCESS
        } else {
            RETURN_FAILURE
        }
    }

    fn joint_create_options(&self) -> RawHandle {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::JointCreateOptions);
        let raw = inner.allocate();
        inner.joint_options.insert(raw);
        raw
    }

    fn joint_apply_option(&self, options: RawHandle, option: &JointOption<'_>) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::JointOption(options, option.call()));
        if std::mem::take(&mut inner.fail_next_option) || !inner.joint_options.contains(&options) {
            return RETURN_FAILURE;
        }
        RETURN_SUCCESS
    }

    fn joint_free_options(&self, options: RawHandle) -> ReturnCode {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::JointFreeOptions(options));
        if inner.joint_options.remove(&options) {
            RETURN_SUCCESS
        } else {
            RETURN_FAILURE
        }
    }

    fn joint_client_init(&self, application_id: &CStr, options: RawHandle) -> RawHandle {
        let mut inner = crate::lock(&self.inner);
        inner.calls.push(MockCall::JointInit(
            application_id.to_string_lossy().into_owned(),
            options,
        ));
        inner.joint_options.remove(&options);
        if inner.fail_init {
            return RawHandle::INVALID;
        }
        inner.allocate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;

    #[test]
    fn test_handles_are_distinct_and_valid() {
        let mock = MockNative::new();
        let ctx = mock.client_init(c"org.example.test", 0);
        let mut a = RawHandle::INVALID;
        let mut b = RawHandle::INVALID;
        assert_eq!(mock.get_interface(ctx, c"/a", &mut a), RETURN_SUCCESS);
        assert_eq!(mock.get_interface(ctx, c"/b", &mut b), RETURN_SUCCESS);

        assert!(ctx.is_valid() && a.is_valid() && b.is_valid());
        assert_ne!(a, b);
        assert_ne!(ctx, a);
    }

    #[test]
    fn test_registration_survives_free_until_shutdown() {
        let mock = MockNative::new();
        let ctx = mock.client_init(c"org.example.test", 0);
        let mut iface = RawHandle::INVALID;
        mock.get_interface(ctx, c"/a", &mut iface);

        unsafe extern "C" fn ignore(_: *mut c_void, _: *const TimeValue, _: *const c_void) {}
        let code = unsafe { mock.register_callback(iface, Category::Button, ignore, std::ptr::null_mut()) };
        assert_eq!(code, RETURN_SUCCESS);

        mock.free_interface(iface);
        assert_eq!(mock.registrations(), 1);
        mock.client_shutdown(ctx);
        assert_eq!(mock.registrations(), 0);
    }

    #[test]
    fn test_state_size_mismatch_fails() {
        let mock = MockNative::new();
        let ctx = mock.client_init(c"org.example.test", 0);
        let mut iface = RawHandle::INVALID;
        mock.get_interface(ctx, c"/a", &mut iface);
        mock.set_state::<kinds::Analog>("/a", TimeValue::new(1, 0), 0.25);

        let mut ts = TimeValue::default();
        let mut small = 0u8;
        let code = unsafe {
            mock.get_state(iface, Category::Analog, &mut ts, &mut small as *mut u8 as *mut c_void, 1)
        };
        assert_eq!(code, RETURN_FAILURE);

        let mut value = 0f64;
        let code = unsafe {
            mock.get_state(iface, Category::Analog, &mut ts, &mut value as *mut f64 as *mut c_void, 8)
        };
        assert_eq!(code, RETURN_SUCCESS);
        assert_eq!(value, 0.25);
        assert_eq!(ts, TimeValue::new(1, 0));
    }

    #[test]
    fn test_joint_options_are_consumed_by_init() {
        let mock = MockNative::new();
        let options = mock.joint_create_options();
        assert_eq!(mock.joint_apply_option(options, &JointOption::AutoloadPlugins), RETURN_SUCCESS);

        let ctx = mock.joint_client_init(c"org.example.test", options);
        assert!(ctx.is_valid());
        assert_eq!(mock.joint_apply_option(options, &JointOption::AutoloadPlugins), RETURN_FAILURE);
        assert_eq!(mock.joint_free_options(options), RETURN_FAILURE);
    }

    #[test]
    fn test_string_parameter_needs_room_for_nul() {
        let mock = MockNative::new();
        mock.set_string_parameter("/display", "abc");
        let ctx = mock.client_init(c"org.example.test", 0);

        let mut len = 0;
        mock.get_string_parameter_length(ctx, c"/display", &mut len);
        assert_eq!(len, 4);

        let mut short = [0u8; 3];
        assert_eq!(mock.get_string_parameter(ctx, c"/display", &mut short), RETURN_FAILURE);
        let mut buf = [0xffu8; 4];
        assert_eq!(mock.get_string_parameter(ctx, c"/display", &mut buf), RETURN_SUCCESS);
        assert_eq!(&buf, b"abc\0");
    }
}
