//! Raw bindings to the native `osvrClientKit` library.
//!
//! Link search path: set `OSVR_CLIENTKIT_LIB_DIR` at build time if the library
//! is not installed system-wide. The `jointclient` feature also links
//! `osvrJointClientKit`.

#[cfg(feature = "jointclient")]
use crate::native::JointOption;
use crate::native::{Category, NativeApi, RawCallback, RawHandle, ReturnCode};
use crate::types::TimeValue;
use std::ffi::{c_char, c_void, CStr};

type ClientContext = *mut c_void;
type ClientInterface = *mut c_void;
type DisplayConfigHandle = *mut c_void;

#[link(name = "osvrClientKit")]
extern "C" {
    fn osvrClientInit(application_identifier: *const c_char, flags: u32) -> ClientContext;
    fn osvrClientUpdate(ctx: ClientContext) -> ReturnCode;
    fn osvrClientShutdown(ctx: ClientContext) -> ReturnCode;

    fn osvrClientGetStringParameterLength(ctx: ClientContext, path: *const c_char, len: *mut usize) -> ReturnCode;
    fn osvrClientGetStringParameter(ctx: ClientContext, path: *const c_char, buf: *mut c_char, len: usize) -> ReturnCode;

    fn osvrClientGetInterface(ctx: ClientContext, path: *const c_char, iface: *mut ClientInterface) -> ReturnCode;
    fn osvrClientFreeInterface(ctx: ClientContext, iface: ClientInterface) -> ReturnCode;

    fn osvrClientGetDisplay(ctx: ClientContext, disp: *mut DisplayConfigHandle) -> ReturnCode;
    fn osvrClientFreeDisplay(disp: DisplayConfigHandle) -> ReturnCode;
    fn osvrClientCheckDisplayStartup(disp: DisplayConfigHandle) -> ReturnCode;
}

#[cfg(feature = "jointclient")]
type JointClientOpts = *mut c_void;

#[cfg(feature = "jointclient")]
#[link(name = "osvrJointClientKit")]
extern "C" {
    fn osvrJointClientCreateOptions() -> JointClientOpts;
    fn osvrJointClientOptionsAutoloadPlugins(opts: JointClientOpts) -> ReturnCode;
    fn osvrJointClientOptionsLoadPlugin(opts: JointClientOpts, plugin: *const c_char) -> ReturnCode;
    fn osvrJointClientOptionsInstantiateDriver(
        opts: JointClientOpts,
        plugin: *const c_char,
        driver: *const c_char,
        params: *const c_char,
    ) -> ReturnCode;
    fn osvrJointClientOptionsAddAlias(opts: JointClientOpts, path: *const c_char, source: *const c_char) -> ReturnCode;
    fn osvrJointClientOptionsAddAliases(opts: JointClientOpts, aliases: *const c_char) -> ReturnCode;
    fn osvrJointClientOptionsAddString(opts: JointClientOpts, path: *const c_char, s: *const c_char) -> ReturnCode;
    fn osvrJointClientOptionsTriggerHardwareDetect(opts: JointClientOpts) -> ReturnCode;
    fn osvrJointClientInit(application_identifier: *const c_char, opts: JointClientOpts) -> ClientContext;
}

macro_rules! category_bindings {
    ($($category:ident => $register:ident, $get:ident;)*) => {
        #[link(name = "osvrClientKit")]
        extern "C" {
            $(
                fn $register(iface: ClientInterface, cb: RawCallback, userdata: *mut c_void) -> ReturnCode;
                fn $get(iface: ClientInterface, timestamp: *mut TimeValue, state: *mut c_void) -> ReturnCode;
            )*
        }

        unsafe fn register_for(
            iface: ClientInterface,
            category: Category,
            cb: RawCallback,
            userdata: *mut c_void,
        ) -> ReturnCode {
            match category {
                $(Category::$category => unsafe { $register(iface, cb, userdata) },)*
            }
        }

        unsafe fn get_for(
            iface: ClientInterface,
            category: Category,
            timestamp: *mut TimeValue,
            state: *mut c_void,
        ) -> ReturnCode {
            match category {
                $(Category::$category => unsafe { $get(iface, timestamp, state) },)*
            }
        }
    };
}

category_bindings! {
    Position => osvrRegisterPositionCallback, osvrGetPositionState;
    Orientation => osvrRegisterOrientationCallback, osvrGetOrientationState;
    Pose => osvrRegisterPoseCallback, osvrGetPoseState;
    Button => osvrRegisterButtonCallback, osvrGetButtonState;
    Analog => osvrRegisterAnalogCallback, osvrGetAnalogState;
    Location2D => osvrRegisterLocation2DCallback, osvrGetLocation2DState;
    Direction => osvrRegisterDirectionCallback, osvrGetDirectionState;
    EyeTracker2D => osvrRegisterEyeTracker2DCallback, osvrGetEyeTracker2DState;
    EyeTracker3D => osvrRegisterEyeTracker3DCallback, osvrGetEyeTracker3DState;
    EyeTrackerBlink => osvrRegisterEyeTrackerBlinkCallback, osvrGetEyeTrackerBlinkState;
    NaviVelocity => osvrRegisterNaviVelocityCallback, osvrGetNaviVelocityState;
    NaviPosition => osvrRegisterNaviPositionCallback, osvrGetNaviPositionState;
}

/// The linked native library.
///
/// `osvrClientFreeInterface` needs the owning context, which the handle
/// alone does not carry, so the library remembers it per interface.
#[derive(Debug, Default)]
pub struct ClientKitLibrary {
    owners: std::sync::Mutex<std::collections::HashMap<RawHandle, RawHandle>>,
}

impl ClientKitLibrary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NativeApi for ClientKitLibrary {
    fn client_init(&self, application_id: &CStr, flags: u32) -> RawHandle {
        RawHandle::from_ptr(unsafe { osvrClientInit(application_id.as_ptr(), flags) })
    }

    fn client_update(&self, ctx: RawHandle) -> ReturnCode {
        unsafe { osvrClientUpdate(ctx.as_ptr()) }
    }

    fn client_shutdown(&self, ctx: RawHandle) -> ReturnCode {
        crate::lock(&self.owners).retain(|_, owner| *owner != ctx);
        unsafe { osvrClientShutdown(ctx.as_ptr()) }
    }

    fn get_string_parameter_length(&self, ctx: RawHandle, path: &CStr, len: &mut usize) -> ReturnCode {
        unsafe { osvrClientGetStringParameterLength(ctx.as_ptr(), path.as_ptr(), len) }
    }

    fn get_string_parameter(&self, ctx: RawHandle, path: &CStr, buf: &mut [u8]) -> ReturnCode {
        unsafe {
            osvrClientGetStringParameter(ctx.as_ptr(), path.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
        }
    }

    fn get_interface(&self, ctx: RawHandle, path: &CStr, iface: &mut RawHandle) -> ReturnCode {
        let mut raw: ClientInterface = std::ptr::null_mut();
        let code = unsafe { osvrClientGetInterface(ctx.as_ptr(), path.as_ptr(), &mut raw) };
        *iface = RawHandle::from_ptr(raw);
        if iface.is_valid() {
            crate::lock(&self.owners).insert(*iface, ctx);
        }
        code
    }

    fn free_interface(&self, iface: RawHandle) -> ReturnCode {
        let owner = crate::lock(&self.owners).remove(&iface).unwrap_or(RawHandle::INVALID);
        unsafe { osvrClientFreeInterface(owner.as_ptr(), iface.as_ptr()) }
    }

    unsafe fn register_callback(
        &self,
        iface: RawHandle,
        category: Category,
        callback: RawCallback,
        userdata: *mut c_void,
    ) -> ReturnCode {
        unsafe { register_for(iface.as_ptr(), category, callback, userdata) }
    }

    unsafe fn get_state(
        &self,
        iface: RawHandle,
        category: Category,
        timestamp: &mut TimeValue,
        state: *mut c_void,
        _state_size: usize,
    ) -> ReturnCode {
        unsafe { get_for(iface.as_ptr(), category, timestamp, state) }
    }

    fn get_display(&self, ctx: RawHandle, display: &mut RawHandle) -> ReturnCode {
        let mut raw: DisplayConfigHandle = std::ptr::null_mut();
        let code = unsafe { osvrClientGetDisplay(ctx.as_ptr(), &mut raw) };
        *display = RawHandle::from_ptr(raw);
        code
    }

    fn free_display(&self, display: RawHandle) -> ReturnCode {
        unsafe { osvrClientFreeDisplay(display.as_ptr()) }
    }

    fn check_display_startup(&self, display: RawHandle) -> ReturnCode {
        unsafe { osvrClientCheckDisplayStartup(display.as_ptr()) }
    }

    #[cfg(feature = "jointclient")]
    fn joint_create_options(&self) -> RawHandle {
        RawHandle::from_ptr(unsafe { osvrJointClientCreateOptions() })
    }

    #[cfg(feature = "jointclient")]
    fn joint_apply_option(&self, options: RawHandle, option: &JointOption<'_>) -> ReturnCode {
        let opts = options.as_ptr();
        unsafe {
            match *option {
                JointOption::AutoloadPlugins => osvrJointClientOptionsAutoloadPlugins(opts),
                JointOption::LoadPlugin { plugin } => osvrJointClientOptionsLoadPlugin(opts, plugin.as_ptr()),
                JointOption::InstantiateDriver { plugin, driver, params } => osvrJointClientOptionsInstantiateDriver(
                    opts,
                    plugin.as_ptr(),
                    driver.as_ptr(),
                    params.map_or(std::ptr::null(), CStr::as_ptr),
                ),
                JointOption::AddAlias { path, source } => {
                    osvrJointClientOptionsAddAlias(opts, path.as_ptr(), source.as_ptr())
                }
                JointOption::AddAliases { aliases } => osvrJointClientOptionsAddAliases(opts, aliases.as_ptr()),
                JointOption::AddString { path, value } => {
                    osvrJointClientOptionsAddString(opts, path.as_ptr(), value.as_ptr())
                }
                JointOption::TriggerHardwareDetect => osvrJointClientOptionsTriggerHardwareDetect(opts),
            }
        }
    }

    /// The joint library has no destroy call for options; they leak unless
    /// consumed by init.
    #[cfg(feature = "jointclient")]
    fn joint_free_options(&self, options: RawHandle) -> ReturnCode {
        log::debug!("Leaking unconsumed joint client options {:#x}", options.as_raw());
        crate::native::RETURN_SUCCESS
    }

    #[cfg(feature = "jointclient")]
    fn joint_client_init(&self, application_id: &CStr, options: RawHandle) -> RawHandle {
        RawHandle::from_ptr(unsafe { osvrJointClientInit(application_id.as_ptr(), options.as_ptr()) })
    }
}
