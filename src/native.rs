//! The boundary to the native ClientKit library.
//!
//! Everything above this module talks to the library through [`NativeApi`],
//! which mirrors the C entry points one to one. The real library is bound in
//! `sys` (feature `clientkit`); [`crate::mock::MockNative`] stands in for it
//! in tests and headless runs.

use crate::types::TimeValue;
use std::ffi::{c_void, CStr};

/// Native status byte. The library has no richer error channel.
pub type ReturnCode = u8;

pub const RETURN_SUCCESS: ReturnCode = 0;
pub const RETURN_FAILURE: ReturnCode = 1;

/// Opaque handle value as returned by the native library.
///
/// Zero and all-ones are the library's invalid sentinels.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const INVALID: RawHandle = RawHandle(0);

    pub const fn from_raw(value: usize) -> Self {
        Self(value)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != usize::MAX
    }
}

/// Callback signature shared by every `osvrRegister*Callback` entry point.
///
/// `report` points at a `#[repr(C)] { sensor: i32, payload }` struct whose
/// payload layout depends on the category the callback was registered for.
pub type RawCallback =
    unsafe extern "C" fn(userdata: *mut c_void, timestamp: *const TimeValue, report: *const c_void);

/// Report categories the native library can register callbacks and answer
/// state queries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Position,
    Orientation,
    Pose,
    Button,
    Analog,
    Location2D,
    Direction,
    EyeTracker2D,
    EyeTracker3D,
    EyeTrackerBlink,
    NaviVelocity,
    NaviPosition,
}

impl Category {
    /// Name of the native registration entry point, for error reporting.
    pub const fn register_call(self) -> &'static str {
        match self {
            Category::Position => "osvrRegisterPositionCallback",
            Category::Orientation => "osvrRegisterOrientationCallback",
            Category::Pose => "osvrRegisterPoseCallback",
            Category::Button => "osvrRegisterButtonCallback",
            Category::Analog => "osvrRegisterAnalogCallback",
            Category::Location2D => "osvrRegisterLocation2DCallback",
            Category::Direction => "osvrRegisterDirectionCallback",
            Category::EyeTracker2D => "osvrRegisterEyeTracker2DCallback",
            Category::EyeTracker3D => "osvrRegisterEyeTracker3DCallback",
            Category::EyeTrackerBlink => "osvrRegisterEyeTrackerBlinkCallback",
            Category::NaviVelocity => "osvrRegisterNaviVelocityCallback",
            Category::NaviPosition => "osvrRegisterNaviPositionCallback",
        }
    }

    /// Name of the native state accessor, for error reporting.
    pub const fn state_call(self) -> &'static str {
        match self {
            Category::Position => "osvrGetPositionState",
            Category::Orientation => "osvrGetOrientationState",
            Category::Pose => "osvrGetPoseState",
            Category::Button => "osvrGetButtonState",
            Category::Analog => "osvrGetAnalogState",
            Category::Location2D => "osvrGetLocation2DState",
            Category::Direction => "osvrGetDirectionState",
            Category::EyeTracker2D => "osvrGetEyeTracker2DState",
            Category::EyeTracker3D => "osvrGetEyeTracker3DState",
            Category::EyeTrackerBlink => "osvrGetEyeTrackerBlinkState",
            Category::NaviVelocity => "osvrGetNaviVelocityState",
            Category::NaviPosition => "osvrGetNaviPositionState",
        }
    }
}

/// One configuration step applied to joint client options before init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointOption<'a> {
    AutoloadPlugins,
    LoadPlugin {
        plugin: &'a CStr,
    },
    InstantiateDriver {
        plugin: &'a CStr,
        driver: &'a CStr,
        params: Option<&'a CStr>,
    },
    AddAlias {
        path: &'a CStr,
        source: &'a CStr,
    },
    /// A JSON alias document.
    AddAliases {
        aliases: &'a CStr,
    },
    AddString {
        path: &'a CStr,
        value: &'a CStr,
    },
    TriggerHardwareDetect,
}

impl JointOption<'_> {
    /// Name of the native entry point, for error reporting.
    pub const fn call(&self) -> &'static str {
        match self {
            JointOption::AutoloadPlugins => "osvrJointClientOptionsAutoloadPlugins",
            JointOption::LoadPlugin { .. } => "osvrJointClientOptionsLoadPlugin",
            JointOption::InstantiateDriver { .. } => "osvrJointClientOptionsInstantiateDriver",
            JointOption::AddAlias { .. } => "osvrJointClientOptionsAddAlias",
            JointOption::AddAliases { .. } => "osvrJointClientOptionsAddAliases",
            JointOption::AddString { .. } => "osvrJointClientOptionsAddString",
            JointOption::TriggerHardwareDetect => "osvrJointClientOptionsTriggerHardwareDetect",
        }
    }
}

/// The native library's C API, one method per entry point.
///
/// Implementations must not panic; failures are reported through the
/// returned [`ReturnCode`].
pub trait NativeApi: Send + Sync {
    fn client_init(&self, application_id: &CStr, flags: u32) -> RawHandle;

    fn client_update(&self, ctx: RawHandle) -> ReturnCode;

    fn client_shutdown(&self, ctx: RawHandle) -> ReturnCode;

    /// Length of a string parameter including its trailing NUL, 0 if unset.
    fn get_string_parameter_length(&self, ctx: RawHandle, path: &CStr, len: &mut usize)
        -> ReturnCode;

    fn get_string_parameter(&self, ctx: RawHandle, path: &CStr, buf: &mut [u8]) -> ReturnCode;

    fn get_interface(&self, ctx: RawHandle, path: &CStr, iface: &mut RawHandle) -> ReturnCode;

    fn free_interface(&self, iface: RawHandle) -> ReturnCode;

    /// Register `callback` for reports of `category` on `iface`.
    ///
    /// # Safety
    /// `userdata` must stay valid for `callback` until the owning context has
    /// been shut down. There is no unregister call.
    unsafe fn register_callback(
        &self,
        iface: RawHandle,
        category: Category,
        callback: RawCallback,
        userdata: *mut c_void,
    ) -> ReturnCode;

    /// Read the current state of `iface` into `state`.
    ///
    /// # Safety
    /// `state` must be valid for writes of `state_size` bytes and laid out as
    /// the payload type of `category`.
    unsafe fn get_state(
        &self,
        iface: RawHandle,
        category: Category,
        timestamp: &mut TimeValue,
        state: *mut c_void,
        state_size: usize,
    ) -> ReturnCode;

    fn get_display(&self, ctx: RawHandle, display: &mut RawHandle) -> ReturnCode;

    fn free_display(&self, display: RawHandle) -> ReturnCode;

    fn check_display_startup(&self, display: RawHandle) -> ReturnCode;

    /// Create options for a joint client, which hosts the server in-process.
    /// Backends without the joint library return the invalid handle.
    fn joint_create_options(&self) -> RawHandle {
        RawHandle::INVALID
    }

    fn joint_apply_option(&self, _options: RawHandle, _option: &JointOption<'_>) -> ReturnCode {
        RETURN_FAILURE
    }

    /// Discard options that were never consumed by `joint_client_init`.
    fn joint_free_options(&self, _options: RawHandle) -> ReturnCode {
        RETURN_FAILURE
    }

    /// Start a joint client. Consumes `options`, which may be
    /// [`RawHandle::INVALID`] for the library defaults.
    fn joint_client_init(&self, _application_id: &CStr, _options: RawHandle) -> RawHandle {
        RawHandle::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_handle_sentinels() {
        assert!(!RawHandle::INVALID.is_valid());
        assert!(!RawHandle::from_raw(usize::MAX).is_valid());
        assert!(RawHandle::from_raw(0x1000).is_valid());
    }

    #[test]
    fn test_joint_option_call_names() {
        let option = JointOption::InstantiateDriver {
            plugin: c"com_osvr_Vuzix",
            driver: c"Vuzix",
            params: None,
        };
        assert_eq!(option.call(), "osvrJointClientOptionsInstantiateDriver");
        assert_eq!(
            JointOption::TriggerHardwareDetect.call(),
            "osvrJointClientOptionsTriggerHardwareDetect"
        );
    }

    #[test]
    fn test_raw_handle_pointer_roundtrip() {
        let handle = RawHandle::from_raw(0xdead_0000);
        assert_eq!(RawHandle::from_ptr(handle.as_ptr()), handle);
    }
}
