//! Per-category dispatch table.
//!
//! A [`ReportKind`] ties one native report category to its payload layout
//! and to the Rust types handed to subscribers and state readers.
//! [`crate::TypedInterface`] is generic over it, so adding a category is a
//! table entry rather than a new interface type.

use crate::native::Category;
use crate::types::{
    ButtonState, EyeTracker3DState, Pose3, Quaternion, RawEyeTracker3D, Vec2, Vec3,
};

bitflags::bitflags! {
    /// How a report category can be consumed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        /// Reports are pushed through a registered callback.
        const PUSH = 1 << 0;
        /// Current state can be read synchronously.
        const POLL = 1 << 1;
    }
}

/// Layout of every native report: the sensor index followed by the payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NativeReport<P> {
    pub sensor: i32,
    pub payload: P,
}

/// One entry of the dispatch table.
///
/// # Safety
/// `Payload` must have exactly the layout the native library uses for
/// `CATEGORY`, both as the report payload and as the state out-parameter.
/// Trampolines reinterpret native memory as `NativeReport<Self::Payload>`.
pub unsafe trait ReportKind: 'static {
    type Payload: Copy + Default + 'static;
    type Report: Clone + Send + Sync + 'static;
    type State: Send + 'static;

    const CATEGORY: Category;
    const ACCESS: Access;

    fn report(payload: &Self::Payload) -> Self::Report;

    fn state(payload: Self::Payload) -> Self::State;
}

macro_rules! report_kinds {
    ($(
        $(#[$meta:meta])*
        $name:ident: $category:ident, $payload:ty => $value:ty, $convert:expr;
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name;

            unsafe impl ReportKind for $name {
                type Payload = $payload;
                type Report = $value;
                type State = $value;

                const CATEGORY: Category = Category::$category;
                const ACCESS: Access = Access::all();

                fn report(payload: &$payload) -> $value {
                    ($convert)(*payload)
                }

                fn state(payload: $payload) -> $value {
                    ($convert)(payload)
                }
            }
        )*
    };
}

report_kinds! {
    /// Position sensor, meters.
    Position: Position, Vec3 => Vec3, std::convert::identity;
    /// Orientation sensor.
    Orientation: Orientation, Quaternion => Quaternion, std::convert::identity;
    /// Combined position and orientation sensor.
    Pose: Pose, Pose3 => Pose3, std::convert::identity;
    /// Physical button or a simulated one driven by a gesture.
    Button: Button, u8 => ButtonState, ButtonState::from;
    /// Analog input such as a trigger or one joystick axis.
    Analog: Analog, f64 => f64, std::convert::identity;
    /// Point on a 2D plane, normalized.
    Location2D: Location2D, Vec2 => Vec2, std::convert::identity;
    /// Unit direction vector.
    Direction: Direction, Vec3 => Vec3, std::convert::identity;
    /// Gaze intersection with a 2D plane.
    EyeTracker2D: EyeTracker2D, Vec2 => Vec2, std::convert::identity;
    /// Gaze ray in 3D.
    EyeTracker3D: EyeTracker3D, RawEyeTracker3D => EyeTracker3DState, EyeTracker3DState::from;
    /// Blink detection; true while the eye is closed.
    EyeTrackerBlink: EyeTrackerBlink, u8 => bool, |raw: u8| raw != 0;
    /// Locomotion velocity on the ground plane.
    NaviVelocity: NaviVelocity, Vec2 => Vec2, std::convert::identity;
    /// Locomotion position on the ground plane.
    NaviPosition: NaviPosition, Vec2 => Vec2, std::convert::identity;
}
