/// Timestamp attached to every report and state query.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeValue {
    /// Seconds since the native library's epoch.
    pub seconds: i64,
    /// Microseconds within the second.
    pub microseconds: i32,
}

impl TimeValue {
    pub const fn new(seconds: i64, microseconds: i32) -> Self {
        Self {
            seconds,
            microseconds,
        }
    }

    /// Total microseconds, for ordering and deltas.
    pub fn as_micros(&self) -> i64 {
        self.seconds * 1_000_000 + i64::from(self.microseconds)
    }
}

/// Two-component vector, used by 2D locations, eye trackers and locomotion.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

/// Three-component vector in meters for positions, unit length for directions.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Unit quaternion, stored w-first as the native library lays it out.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

/// Position plus orientation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose3 {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

/// Native eye tracker 3D payload. The validity fields are C booleans.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawEyeTracker3D {
    pub direction_valid: u8,
    pub direction: Vec3,
    pub base_point_valid: u8,
    pub base_point: Vec3,
}

/// Gaze ray of one eye. Either part may be missing when the tracker lost it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeTracker3DState {
    pub direction: Option<Vec3>,
    pub base_point: Option<Vec3>,
}

impl From<RawEyeTracker3D> for EyeTracker3DState {
    fn from(raw: RawEyeTracker3D) -> Self {
        Self {
            direction: (raw.direction_valid != 0).then_some(raw.direction),
            base_point: (raw.base_point_valid != 0).then_some(raw.base_point),
        }
    }
}

/// Button position as reported by the native layer (0 released, 1 pressed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ButtonState {
    #[default]
    Released,
    Pressed,
}

impl From<u8> for ButtonState {
    fn from(raw: u8) -> Self {
        if raw == 0 {
            ButtonState::Released
        } else {
            ButtonState::Pressed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_value_micros() {
        let t = TimeValue::new(2, 500);
        assert_eq!(t.as_micros(), 2_000_500);
        assert!(TimeValue::new(1, 999_999) < t);
    }

    #[test]
    fn test_eye_tracker_validity() {
        let raw = RawEyeTracker3D {
            direction_valid: 1,
            direction: Vec3 {
                x: 0.0,
                y: 0.0,
                z: -1.0,
            },
            base_point_valid: 0,
            base_point: Vec3::default(),
        };
        let state = EyeTracker3DState::from(raw);
        assert_eq!(state.direction.map(|d| d.z), Some(-1.0));
        assert!(state.base_point.is_none());
    }

    #[test]
    fn test_button_state_from_raw() {
        assert_eq!(ButtonState::from(0), ButtonState::Released);
        assert_eq!(ButtonState::from(1), ButtonState::Pressed);
    }
}
