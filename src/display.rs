use crate::handle::NativeHandle;
use crate::native::RETURN_SUCCESS;
use crate::{ClientError, Result};
use std::sync::Arc;

/// Display configuration: viewer, eye and surface topology of the
/// connected display.
///
/// Scoped to the [`crate::Context`] it came from, which disposes it at the
/// latest when the context itself is disposed.
#[derive(Debug)]
pub struct DisplayConfig {
    handle: Arc<NativeHandle>,
}

impl DisplayConfig {
    pub(crate) fn new(handle: Arc<NativeHandle>) -> Self {
        Self { handle }
    }

    /// Checks whether the display is fully configured and has received its
    /// first pose. Once true it stays true for the lifetime of this object.
    pub fn check_startup(&self) -> Result<bool> {
        self.handle
            .with_live(|api, raw| api.check_display_startup(raw) == RETURN_SUCCESS)
            .ok_or(ClientError::UseAfterDispose("DisplayConfig"))
    }

    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    pub fn dispose(&self) {
        self.handle.release();
    }
}

impl Drop for DisplayConfig {
    fn drop(&mut self) {
        self.dispose();
    }
}
