//! # osvr-clientkit - Rust client for the OSVR ClientKit tracking library
//!
//! Safe, handle-owning layer over the native C API. Provides:
//! - A client [`Context`] that owns the session and every resource acquired
//!   through it, released exactly once and in order
//! - Typed interfaces per report category with lazy callback registration
//!   and direct state queries
//! - Push (subscriber callbacks) and pull ([`ReportStream`]) consumption
//! - Adapters that convert reports of one interface into another type
//! - Joint clients that host the server in-process ([`JointClientOptions`])
//!
//! ## Quick Start
//! ```no_run
//! use osvr_clientkit::{kinds, Context, ReportSource};
//! use std::sync::Arc;
//!
//! let native = Arc::new(osvr_clientkit::mock::MockNative::new());
//! let ctx = Context::with_native(native, "org.example.tracker", 0).unwrap();
//!
//! let head = ctx.interface::<kinds::Pose>("/me/head").unwrap();
//! head.subscribe(|report| println!("head: {:?}", report.value.translation))
//!     .unwrap();
//!
//! loop {
//!     ctx.update().unwrap();
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! ```
//!
//! With the `clientkit` feature, [`Context::init`] binds the real library
//! instead.

pub mod error;
pub mod types;
pub mod native;
pub mod handle;
pub mod config;
pub mod kinds;
pub mod event;
pub mod stream;
pub mod context;
pub mod interface;
pub mod display;
pub mod typed;
pub mod adapter;
pub mod joint;
pub mod mock;
#[cfg(feature = "clientkit")]
pub mod sys;

pub use adapter::InterfaceAdapter;
pub use config::ClientConfig;
pub use context::Context;
pub use display::DisplayConfig;
pub use error::ClientError;
pub use event::{Handler, InterfaceState, ReportEvent, ReportSource, SubscriptionId};
pub use handle::Disposable;
pub use interface::InterfaceHandle;
pub use joint::JointClientOptions;
pub use kinds::{Access, ReportKind};
pub use stream::ReportStream;
pub use typed::*;
pub use types::*;

/// Result type alias for ClientKit operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Lock a mutex, recovering the data if a subscriber panicked while holding it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
