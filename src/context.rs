use crate::config::ClientConfig;
use crate::display::DisplayConfig;
use crate::error::check;
use crate::handle::{Disposable, HandleKind, NativeHandle, Session};
use crate::interface::InterfaceHandle;
use crate::joint::JointClientOptions;
use crate::kinds::ReportKind;
use crate::native::{NativeApi, RawHandle, RETURN_SUCCESS};
use crate::typed::TypedInterface;
use crate::{ClientError, Result};
use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// State shared between a [`Context`] and the resources it hands out.
///
/// Resources only keep a `Weak` to it; the `Context` is the sole owner.
pub(crate) struct ContextShared {
    handle: NativeHandle,
    config: ClientConfig,
    /// Child registry. `None` once drained by `dispose`.
    children: Mutex<Option<Vec<Arc<dyn Disposable>>>>,
    /// Number of `update` calls currently pumping.
    updating: AtomicUsize,
    /// Children drained while an update was pumping. Native callbacks
    /// already collected by that update may still point at them.
    parked: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl ContextShared {
    pub(crate) fn is_disposed(&self) -> bool {
        crate::lock(&self.children).is_none()
    }

    pub(crate) fn register_child(&self, child: Arc<dyn Disposable>) -> Result<()> {
        match crate::lock(&self.children).as_mut() {
            Some(children) => {
                children.push(child);
                Ok(())
            }
            None => Err(ClientError::UseAfterDispose("Context")),
        }
    }

    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        crate::lock(&self.children).as_ref().map_or(0, Vec::len)
    }

    /// Run `f` on the live session handle, holding the session lock.
    fn with_session<R>(&self, f: impl FnOnce(&dyn NativeApi, RawHandle) -> R) -> Result<R> {
        self.handle
            .with_live(|api, raw| (!self.is_disposed()).then(|| f(api, raw)))
            .flatten()
            .ok_or(ClientError::UseAfterDispose("Context"))
    }

    /// Run `f` with the session lock held for its whole duration.
    fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        self.handle.session().call(|_| f())
    }

    fn dispose(&self) {
        self.exclusive(|| {
            let Some(children) = crate::lock(&self.children).take() else {
                return;
            };

            log::debug!(
                "Disposing context '{}' with {} children",
                self.config.application_id,
                children.len()
            );
            for child in &children {
                child.dispose();
            }
            self.handle.release();

            // Trampoline userdata lives in `children`; only free it once the
            // session is shut down and no update can still deliver to it.
            if self.updating.load(Ordering::Acquire) > 0 {
                crate::lock(&self.parked).extend(children);
            } else {
                drop(children);
            }
        });
    }
}

/// Tracks one running `update`; frees parked children when the last one
/// returns.
struct Pumping<'a>(&'a ContextShared);

impl<'a> Pumping<'a> {
    fn enter(shared: &'a ContextShared) -> Self {
        shared.updating.fetch_add(1, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for Pumping<'_> {
    fn drop(&mut self) {
        if self.0.updating.fetch_sub(1, Ordering::AcqRel) == 1 {
            let parked = std::mem::take(&mut *crate::lock(&self.0.parked));
            drop(parked);
        }
    }
}

/// Client context: create one per application and call [`Context::update`]
/// from the main loop.
///
/// Owns the native session and every resource acquired through it. Disposing
/// the context (explicitly or by dropping it) disposes those resources in
/// acquisition order, then shuts the session down. Resources still held by
/// the application afterwards report [`ClientError::UseAfterDispose`].
///
/// A `Context` may be shared between threads. Native calls made through it
/// and its resources are serialized, since the library is not thread-safe
/// per context.
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Initialize the native ClientKit library.
    #[cfg(feature = "clientkit")]
    pub fn init(application_id: &str, flags: u32) -> Result<Context> {
        Self::with_native(Arc::new(crate::sys::ClientKitLibrary::new()), application_id, flags)
    }

    /// Initialize against an explicit native backend.
    pub fn with_native(
        native: Arc<dyn NativeApi>,
        application_id: &str,
        flags: u32,
    ) -> Result<Context> {
        Self::with_config(native, ClientConfig::new(application_id).with_flags(flags))
    }

    pub fn with_config(native: Arc<dyn NativeApi>, config: ClientConfig) -> Result<Context> {
        let flags = config.flags;
        Self::open(Session::new(native), config, |api, app_id| {
            api.client_init(app_id, flags)
        })
    }

    /// Start a joint client, hosting the server in this process, configured
    /// by `options`. The options are consumed even if init fails.
    pub fn with_joint_options(options: JointClientOptions, config: ClientConfig) -> Result<Context> {
        c_string(&config.application_id, "application identifier")?;
        let (session, raw_options) = options.consume();
        Self::open(session, config, |api, app_id| {
            api.joint_client_init(app_id, raw_options)
        })
    }

    /// Start a joint client with the library's default server setup.
    pub fn with_joint_defaults(native: Arc<dyn NativeApi>, config: ClientConfig) -> Result<Context> {
        Self::open(Session::new(native), config, |api, app_id| {
            api.joint_client_init(app_id, RawHandle::INVALID)
        })
    }

    fn open(
        session: Arc<Session>,
        config: ClientConfig,
        init: impl FnOnce(&dyn NativeApi, &CStr) -> RawHandle,
    ) -> Result<Context> {
        let app_id = c_string(&config.application_id, "application identifier")?;

        let raw = session.call(|api| init(api, &app_id));
        let handle = NativeHandle::acquire(session, raw, HandleKind::Context).ok_or_else(|| {
            ClientError::InvalidArgument(format!(
                "client init rejected application identifier '{}'",
                config.application_id
            ))
        })?;

        log::info!(
            "Opened ClientKit context '{}' (flags={:#x})",
            config.application_id,
            config.flags
        );

        Ok(Context {
            shared: Arc::new(ContextShared {
                handle,
                config,
                children: Mutex::new(Some(Vec::new())),
                updating: AtomicUsize::new(0),
                parked: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn application_id(&self) -> &str {
        &self.shared.config.application_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Pump the native library once. Registered callbacks run on this
    /// thread before it returns, and may dispose this context.
    ///
    /// A failed update is not retried; the caller decides whether to
    /// continue.
    pub fn update(&self) -> Result<()> {
        let _pumping = Pumping::enter(&self.shared);
        let code = self.shared.with_session(|api, raw| api.client_update(raw))?;
        if code == RETURN_SUCCESS {
            Ok(())
        } else {
            log::debug!("Context update reported failure");
            Err(ClientError::Update)
        }
    }

    /// Resolve a resource path such as `/me/head` to an interface handle.
    ///
    /// The handle is registered with this context, so it is released no
    /// later than the context itself.
    pub fn resolve_path(&self, path: &str) -> Result<InterfaceHandle> {
        let c_path = c_string(path, "interface path")?;

        let handle = self.shared.exclusive(|| {
            let raw = self
                .shared
                .with_session(|api, ctx| {
                    let mut raw = RawHandle::INVALID;
                    (api.get_interface(ctx, &c_path, &mut raw) == RETURN_SUCCESS).then_some(raw)
                })?
                .ok_or_else(|| ClientError::InvalidPath(path.to_string()))?;

            let handle = NativeHandle::acquire(self.shared.handle.session().clone(), raw, HandleKind::Interface)
                .map(Arc::new)
                .ok_or_else(|| ClientError::InvalidPath(path.to_string()))?;
            self.shared.register_child(handle.clone())?;
            Ok::<_, ClientError>(handle)
        })?;
        log::debug!("Resolved interface {}", path);

        Ok(InterfaceHandle::new(
            handle,
            Arc::downgrade(&self.shared),
            path.to_string(),
            self.shared.config.stream_capacity,
        ))
    }

    /// Resolve `path` and wrap it as a typed interface of kind `K`.
    pub fn interface<K: ReportKind>(&self, path: &str) -> Result<TypedInterface<K>> {
        self.resolve_path(path).map(TypedInterface::new)
    }

    /// Register any resource that must be disposed with this context.
    ///
    /// Children are disposed in registration order before the session is
    /// shut down.
    pub fn register_child(&self, child: Arc<dyn Disposable>) -> Result<()> {
        self.shared.register_child(child)
    }

    /// Acquire the display configuration.
    pub fn display_config(&self) -> Result<DisplayConfig> {
        let handle = self.shared.exclusive(|| {
            let (code, raw) = self.shared.with_session(|api, ctx| {
                let mut raw = RawHandle::INVALID;
                (api.get_display(ctx, &mut raw), raw)
            })?;
            check(code, "osvrClientGetDisplay")?;

            let handle = NativeHandle::acquire(self.shared.handle.session().clone(), raw, HandleKind::Display)
                .map(Arc::new)
                .ok_or(ClientError::NativeCall("osvrClientGetDisplay"))?;
            self.shared.register_child(handle.clone())?;
            Ok::<_, ClientError>(handle)
        })?;

        Ok(DisplayConfig::new(handle))
    }

    /// Read a string parameter such as `/display`. Unset parameters read as
    /// the empty string.
    pub fn string_parameter(&self, path: &str) -> Result<String> {
        let c_path = c_string(path, "parameter path")?;

        self.shared.with_session(|api, ctx| {
            let mut len = 0usize;
            check(
                api.get_string_parameter_length(ctx, &c_path, &mut len),
                "osvrClientGetStringParameterLength",
            )?;
            if len == 0 {
                return Ok(String::new());
            }

            let mut buf = vec![0u8; len];
            check(
                api.get_string_parameter(ctx, &c_path, &mut buf),
                "osvrClientGetStringParameter",
            )?;

            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
        })?
    }

    /// Dispose every registered child in order, then shut the session down.
    /// Later calls do nothing.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

pub(crate) fn c_string(value: &str, what: &str) -> Result<CString> {
    if value.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} is empty", what)));
    }
    CString::new(value)
        .map_err(|_| ClientError::InvalidArgument(format!("{} contains a NUL byte", what)))
}
