//! Options for a joint client, which starts an OSVR server inside the
//! client process instead of connecting to a running one.
//!
//! Every option only queues an action; the server performs them in order
//! when [`crate::Context::with_joint_options`] starts it, and a failure in
//! any of them surfaces as a failed init.

use crate::context::c_string;
use crate::error::check;
use crate::handle::{HandleKind, NativeHandle, Session};
use crate::native::{JointOption, NativeApi, RawHandle};
use crate::{ClientError, Result};
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

/// Queued server setup for a joint client.
///
/// Consumed by [`crate::Context::with_joint_options`]. Options dropped
/// without starting a client are released.
pub struct JointClientOptions {
    handle: NativeHandle,
}

impl JointClientOptions {
    /// Create empty options in the linked joint client library.
    #[cfg(feature = "jointclient")]
    pub fn create() -> Result<Self> {
        Self::new(Arc::new(crate::sys::ClientKitLibrary::new()))
    }

    /// Create empty options against an explicit native backend.
    pub fn new(native: Arc<dyn NativeApi>) -> Result<Self> {
        let session = Session::new(native);
        let raw = session.call(|api| api.joint_create_options());
        let handle = NativeHandle::acquire(session, raw, HandleKind::JointOptions)
            .ok_or(ClientError::NativeCall("osvrJointClientCreateOptions"))?;
        Ok(Self { handle })
    }

    /// Load every plugin marked for autoloading. At most once per options
    /// object.
    pub fn autoload_plugins(&self) -> Result<()> {
        self.apply(JointOption::AutoloadPlugins)
    }

    pub fn load_plugin(&self, plugin: &str) -> Result<()> {
        let plugin = c_string(plugin, "plugin name")?;
        self.apply(JointOption::LoadPlugin { plugin: &plugin })
    }

    /// Instantiate `driver` from `plugin`, with optional JSON parameters.
    pub fn instantiate_driver(&self, plugin: &str, driver: &str, params: Option<&str>) -> Result<()> {
        let plugin = c_string(plugin, "plugin name")?;
        let driver = c_string(driver, "driver name")?;
        let params = params
            .map(|p| {
                CString::new(p).map_err(|_| {
                    ClientError::InvalidArgument("driver parameters contain a NUL byte".to_string())
                })
            })
            .transpose()?;
        self.apply(JointOption::InstantiateDriver {
            plugin: &plugin,
            driver: &driver,
            params: params.as_deref(),
        })
    }

    /// Alias `path` to `source` in the path tree.
    pub fn add_alias(&self, path: &str, source: &str) -> Result<()> {
        let path = c_string(path, "alias path")?;
        let source = c_string(source, "alias source")?;
        self.apply(JointOption::AddAlias {
            path: &path,
            source: &source,
        })
    }

    /// Add every alias in a JSON alias document.
    pub fn add_aliases(&self, aliases: &str) -> Result<()> {
        let aliases = c_string(aliases, "alias document")?;
        self.apply(JointOption::AddAliases { aliases: &aliases })
    }

    /// Store a string element such as `/display` in the path tree.
    pub fn add_string(&self, path: &str, value: &str) -> Result<()> {
        let path = c_string(path, "string path")?;
        let value = CString::new(value)
            .map_err(|_| ClientError::InvalidArgument("string value contains a NUL byte".to_string()))?;
        self.apply(JointOption::AddString {
            path: &path,
            value: &value,
        })
    }

    pub fn trigger_hardware_detect(&self) -> Result<()> {
        self.apply(JointOption::TriggerHardwareDetect)
    }

    fn apply(&self, option: JointOption<'_>) -> Result<()> {
        let code = self
            .handle
            .with_live(|api, raw| api.joint_apply_option(raw, &option))
            .ok_or(ClientError::UseAfterDispose("JointClientOptions"))?;
        check(code, option.call())?;
        log::debug!("Queued joint client option {}", option.call());
        Ok(())
    }

    /// Hand the options to an init call. They are never released afterwards:
    /// init takes ownership whether it succeeds or not.
    pub(crate) fn consume(self) -> (Arc<Session>, RawHandle) {
        let session = Arc::clone(self.handle.session());
        let raw = self.handle.disown().unwrap_or(RawHandle::INVALID);
        (session, raw)
    }
}

impl fmt::Debug for JointClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JointClientOptions")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockNative};
    use crate::{ClientConfig, Context};

    fn options(mock: &Arc<MockNative>) -> JointClientOptions {
        JointClientOptions::new(mock.clone()).unwrap()
    }

    fn queued(mock: &MockNative) -> Vec<&'static str> {
        mock.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::JointOption(_, call) => Some(call),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_options_queue_in_order() {
        let mock = Arc::new(MockNative::new());
        let opts = options(&mock);
        opts.add_string("/display", "displays/OSVR_HDK_1_1.json").unwrap();
        opts.instantiate_driver("com_osvr_Vuzix", "Vuzix", None).unwrap();
        opts.add_alias("/me/head", "/com_osvr_Vuzix/Vuzix/tracker/0").unwrap();
        opts.autoload_plugins().unwrap();
        opts.trigger_hardware_detect().unwrap();

        assert_eq!(
            queued(&mock),
            vec![
                "osvrJointClientOptionsAddString",
                "osvrJointClientOptionsInstantiateDriver",
                "osvrJointClientOptionsAddAlias",
                "osvrJointClientOptionsAutoloadPlugins",
                "osvrJointClientOptionsTriggerHardwareDetect",
            ]
        );
    }

    #[test]
    fn test_option_failure_names_the_call() {
        let mock = Arc::new(MockNative::new());
        let opts = options(&mock);
        mock.fail_next_option();
        assert!(matches!(
            opts.load_plugin("com_osvr_example_EyeTracker"),
            Err(ClientError::NativeCall("osvrJointClientOptionsLoadPlugin"))
        ));
        assert!(opts.load_plugin("com_osvr_example_EyeTracker").is_ok());
    }

    #[test]
    fn test_bad_arguments_never_reach_native() {
        let mock = Arc::new(MockNative::new());
        let opts = options(&mock);
        assert!(matches!(opts.load_plugin(""), Err(ClientError::InvalidArgument(_))));
        assert!(matches!(
            opts.instantiate_driver("plugin", "driver", Some("{\0}")),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(queued(&mock).is_empty());
    }

    #[test]
    fn test_unconsumed_options_are_freed_once() {
        let mock = Arc::new(MockNative::new());
        drop(options(&mock));
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointFreeOptions(_))), 1);
    }

    #[test]
    fn test_init_consumes_options() {
        let mock = Arc::new(MockNative::new());
        let opts = options(&mock);
        opts.autoload_plugins().unwrap();

        let ctx = Context::with_joint_options(opts, ClientConfig::new("org.example.joint")).unwrap();
        ctx.update().unwrap();
        drop(ctx);

        let inits: Vec<MockCall> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::JointInit(..)))
            .collect();
        assert_eq!(inits.len(), 1);
        assert!(matches!(&inits[0], MockCall::JointInit(app, raw) if app == "org.example.joint" && raw.is_valid()));
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointFreeOptions(_))), 0);
        assert_eq!(mock.count(|c| matches!(c, MockCall::Shutdown(_))), 1);
    }

    #[test]
    fn test_failed_init_still_consumes_options() {
        let mock = Arc::new(MockNative::new());
        mock.fail_init();
        let opts = options(&mock);

        assert!(Context::with_joint_options(opts, ClientConfig::new("org.example.joint")).is_err());
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointInit(..))), 1);
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointFreeOptions(_))), 0);
    }

    #[test]
    fn test_rejected_identifier_leaves_options_owned() {
        let mock = Arc::new(MockNative::new());
        let opts = options(&mock);

        assert!(matches!(
            Context::with_joint_options(opts, ClientConfig::new("")),
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointInit(..))), 0);
        assert_eq!(mock.count(|c| matches!(c, MockCall::JointFreeOptions(_))), 1);
    }

    #[test]
    fn test_default_joint_client_passes_no_options() {
        let mock = Arc::new(MockNative::new());
        let ctx = Context::with_joint_defaults(mock.clone(), ClientConfig::new("org.example.joint")).unwrap();
        assert!(!ctx.is_disposed());
        assert_eq!(
            mock.calls()[0],
            MockCall::JointInit("org.example.joint".to_string(), RawHandle::INVALID)
        );
    }
}
