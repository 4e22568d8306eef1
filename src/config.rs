/// Default bound of a [`crate::ReportStream`] channel.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

pub const ENV_APPLICATION_ID: &str = "OSVR_APPLICATION_ID";
pub const ENV_CLIENT_FLAGS: &str = "OSVR_CLIENT_FLAGS";
pub const ENV_STREAM_CAPACITY: &str = "OSVR_STREAM_CAPACITY";

/// Settings used to create a [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Application identifier handed to the native library.
    /// Reverse DNS format is strongly suggested.
    pub application_id: String,
    /// Initialization flags. Reserved by the native library; pass 0.
    pub flags: u32,
    /// Bound of the channel behind each report stream.
    pub stream_capacity: usize,
}

impl ClientConfig {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            flags: 0,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    /// Build a config from `OSVR_APPLICATION_ID`, `OSVR_CLIENT_FLAGS` and
    /// `OSVR_STREAM_CAPACITY`, falling back to `application_id` and the
    /// defaults for anything unset or malformed.
    pub fn from_env(application_id: &str) -> Self {
        Self::from_lookup(application_id, |name| std::env::var(name).ok())
    }

    fn from_lookup(application_id: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let application_id = lookup(ENV_APPLICATION_ID)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| application_id.to_string());

        let flags = read_parsed(&lookup, ENV_CLIENT_FLAGS, parse_u32).unwrap_or(0);
        let stream_capacity = read_parsed(&lookup, ENV_STREAM_CAPACITY, |v| {
            v.parse::<usize>().ok().filter(|&c| c > 0)
        })
        .unwrap_or(DEFAULT_STREAM_CAPACITY);

        Self {
            application_id,
            flags,
            stream_capacity,
        }
    }
}

fn read_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let value = parse(raw.trim());
    if value.is_none() {
        log::warn!("Ignoring malformed {}='{}'", name, raw);
    }
    value
}

fn parse_u32(v: &str) -> Option<u32> {
    match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => v.parse::<u32>().ok(),
    }
}
