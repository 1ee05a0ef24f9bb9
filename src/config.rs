use crate::error::{Error, Result};

pub const DEFAULT_MAX_SLOTS: usize = 16;
pub const DEFAULT_MAX_OPEN: usize = 16;
pub const DEFAULT_WRITER_MEMORY_MB: usize = 50;

const MB: usize = 1024 * 1024;

pub const ENV_MAX_SLOTS: &str = "SLOTDEX_MAX_SLOTS";
pub const ENV_MAX_OPEN: &str = "SLOTDEX_MAX_OPEN";
pub const ENV_WRITER_MEMORY_MB: &str = "SLOTDEX_WRITER_MEMORY_MB";
pub const ENV_HANDLE_BASE: &str = "SLOTDEX_HANDLE_BASE";

/// Limits for one host session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Highest slot number accepted by `open`.
    pub max_slots: usize,
    /// How many indexes may stay open before least recently used ones are
    /// closed.
    pub max_open: usize,
    /// Memory budget for each index writer, in MB.
    pub writer_memory_mb: usize,
    /// Offset added to writer handle numbers. Derived from the process id
    /// when unset.
    pub handle_base: Option<u32>,
}

/// Values given explicitly, e.g. on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_slots: Option<usize>,
    pub max_open: Option<usize>,
    pub writer_memory_mb: Option<usize>,
    pub handle_base: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
            max_open: DEFAULT_MAX_OPEN,
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            handle_base: None,
        }
    }
}

impl Config {
    /// Resolve each setting from, in order of priority:
    /// 1. An explicit override
    /// 2. The matching SLOTDEX_* environment variable
    /// 3. The built-in default
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_slots: pick(
                overrides.max_slots,
                &env,
                ENV_MAX_SLOTS,
                defaults.max_slots,
            )?,
            max_open: pick(
                overrides.max_open,
                &env,
                ENV_MAX_OPEN,
                defaults.max_open,
            )?,
            writer_memory_mb: pick(
                overrides.writer_memory_mb,
                &env,
                ENV_WRITER_MEMORY_MB,
                defaults.writer_memory_mb,
            )?,
            handle_base: match overrides.handle_base {
                Some(base) => Some(base),
                None => parse_env(&env, ENV_HANDLE_BASE)?,
            },
        };
        if config.writer_memory_mb.checked_mul(MB).is_none() {
            return Err(Error::Config(format!(
                "writer memory of {} MB is too large",
                config.writer_memory_mb
            )));
        }
        Ok(config)
    }

    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    pub fn with_max_open(mut self, max_open: usize) -> Self {
        self.max_open = max_open;
        self
    }

    pub fn with_handle_base(mut self, base: u32) -> Self {
        self.handle_base = Some(base);
        self
    }

    pub fn writer_memory_bytes(&self) -> usize {
        self.writer_memory_mb.saturating_mul(MB)
    }

    /// The handle base actually used: the configured one, or the low 16
    /// bits of the process id.
    pub fn effective_handle_base(&self) -> u32 {
        self.handle_base
            .unwrap_or_else(|| std::process::id() & 0xffff)
    }
}

fn pick<T: std::str::FromStr>(
    explicit: Option<T>,
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    if let Some(value) = explicit {
        return Ok(value);
    }
    Ok(parse_env(env, key)?.unwrap_or(default))
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match env(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::Config(format!("{key} has an invalid value: {raw:?}"))
        }),
    }
}
