//! Config Resolver
//!
//! Settings cascade through four layers, later layers overriding earlier ones
//! key by key:
//!
//! ```text
//! built-in defaults -> root ddmq.yaml -> queue ddmq.yaml -> per-call overrides
//! ```
//!
//! A key missing from a layer falls through to the layer below. Unknown keys
//! are ignored. Only a present value of the wrong type or out of range is an
//! error.

use serde_yaml::{Mapping, Value};

use crate::queue::error::{QueueError, QueueResult};

pub const DEFAULT_MESSAGE_TIMEOUT: u64 = 600;
pub const DEFAULT_PRIORITY: u32 = 999;
pub const DEFAULT_REQUEUE_PRIO: u32 = 0;
pub const DEFAULT_CLEAN_INTERVAL: u64 = 60;

pub const KEY_MESSAGE_TIMEOUT: &str = "message_timeout";
pub const KEY_DEFAULT_PRIORITY: &str = "default_priority";
pub const KEY_PRIORITY_ALIAS: &str = "priority";
pub const KEY_REQUEUE: &str = "requeue";
pub const KEY_REQUEUE_PRIO: &str = "requeue_prio";
pub const KEY_REQUEUE_LIMIT: &str = "requeue_limit";
pub const KEY_CLEAN_INTERVAL: &str = "clean_interval";
pub const KEY_CLEANED: &str = "cleaned";

/// One layer of the cascade. Every key is optional.
///
/// `requeue_limit` is doubly optional: `None` means the layer does not
/// mention it, `Some(None)` means the layer explicitly asks for no limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub message_timeout: Option<u64>,
    pub default_priority: Option<u32>,
    pub requeue: Option<bool>,
    pub requeue_prio: Option<u32>,
    pub requeue_limit: Option<Option<u32>>,
    pub clean_interval: Option<u64>,
    /// Epoch seconds of the last clean pass (bookkeeping, not part of the cascade)
    pub cleaned: Option<i64>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_timeout(mut self, seconds: u64) -> Self {
        self.message_timeout = Some(seconds);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.default_priority = Some(priority);
        self
    }

    pub fn with_requeue(mut self, requeue: bool) -> Self {
        self.requeue = Some(requeue);
        self
    }

    pub fn with_requeue_prio(mut self, priority: u32) -> Self {
        self.requeue_prio = Some(priority);
        self
    }

    pub fn with_requeue_limit(mut self, limit: Option<u32>) -> Self {
        self.requeue_limit = Some(limit);
        self
    }

    pub fn with_clean_interval(mut self, seconds: u64) -> Self {
        self.clean_interval = Some(seconds);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse a settings document. An empty document is an empty layer.
    pub fn from_yaml_str(text: &str) -> QueueResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| QueueError::config(format!("invalid settings document: {}", e)))?;
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(map) => Self::from_mapping(&map),
            other => Err(QueueError::config(format!(
                "settings must be a key/value mapping, found {}",
                describe(&other)
            ))),
        }
    }

    /// Extract the known keys from a YAML mapping, ignoring everything else
    pub fn from_mapping(map: &Mapping) -> QueueResult<Self> {
        let mut settings = Settings {
            message_timeout: non_negative(map, KEY_MESSAGE_TIMEOUT)?,
            default_priority: match non_negative_u32(map, KEY_DEFAULT_PRIORITY)? {
                Some(priority) => Some(priority),
                None => non_negative_u32(map, KEY_PRIORITY_ALIAS)?,
            },
            requeue: None,
            requeue_prio: non_negative_u32(map, KEY_REQUEUE_PRIO)?,
            requeue_limit: None,
            clean_interval: non_negative(map, KEY_CLEAN_INTERVAL)?,
            cleaned: match present(map, KEY_CLEANED) {
                Some(v) => Some(v.as_i64().ok_or_else(|| type_error(KEY_CLEANED, "an integer", v))?),
                None => None,
            },
        };

        match present(map, KEY_REQUEUE) {
            Some(Value::Bool(flag)) => settings.requeue = Some(*flag),
            // Older deployments stored the requeue priority in `requeue` itself
            Some(v @ Value::Number(_)) => {
                let prio = v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| type_error(KEY_REQUEUE, "a boolean or a non-negative integer", v))?;
                settings.requeue = Some(true);
                settings.requeue_prio.get_or_insert(prio);
            }
            Some(v) => return Err(type_error(KEY_REQUEUE, "a boolean", v)),
            None => {}
        }

        if let Some(value) = map.get(KEY_REQUEUE_LIMIT) {
            settings.requeue_limit = Some(match value {
                Value::Null => None,
                v => Some(
                    v.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| type_error(KEY_REQUEUE_LIMIT, "a non-negative integer or null", v))?,
                ),
            });
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Range checks that typed construction cannot rule out
    pub fn validate(&self) -> QueueResult<()> {
        if self.message_timeout == Some(0) {
            return Err(QueueError::config(format!(
                "{} must be greater than 0 seconds",
                KEY_MESSAGE_TIMEOUT
            )));
        }
        Ok(())
    }

    /// Overlay `other` on top of `self`, key by key
    pub fn merge(&self, other: &Settings) -> Settings {
        Settings {
            message_timeout: other.message_timeout.or(self.message_timeout),
            default_priority: other.default_priority.or(self.default_priority),
            requeue: other.requeue.or(self.requeue),
            requeue_prio: other.requeue_prio.or(self.requeue_prio),
            requeue_limit: other.requeue_limit.or(self.requeue_limit),
            clean_interval: other.clean_interval.or(self.clean_interval),
            cleaned: other.cleaned.or(self.cleaned),
        }
    }

    /// The keys this layer sets, as YAML entries ready to merge into a settings file
    pub fn to_mapping(&self) -> Mapping {
        let mut map = Mapping::new();
        if let Some(v) = self.message_timeout {
            map.insert(KEY_MESSAGE_TIMEOUT.into(), v.into());
        }
        if let Some(v) = self.default_priority {
            map.insert(KEY_DEFAULT_PRIORITY.into(), v.into());
        }
        if let Some(v) = self.requeue {
            map.insert(KEY_REQUEUE.into(), v.into());
        }
        if let Some(v) = self.requeue_prio {
            map.insert(KEY_REQUEUE_PRIO.into(), v.into());
        }
        if let Some(limit) = self.requeue_limit {
            let value = limit.map_or(Value::Null, Value::from);
            map.insert(KEY_REQUEUE_LIMIT.into(), value);
        }
        if let Some(v) = self.clean_interval {
            map.insert(KEY_CLEAN_INTERVAL.into(), v.into());
        }
        if let Some(v) = self.cleaned {
            map.insert(KEY_CLEANED.into(), v.into());
        }
        map
    }
}

/// Fully resolved parameters for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub message_timeout: u64,
    pub default_priority: u32,
    pub requeue: bool,
    pub requeue_prio: u32,
    pub requeue_limit: Option<u32>,
    pub clean_interval: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            default_priority: DEFAULT_PRIORITY,
            requeue: false,
            requeue_prio: DEFAULT_REQUEUE_PRIO,
            requeue_limit: None,
            clean_interval: DEFAULT_CLEAN_INTERVAL,
        }
    }
}

impl EffectiveConfig {
    /// Apply one layer on top of an already resolved configuration
    pub fn overlay(&self, layer: &Settings) -> EffectiveConfig {
        EffectiveConfig {
            message_timeout: layer.message_timeout.unwrap_or(self.message_timeout),
            default_priority: layer.default_priority.unwrap_or(self.default_priority),
            requeue: layer.requeue.unwrap_or(self.requeue),
            requeue_prio: layer.requeue_prio.unwrap_or(self.requeue_prio),
            requeue_limit: layer.requeue_limit.unwrap_or(self.requeue_limit),
            clean_interval: layer.clean_interval.unwrap_or(self.clean_interval),
        }
    }
}

/// Resolve the effective configuration from the four layers. Pure.
pub fn resolve(
    defaults: &EffectiveConfig,
    root: &Settings,
    queue: &Settings,
    overrides: &Settings,
) -> QueueResult<EffectiveConfig> {
    for layer in [root, queue, overrides] {
        layer.validate()?;
    }
    Ok(defaults.overlay(&root.merge(queue).merge(overrides)))
}

fn present<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn non_negative(map: &Mapping, key: &str) -> QueueResult<Option<u64>> {
    match present(map, key) {
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| type_error(key, "a non-negative integer", v)),
        None => Ok(None),
    }
}

fn non_negative_u32(map: &Mapping, key: &str) -> QueueResult<Option<u32>> {
    match present(map, key) {
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| type_error(key, "a non-negative integer", v)),
        None => Ok(None),
    }
}

fn type_error(key: &str, expected: &str, found: &Value) -> QueueError {
    QueueError::config(format!("{} must be {}, found {}", key, expected, describe(found)))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(_) => "a tagged value".to_string(),
    }
}
