use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::COMPLETION_THREAD_NAME;
use crate::constants::DISPATCH_THREAD_NAME;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_thread_name")]
    pub thread_name: String,

    /// Compute the "more work follows" hint while scanning the pending queue
    #[serde(default = "default_batch_hints")]
    pub batch_hints: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            thread_name: default_dispatch_thread_name(),
            batch_hints: default_batch_hints(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        validate_thread_name("dispatch.thread_name", &self.thread_name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_thread_name")]
    pub thread_name: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            thread_name: default_completion_thread_name(),
        }
    }
}

impl CompletionConfig {
    pub fn validate(&self) -> Result<()> {
        validate_thread_name("completion.thread_name", &self.thread_name)
    }
}

fn validate_thread_name(
    field: &str,
    name: &str,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!("{} cannot be empty", field))));
    }
    if name.contains('\0') {
        return Err(Error::Config(ConfigError::Message(format!(
            "{} cannot contain NUL bytes",
            field
        ))));
    }
    Ok(())
}

fn default_dispatch_thread_name() -> String {
    DISPATCH_THREAD_NAME.to_string()
}
fn default_completion_thread_name() -> String {
    COMPLETION_THREAD_NAME.to_string()
}
fn default_batch_hints() -> bool {
    true
}
