use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("stage name must not be empty")]
    EmptyName,
    #[error("channel count must be at least 1")]
    NoChannels,
    #[error("queue size must be at least 1")]
    NoQueue,
}

/// Construction parameters of one stage instance, in command order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub name: String,
    pub num_channels: usize,
    pub queue_size: usize,
    pub blocking_callbacks: bool,
    pub source_port: String,
    pub source_addr: i32,
    pub max_buffers: Option<usize>,       // None = unlimited
    pub max_memory: Option<usize>,        // bytes, None = unlimited
    pub priority: i32,                    // hint only, std threads cannot set it
    pub stack_size: usize,                // 0 = platform default
    pub max_threads: usize,               // 0 is treated as 1
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: "MASK1".to_string(),
            num_channels: 1,
            queue_size: 16,
            blocking_callbacks: false,
            source_port: String::new(),
            source_addr: 0,
            max_buffers: None,
            max_memory: None,
            priority: 0,
            stack_size: 0,
            max_threads: 1,
        }
    }
}

impl StageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.num_channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.queue_size == 0 {
            return Err(ConfigError::NoQueue);
        }
        Ok(())
    }

    /// Command-line style limit: zero or negative means unlimited.
    pub fn limit(raw: i64) -> Option<usize> {
        usize::try_from(raw).ok().filter(|&v| v > 0)
    }
}
