//! Configuration Module - Bridge Tuning Parameters
//!
//! Manages the parameters of the pressure monitor and the deferred queue.
//! The defaults reproduce the behavior hosts have been tuned against.

/// Main configuration for the bridge
///
/// # Examples
///
/// ```rust
/// use fhb::BridgeConfig;
///
/// // Use default configuration
/// let config = BridgeConfig::default();
///
/// // Collect more eagerly
/// let config = BridgeConfig {
///     initial_threshold_bytes: 64 * 1024,
///     full_collection_interval: 4,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Foreign resident bytes that trigger the first collection
    ///
    /// A collection fires only when the reading is strictly greater.
    ///
    /// Default: 1,000,000
    pub initial_threshold_bytes: usize,

    /// Partial collections between two full collections
    ///
    /// The monitor counts triggered partial collections; the firing that
    /// finds the counter at this value is full and resets it to 0.
    ///
    /// Default: 10
    pub full_collection_interval: u32,

    /// Threshold multiplier applied to the post-collection reading
    ///
    /// Default: 2
    pub threshold_multiplier: usize,

    /// Initial capacity of the deferred ring queue
    ///
    /// The queue doubles when full.
    /// Default: 100
    pub deferred_initial_capacity: usize,

    /// Emit structured bridge events
    ///
    /// Default: false
    pub verbose: bool,

    /// Collect bridge statistics
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            initial_threshold_bytes: 1_000_000,
            full_collection_interval: 10,
            threshold_multiplier: 2,
            deferred_initial_capacity: 100,
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fhb::BridgeConfig;
    ///
    /// let config = BridgeConfig {
    ///     threshold_multiplier: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_threshold_bytes == 0 {
            return Err(ConfigError::InvalidThreshold(
                "initial_threshold_bytes must be > 0".to_string(),
            ));
        }

        if self.threshold_multiplier == 0 {
            return Err(ConfigError::InvalidMultiplier(
                "threshold_multiplier must be > 0".to_string(),
            ));
        }

        if self.deferred_initial_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "deferred_initial_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - FHB_INITIAL_THRESHOLD
    /// - FHB_FULL_INTERVAL
    /// - FHB_THRESHOLD_MULTIPLIER
    /// - FHB_DEFERRED_CAPACITY
    /// - FHB_VERBOSE
    ///
    /// Unparseable values are ignored.
    ///
    /// ```bash
    /// export FHB_INITIAL_THRESHOLD=4000000
    /// export FHB_VERBOSE=1
    /// ```
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(bytes) = lookup("FHB_INITIAL_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.initial_threshold_bytes = bytes;
        }

        if let Some(interval) = lookup("FHB_FULL_INTERVAL").and_then(|v| v.parse().ok()) {
            config.full_collection_interval = interval;
        }

        if let Some(mult) = lookup("FHB_THRESHOLD_MULTIPLIER").and_then(|v| v.parse().ok()) {
            config.threshold_multiplier = mult;
        }

        if let Some(cap) = lookup("FHB_DEFERRED_CAPACITY").and_then(|v| v.parse().ok()) {
            config.deferred_initial_capacity = cap;
        }

        if let Some(val) = lookup("FHB_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid threshold multiplier: {0}")]
    InvalidMultiplier(String),

    #[error("Invalid deferred queue capacity: {0}")]
    InvalidCapacity(String),
}
