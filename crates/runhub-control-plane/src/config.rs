//! Control plane configuration.

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the in-process dispatch queue.
    pub dispatch_capacity: usize,

    /// Page size used when a list request asks for size 0.
    pub default_page_size: usize,

    /// Upper bound applied to requested page sizes.
    pub max_page_size: usize,

    /// Treat a kind without a registered validator as a configuration error.
    pub require_validator: bool,

    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch_capacity: 256,
            default_page_size: 20,
            max_page_size: 100,
            require_validator: false,
            log_level: "info".to_string(),
        }
    }
}
