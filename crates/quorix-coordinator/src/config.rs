//! Runtime configuration.

use url::Url;

/// Largest group the relay accepts.
pub const MAX_PARTIES: u16 = 10;

/// Configuration for one coordinator instance.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Base URL of the relay's HTTP surface.
    pub relay_url: Url,
    /// Base URL of the relay's socket surface.
    pub ws_url: Url,
}

impl CoordinatorConfig {
    /// Configuration against a relay's HTTP and socket bases.
    pub fn new(relay_url: Url, ws_url: Url) -> Self {
        Self { relay_url, ws_url }
    }
}

/// Check keygen parameters: `2 <= t <= n <= MAX_PARTIES`.
pub fn validate_parameters(t: u16, n: u16) -> crate::Result<()> {
    if t < 2 {
        return Err(crate::CoordinatorError::Config(format!(
            "threshold {t} below minimum 2"
        )));
    }
    if t > n {
        return Err(crate::CoordinatorError::Config(format!(
            "threshold {t} exceeds {n} parties"
        )));
    }
    if n > MAX_PARTIES {
        return Err(crate::CoordinatorError::Config(format!(
            "{n} parties exceeds maximum {MAX_PARTIES}"
        )));
    }
    Ok(())
}
