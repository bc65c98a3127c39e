//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Throttles the chat route with tower_governor. The monitor serves a
//! single local user, so one global bucket is shared by every caller.

use crate::config::ServerConfig;
use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::GlobalKeyExtractor;

/// Governor config with X-RateLimit-* headers enabled
pub type ChatGovernorConfig =
    tower_governor::governor::GovernorConfig<GlobalKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Max requests that can be made immediately
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 2,
            burst_size: 5,
        }
    }
}

impl From<&ServerConfig> for RateLimitConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            per_second: server.chat_per_second,
            burst_size: server.chat_burst,
        }
    }
}

/// Build the governor config; `None` when either limit is zero
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<ChatGovernorConfig>> {
    GovernorConfigBuilder::default()
        .key_extractor(GlobalKeyExtractor)
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_server_config() {
        let config = RateLimitConfig::from(&ServerConfig::default());
        assert_eq!(config.per_second, 2);
        assert_eq!(config.burst_size, 5);
        assert!(create_governor_config(&config).is_some());
    }

    #[test]
    fn test_zero_burst_disables_limiter() {
        let config = RateLimitConfig {
            per_second: 2,
            burst_size: 0,
        };
        assert!(create_governor_config(&config).is_none());
    }
}
