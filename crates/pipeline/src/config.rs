// SPDX-License-Identifier: Apache-2.0

//! System configuration for the streaming engine.
//!
//! These values tune flow control, not semantics. The defaults are sized so
//! a single pipeline stays cache-friendly while absorbing the rate
//! mismatches seen between network transports and storage backends; they
//! can be overridden per pipeline but there is rarely a reason to.

/// Hard limit on the number of chunks an elastic buffer will queue.
///
/// Exceeding the limit is an internal error: upstream stages are expected
/// to respect `is_ready` long before the queue fills.
pub const ELASTIC_QUEUE_LIMIT: usize = 1024;

/// Margin kept between the readiness threshold and the hard limit.
///
/// The buffer stops advertising readiness once it holds
/// `ELASTIC_QUEUE_LIMIT - ELASTIC_SAFETY_MARGIN` chunks, leaving the margin
/// to absorb chunks already in flight from a bursty producer.
pub const ELASTIC_SAFETY_MARGIN: usize = 512;

/// Number of chunks a reactive source keeps on request from its publisher.
pub const REACTIVE_WINDOW: usize = 256;

/// Configuration for an elastic buffer stage.
#[derive(Clone, Debug)]
pub struct ElasticBufferConfig {
    /// Hard queue limit; `on_next` beyond this is an internal error.
    pub queue_limit: usize,
    /// Margin between the readiness threshold and the hard limit.
    pub safety_margin: usize,
}

impl Default for ElasticBufferConfig {
    fn default() -> Self {
        ElasticBufferConfig {
            queue_limit: ELASTIC_QUEUE_LIMIT,
            safety_margin: ELASTIC_SAFETY_MARGIN,
        }
    }
}

impl ElasticBufferConfig {
    /// The queue length at which the buffer stops advertising readiness.
    #[must_use]
    pub fn ready_threshold(&self) -> usize {
        self.queue_limit.saturating_sub(self.safety_margin)
    }
}

/// Configuration for a reactive source adapter.
#[derive(Clone, Debug)]
pub struct ReactiveSourceConfig {
    /// The request window kept open toward the external publisher.
    pub window: usize,
}

impl Default for ReactiveSourceConfig {
    fn default() -> Self {
        ReactiveSourceConfig {
            window: REACTIVE_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_the_platform_contract() {
        let config = ElasticBufferConfig::default();
        assert_eq!(config.queue_limit, 1024);
        assert_eq!(config.ready_threshold(), 512);
        assert_eq!(ReactiveSourceConfig::default().window, 256);
    }
}
