//! Per-client registry routing each operation to its limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use super::clock::{Clock, TokioClock};
use super::limiter::{RateLimit, StartOptions};
use super::operation::Operation;
use super::tier::TierConfig;
use crate::config::RateLimitingConfig;
use crate::error::{Result, ThrottleError};

/// Owns one [`RateLimit`] per operation of a tier.
///
/// The registry is built once per client and is the single entry point every
/// outbound call goes through. The operation map is never modified after
/// construction, so the registry can be shared freely behind an `Arc`.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    enabled: bool,
    limiters: HashMap<Operation, RateLimit>,
}

impl RateLimiterRegistry {
    /// Create a registry on the tokio clock.
    pub fn new(tier: &TierConfig, enabled: bool, safe_start: bool) -> Result<Self> {
        let options = StartOptions {
            safe_start,
            ..StartOptions::default()
        };
        Self::with_clock(tier, enabled, options, Arc::new(TokioClock))
    }

    /// Create a registry whose limiters all share `clock`.
    ///
    /// When `enabled` is false no limiters are built and every acquire
    /// returns immediately.
    pub fn with_clock(
        tier: &TierConfig,
        enabled: bool,
        options: StartOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if !enabled {
            info!("Rate limiting disabled");
            return Ok(Self::disabled());
        }

        let limiters = tier
            .iter()
            .map(|(operation, constraint)| {
                RateLimit::with_clock(operation, *constraint, options, clock.clone())
                    .map(|limiter| (operation, limiter))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        info!(
            operations = limiters.len(),
            safe_start = options.safe_start,
            initial_burst_allowance = options.initial_burst_allowance,
            "Rate limiter registry initialized"
        );

        Ok(Self {
            enabled: true,
            limiters,
        })
    }

    /// Create a registry from loaded settings.
    ///
    /// A custom tier file takes precedence over the named tier.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        let tier = match &config.tier_file {
            Some(path) => TierConfig::from_file(path)?,
            None => config.tier.config(),
        };

        info!(
            tier = %config.tier,
            custom = config.tier_file.is_some(),
            "Building rate limiter registry"
        );

        let options = StartOptions {
            safe_start: config.safe_start,
            initial_burst_allowance: config.initial_burst_allowance,
        };
        Self::with_clock(&tier, config.enabled, options, Arc::new(TokioClock))
    }

    /// A registry that never delays.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            limiters: HashMap::new(),
        }
    }

    /// Wait until `operation` may be called.
    ///
    /// Returns the delay that was applied.
    pub async fn acquire(&self, operation: Operation) -> Result<Duration> {
        match self.limiter_for(operation)? {
            Some(limiter) => Ok(limiter.acquire().await),
            None => Ok(Duration::ZERO),
        }
    }

    /// Wait until the operation named `name` may be called.
    pub async fn acquire_named(&self, name: &str) -> Result<Duration> {
        if !self.enabled {
            return Ok(Duration::ZERO);
        }
        let operation: Operation = name.parse()?;
        self.acquire(operation).await
    }

    /// Wait until `operation` may be called, giving up when `cancel` fires.
    pub async fn acquire_with_cancel(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        match self.limiter_for(operation)? {
            Some(limiter) => limiter.acquire_with_cancel(cancel).await,
            None => Ok(Duration::ZERO),
        }
    }

    /// Whether calls are being limited at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the limiter for an operation.
    pub fn limiter(&self, operation: Operation) -> Option<&RateLimit> {
        self.limiters.get(&operation)
    }

    /// The operations this registry limits, in API order.
    pub fn operations(&self) -> Vec<Operation> {
        let mut operations: Vec<_> = self.limiters.keys().copied().collect();
        operations.sort();
        operations
    }

    /// Get the number of limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// `None` means the registry is disabled.
    fn limiter_for(&self, operation: Operation) -> Result<Option<&RateLimit>> {
        if !self.enabled {
            return Ok(None);
        }

        trace!(operation = %operation, "Routing call through rate limiter");
        self.limiters
            .get(&operation)
            .map(Some)
            .ok_or_else(|| ThrottleError::UnknownOperation(operation.to_string()))
    }
}
