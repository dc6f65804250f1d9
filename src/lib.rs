//! Replay Throttle - per-operation rate limiting for API clients
//!
//! This crate keeps the outbound calls of a replay-statistics API client inside
//! the service's quota. Every operation kind gets its own limiter enforcing a
//! burst spacing and a rolling-window call budget, and callers are suspended
//! rather than rejected until their call is safe to make.

pub mod config;
pub mod error;
pub mod ratelimit;
