//! Ratetree - Hierarchical Rate Limiting
//!
//! This crate decides whether a request may proceed by evaluating it against
//! a tree of resources, each optionally carrying one or more rates. Every
//! rate is enforced by a bandwidth (fixed window, bursty or warming-up token
//! bucket) kept per resource and request key, so a method-level quota and
//! the quota of its enclosing group apply together.
//!
//! ```no_run
//! use ratetree::bandwidth::BandwidthFactory;
//! use ratetree::ratelimit::{LimitsConfig, ResourceLimiterTree, ResourceRequest};
//!
//! # fn main() -> ratetree::error::Result<()> {
//! let tree = LimitsConfig::from_file("limits.yaml")?.build_tree()?;
//! let limiter = ResourceLimiterTree::from_rates(tree, BandwidthFactory::default());
//! let allowed = limiter.try_acquire(&ResourceRequest::new("users.get", "alice"))?;
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```

pub mod bandwidth;
pub mod config;
pub mod error;
pub mod rate;
pub mod ratelimit;
pub mod tree;
