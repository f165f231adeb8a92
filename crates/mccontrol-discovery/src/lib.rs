//! Discovery of the game-server instance behind a label selector.
//!
//! Provides:
//! - `DiscoveryCache` - Rate-limited, single-flight identity refresh
//! - Candidate and endpoint selection rules

pub mod cache;
pub mod select;

pub use cache::DiscoveryCache;
pub use select::{external_address_for, select_instance};
