//! mccontrol-test-utils: Test infrastructure for mccontrol.
//!
//! Provides:
//! - FakePlatform: Scripted instances, endpoints, log streams, attach and exec
//! - FakeConsole: Scripted console protocol connections with counters
//! - FakePinger: Scripted status pings

mod fake_console;
mod fake_pinger;
mod fake_platform;

pub use fake_console::{CommandOutcome, FakeConsole};
pub use fake_pinger::{FakePinger, sample_properties};
pub use fake_platform::{FakePlatform, LogScript, instance, timestamped};
