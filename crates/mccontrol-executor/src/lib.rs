//! Command transports for the game-server console.
//!
//! Provides:
//! - `ConsoleSession` - Authenticated console protocol session with bounded retry
//! - `PersistentExecutor`, `StdinExecutor`, `OneShotExecutor` - Transport implementations
//! - `ExecutorFactory` - Ordered list of transport constructors with Auto fallback
//! - Remote shell command building

pub mod command;
pub mod console;
pub mod factory;
pub mod transport;

pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use console::{ConsoleSession, SessionState};
pub use factory::{ExecutorFactory, TransportSettings};
pub use transport::{OneShotExecutor, OneShotMode, PersistentExecutor, StdinExecutor};
