//! Binwrap Core Library
//!
//! Treats an external command-line tool as a dependency of a Rust program.
//! It includes:
//!
//! - Per-platform download source selection
//! - Streaming download, archive extraction and wrapper-directory stripping
//! - Process execution with captured output, stdin feeding, timeouts and kill
//! - The `BinWrapper` facade and its builder
//! - JSON wrapper definition files

pub mod acquire;
pub mod config;
pub mod error;
pub mod platform;
pub mod process;
pub mod source;
pub mod wrapper;

// Re-exports for convenience
pub use error::{BinError, Result};
pub use platform::Platform;
pub use source::{select_source, Source, SourceSet};

// Re-export acquisition
pub use acquire::{Acquirer, AcquisitionTarget};

// Re-export execution
pub use process::{KillSwitch, ProcessRunner, StdinSource, StdoutSink};

// Re-export the facade
pub use config::{ConfigError, WrapperFile};
pub use wrapper::{BinWrapper, BinWrapperBuilder, WrapperConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
