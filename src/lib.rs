// slotvault - GC-aware slot handles and batched cloud saves
// Engine-side object handle table plus an async save commit pipeline

#![warn(rust_2018_idioms)]

pub mod config;
pub mod save;
pub mod slots;

// Re-exports for convenience
pub use config::Settings;
pub use save::{SaveError, SaveOutcome, SavePipeline, UserDirectory};
pub use slots::{AllocStrategy, GcWindow, SlotTable};

/// slotvault error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Save batch already open for container '{0}'")]
        BatchAlreadyOpen(String),

        #[error("No save batch is open")]
        NoBatchOpen,

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    impl From<::config::ConfigError> for Error {
        fn from(e: ::config::ConfigError) -> Self {
            Error::Config(e.to_string())
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
