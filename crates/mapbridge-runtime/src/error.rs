//! Engine error types.

use thiserror::Error;

use mapbridge_core::{ChannelError, ChannelId, ModuleError, ModuleLoadError};

use crate::config::ConfigError;

/// Errors that can occur while dispatching one event.
///
/// Every variant except [`DispatchError::HandlerNotFound`] is converted into
/// an `ErrorResp` addressed to the originating message id; the missing
/// handler case is logged and the event dropped without a response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered under the derived dispatch key.
    #[error("no handler registered for event '{key}'")]
    HandlerNotFound {
        /// The derived dispatch key.
        key: String,
    },

    /// The channel has no loaded module.
    #[error("no module registered for channel {ch_id}")]
    ModuleNotFound {
        /// The unregistered channel.
        ch_id: ChannelId,
    },

    /// Loading the channel's module failed; the channel stays unregistered.
    #[error("failed to load module for channel {ch_id}: {source}")]
    Load {
        /// The channel the load was for.
        ch_id: ChannelId,
        /// The underlying load failure.
        source: ModuleLoadError,
    },

    /// The module raised an error while handling the operation.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Sending a response through the channel failed.
    #[error(transparent)]
    Response(#[from] ChannelError),

    /// The handler did not complete within the configured time.
    #[error("handler timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// A handler received an event variant it does not answer to.
    #[error("handler '{handler}' received a mismatched event")]
    EventMismatch {
        /// The handler's dispatch key.
        handler: &'static str,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while assembling or running the engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No module loader was supplied to the engine builder.
    #[error("engine requires a module loader")]
    MissingLoader,
}

/// Result type for engine operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
