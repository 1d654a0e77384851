//! Unified error types for the mapbridge core boundary.
//!
//! Engine-level errors (dispatch, handler resolution) are defined in
//! `mapbridge-runtime`; this module covers the module and channel seams.

use thiserror::Error;

use crate::event::MsgId;

// =============================================================================
// Module Loading Errors
// =============================================================================

/// Errors that can occur while loading a mapping module.
///
/// A load failure leaves the channel unregistered, so a later event may
/// retry the load.
#[derive(Debug, Clone, Error)]
pub enum ModuleLoadError {
    /// The module URL could not be interpreted.
    #[error("invalid module url '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Reason it was rejected.
        reason: String,
    },

    /// No factory is registered under the name the URL resolves to.
    #[error("no module factory registered for '{name}'")]
    FactoryNotFound {
        /// The unresolved factory name.
        name: String,
    },

    /// The module factory ran but failed to construct the module.
    #[error("module construction failed: {0}")]
    Construction(String),
}

// =============================================================================
// Module Execution Errors
// =============================================================================

/// Errors raised by a mapping module while handling an operation.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// The module does not implement the requested capability.
    #[error("module does not implement {method}")]
    MissingCapability {
        /// Wire-level name of the missing method.
        method: &'static str,
    },

    /// The module's translation logic failed.
    #[error("{0}")]
    Execution(String),
}

impl ModuleError {
    /// Creates an execution error with the given message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

// =============================================================================
// Channel Errors
// =============================================================================

/// Errors that can occur on the event channel boundary.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The channel is closed; no further events or responses flow.
    #[error("event channel closed")]
    Closed,

    /// No pending request exists for the message id.
    ///
    /// Also covers the already-answered case: completing a request consumes
    /// its slot, so a second response for the same id lands here.
    #[error("no pending request for message {msg_id}")]
    UnknownMessage {
        /// The unmatched message id.
        msg_id: MsgId,
    },

    /// A request was not answered within the allowed time.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for module load operations.
pub type LoadResult<T> = Result<T, ModuleLoadError>;

/// Result type for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
