use thiserror::Error;

use crate::process::types::LaunchMode;

/// A boxed source error: the underlying cause may come from std::io, a
/// subprocess tool's stderr, or anywhere else not worth naming here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every error the core produces, tagged with the offending game, mode and
/// target so a caller never has to re-derive context from a bare string.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("configuration error for game '{game_id}' (mode {mode:?}, target '{target}'): {context}")]
    Configuration {
        game_id: String,
        mode: LaunchMode,
        target: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("start error for game '{game_id}' (mode {mode:?}, target '{target}'): {context}")]
    Start {
        game_id: String,
        mode: LaunchMode,
        target: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("stop error for game '{game_id}' (mode {mode:?}, target '{target}'): {context}")]
    Stop {
        game_id: String,
        mode: LaunchMode,
        target: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("status error for game '{game_id}' (mode {mode:?}, target '{target}'): {context}")]
    Status {
        game_id: String,
        mode: LaunchMode,
        target: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("not found: {context} (game '{game_id}', mode {mode:?}, target '{target}')")]
    NotFound {
        game_id: String,
        mode: LaunchMode,
        target: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },
}

impl ProcessError {
    pub fn configuration(
        game_id: impl Into<String>,
        mode: LaunchMode,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            game_id: game_id.into(),
            mode,
            target: target.into(),
            context: context.into(),
            cause: None,
        }
    }

    pub fn start(
        game_id: impl Into<String>,
        mode: LaunchMode,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::Start {
            game_id: game_id.into(),
            mode,
            target: target.into(),
            context: context.into(),
            cause: None,
        }
    }

    pub fn stop(
        game_id: impl Into<String>,
        mode: LaunchMode,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::Stop {
            game_id: game_id.into(),
            mode,
            target: target.into(),
            context: context.into(),
            cause: None,
        }
    }

    pub fn status(
        game_id: impl Into<String>,
        mode: LaunchMode,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::Status {
            game_id: game_id.into(),
            mode,
            target: target.into(),
            context: context.into(),
            cause: None,
        }
    }

    pub fn not_found(
        game_id: impl Into<String>,
        mode: LaunchMode,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            game_id: game_id.into(),
            mode,
            target: target.into(),
            context: context.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause, builder-style.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        let cause = Some(cause.into());
        match &mut self {
            Self::Configuration { cause: c, .. }
            | Self::Start { cause: c, .. }
            | Self::Stop { cause: c, .. }
            | Self::Status { cause: c, .. }
            | Self::NotFound { cause: c, .. } => *c = cause,
        }
        self
    }

    /// Short tag used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Status { .. } => "status",
            Self::NotFound { .. } => "not_found",
        }
    }

    /// Process exit code, distinct per error kind, for every top-level
    /// command that drives the core.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::Start { .. } => 3,
            Self::Stop { .. } => 4,
            Self::Status { .. } => 5,
            Self::NotFound { .. } => 6,
        }
    }
}
