/// Result alias that carries the custom [`OverlayError`] type.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Common error type for the overlay engine.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The render surface reported a zero measured size.
    #[error("render surface has no measurable size")]
    SurfaceNotReady,
    /// The user (or platform) refused camera access.
    #[error("camera access was denied")]
    CameraPermission,
    /// Neither the preferred nor the relaxed camera constraints could be met.
    #[error("camera constraints could not be satisfied: {0}")]
    ConstraintNegotiation(String),
    /// Video metadata did not arrive before the load deadline.
    #[error("video metadata did not arrive within {timeout_ms} ms")]
    MediaLoadTimeout { timeout_ms: u64 },
    /// No precompiled tracking descriptor was supplied.
    #[error("no precompiled tracking descriptor is available")]
    TrackingDescriptorMissing,
    /// The tracking engine threw while being constructed.
    #[error("tracking engine could not be constructed: {0}")]
    EngineConstruction(String),
    /// Playback was refused by the environment's autoplay policy. Never fatal.
    #[error("playback was rejected by the autoplay policy: {0}")]
    AutoplayRejected(String),
    /// An operation required an initialised overlay.
    #[error("overlay is not initialised")]
    NotInitialized,
    /// A newer lifecycle request replaced the one that produced this result.
    #[error("initialisation was superseded by a newer request")]
    Superseded,
    /// Catch-all for unexpected failures during initialisation.
    #[error("initialisation failed: {0}")]
    Initialization(String),
    /// Free-form message, mostly used by backends.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around configuration parse errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl OverlayError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the bounded retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SurfaceNotReady | Self::ConstraintNegotiation(_))
    }

    /// Single human-readable string handed to the error reporter.
    pub fn user_message(&self) -> String {
        match self {
            Self::SurfaceNotReady => {
                "The camera view is not ready yet. Please retry.".to_string()
            }
            Self::CameraPermission => {
                "Camera access was denied. Allow camera access and retry.".to_string()
            }
            Self::ConstraintNegotiation(_) => {
                "No compatible camera was found on this device.".to_string()
            }
            Self::MediaLoadTimeout { .. } => {
                "The video took too long to load. Please retry.".to_string()
            }
            Self::TrackingDescriptorMissing => {
                "This experience is missing its marker data.".to_string()
            }
            Self::EngineConstruction(_) => {
                "Augmented reality is not supported in this browser.".to_string()
            }
            Self::AutoplayRejected(_) => "Tap to play the video.".to_string(),
            other => format!("Could not start the experience: {other}"),
        }
    }
}

impl From<&str> for OverlayError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for OverlayError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(OverlayError::SurfaceNotReady.is_retryable());
        assert!(OverlayError::ConstraintNegotiation("no camera".into()).is_retryable());
        assert!(!OverlayError::CameraPermission.is_retryable());
        assert!(!OverlayError::TrackingDescriptorMissing.is_retryable());
    }

    #[test]
    fn catch_all_message_keeps_underlying_cause() {
        let err = OverlayError::Initialization("engine exploded".into());
        assert!(err.user_message().contains("engine exploded"));
    }
}
