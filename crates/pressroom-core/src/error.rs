use thiserror::Error;

#[derive(Debug, Error)]
pub enum PressroomError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Too many observers (max {max})")]
    TooManyObservers { max: usize },
}

impl PressroomError {
    /// Short error code string sent to observers in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            PressroomError::Config(_) => "CONFIG_ERROR",
            PressroomError::AuthFailed(_) => "AUTH_FAILED",
            PressroomError::Protocol(_) => "PROTOCOL_ERROR",
            PressroomError::TooManyObservers { .. } => "TOO_MANY_OBSERVERS",
        }
    }
}

pub type Result<T> = std::result::Result<T, PressroomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_facing_codes() {
        let cases = [
            (PressroomError::Config("x".into()), "CONFIG_ERROR"),
            (PressroomError::AuthFailed("bad token".into()), "AUTH_FAILED"),
            (PressroomError::Protocol("must connect first".into()), "PROTOCOL_ERROR"),
            (PressroomError::TooManyObservers { max: 2 }, "TOO_MANY_OBSERVERS"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
        assert_eq!(
            PressroomError::TooManyObservers { max: 2 }.to_string(),
            "Too many observers (max 2)"
        );
    }
}
