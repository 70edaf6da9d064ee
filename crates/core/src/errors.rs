use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("line {line} is out of range for a {line_count}-line order")]
    LineOutOfRange { line: usize, line_count: usize },
    #[error("protection cannot be added to line {line} before a device")]
    ProtectionRequiresDevice { line: usize },
}

impl ContextError {
    pub fn missing_session_id() -> Self {
        Self::InvalidArgument("session id must not be empty".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::ContextError;

    #[test]
    fn messages_name_the_offending_line() {
        let error = ContextError::LineOutOfRange { line: 4, line_count: 2 };
        assert!(error.to_string().contains("line 4"));
        assert!(error.to_string().contains("2-line"));
    }

    #[test]
    fn missing_session_id_is_an_invalid_argument() {
        assert!(matches!(
            ContextError::missing_session_id(),
            ContextError::InvalidArgument(_)
        ));
    }
}
