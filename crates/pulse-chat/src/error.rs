//! Error types for the turn engine.

/// Errors from validating a turn or talking to the model provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChatError {
    /// Whether the caller sent something unacceptable, as opposed to an
    /// upstream failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

/// The request URL is stripped so nothing it carries reaches the caller.
impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.without_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(4000).to_string(),
            "message exceeds maximum length of 4000 characters"
        );
        assert_eq!(
            ChatError::Provider("quota exceeded".to_string()).to_string(),
            "provider error: quota exceeded"
        );
        assert_eq!(
            ChatError::Transport("connection reset".to_string()).to_string(),
            "transport error: connection reset"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ChatError::EmptyMessage.is_client_error());
        assert!(ChatError::MessageTooLong(1).is_client_error());
        assert!(!ChatError::Provider(String::new()).is_client_error());
        assert!(!ChatError::Transport(String::new()).is_client_error());
    }

    #[test]
    fn test_chat_error_unicode_inner_message() {
        let err = ChatError::Provider("modelo indisponível".to_string());
        assert!(err.to_string().contains("indisponível"));
    }
}
