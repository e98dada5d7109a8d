//! Client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid platform URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl From<ClientError> for dagship_core::Error {
    fn from(err: ClientError) -> Self {
        use dagship_core::Error;
        match err {
            ClientError::Url(e) => Error::InvalidInput(e.to_string()),
            ClientError::Request(msg) => Error::Transport(msg),
            ClientError::Api {
                status: 401 | 403,
                message,
            } => Error::Unauthorized(message),
            ClientError::Api {
                status: 404,
                message,
            } => Error::NotFound(message),
            ClientError::Api { status, message } => Error::Api { status, message },
            ClientError::Parse(msg) => Error::Transport(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagship_core::Error;

    #[test]
    fn test_status_mapping() {
        let api = |status| ClientError::Api {
            status,
            message: "nope".to_string(),
        };

        assert!(matches!(Error::from(api(401)), Error::Unauthorized(_)));
        assert!(matches!(Error::from(api(403)), Error::Unauthorized(_)));
        assert!(matches!(Error::from(api(404)), Error::NotFound(_)));
        assert_eq!(
            Error::from(api(502)),
            Error::Api {
                status: 502,
                message: "nope".to_string()
            }
        );
        assert!(matches!(
            Error::from(ClientError::Request("connection refused".to_string())),
            Error::Transport(_)
        ));
    }
}
