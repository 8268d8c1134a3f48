use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - API key may be invalid or expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Record {id} not found in {table}")]
    MissingRecord { table: String, id: i64 },

    #[error("Change subscriptions are not supported by this backend")]
    SubscriptionsUnsupported,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl BackendError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        // Cut on a char boundary; byte 500 may fall inside a multibyte
        // character.
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => BackendError::Unauthorized,
            403 => BackendError::AccessDenied(truncated),
            404 => BackendError::NotFound(truncated),
            429 => BackendError::RateLimited,
            500..=599 => BackendError::ServerError(truncated),
            _ => BackendError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            BackendError::from_status(StatusCode::UNAUTHORIZED, ""),
            BackendError::Unauthorized
        ));
        assert!(matches!(
            BackendError::from_status(StatusCode::FORBIDDEN, "nope"),
            BackendError::AccessDenied(_)
        ));
        assert!(matches!(
            BackendError::from_status(StatusCode::NOT_FOUND, ""),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            BackendError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            BackendError::RateLimited
        ));
        assert!(matches!(
            BackendError::from_status(StatusCode::BAD_GATEWAY, "boom"),
            BackendError::ServerError(_)
        ));
        assert!(matches!(
            BackendError::from_status(StatusCode::IM_A_TEAPOT, ""),
            BackendError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(600);
        let truncated = BackendError::truncate_body(&long);
        assert!(truncated.contains("truncated"));
        assert!(truncated.contains("600 total bytes"));
        assert_eq!(BackendError::truncate_body("short"), "short");
    }

    #[test]
    fn test_truncate_body_multibyte_boundary() {
        // 200 euro signs are 600 bytes; byte 500 lands mid-character.
        let body = "\u{20ac}".repeat(200);
        let error = BackendError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let message = error.to_string();
        assert!(message.contains("truncated"));
        assert!(message.contains("600 total bytes"));
    }
}
