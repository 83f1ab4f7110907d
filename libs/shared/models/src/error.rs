use axum::{
    extract::{
        path::ErrorKind,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// Input rejected before touching the store; `fields` names the offenders.
    #[error("Validation error: {message}")]
    ValidationError {
        reason: String,
        message: String,
        fields: Vec<String>,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conflict whose body carries extra machine-readable state (counts, status).
    #[error("Conflict: {message}")]
    ConflictWithDetails { message: String, details: Value },

    #[error("Too many requests: {message}")]
    TooManyRequests { message: String, retry_after_seconds: u64 },

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AppError {
    pub fn validation(reason: &str, message: impl Into<String>, fields: &[&str]) -> Self {
        AppError::ValidationError {
            reason: reason.to_string(),
            message: message.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ConflictWithDetails { .. } => StatusCode::CONFLICT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body sent to the client.
    pub fn body(&self) -> Value {
        match self {
            AppError::ValidationError { reason, message, fields } => json!({
                "error": message,
                "reason": reason,
                "fields": fields,
            }),
            AppError::ConflictWithDetails { message, details } => {
                let mut body = json!({ "error": message });
                if let (Some(target), Some(extra)) = (body.as_object_mut(), details.as_object()) {
                    for (key, value) in extra {
                        target.insert(key.clone(), value.clone());
                    }
                }
                body
            }
            AppError::TooManyRequests { message, retry_after_seconds } => json!({
                "error": message,
                "retry_after_seconds": retry_after_seconds,
            }),
            // Store failures stay generic for the caller; the detail goes to the log.
            AppError::Database(_) => json!({ "error": "Database operation failed" }),
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg)
            | AppError::Conflict(msg)
            | AppError::ExternalService(msg) => json!({ "error": msg }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Error: {}: {}", status, self);
        }

        let mut response = (status, Json(self.body())).into_response();

        if let AppError::TooManyRequests { retry_after_seconds, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// Extractor rejections share the `reason`/`fields` body of service validation.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match &rejection {
            JsonRejection::JsonDataError(_) => deserialize_error(&rejection.body_text()),
            JsonRejection::JsonSyntaxError(_) => {
                AppError::validation("invalid_json", "Request body is not valid JSON", &[])
            }
            _ => AppError::validation("invalid_body", rejection.body_text(), &[]),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        if let PathRejection::FailedToDeserializePathParams(inner) = &rejection {
            match inner.kind() {
                ErrorKind::ParseErrorAtKey { key, .. }
                | ErrorKind::DeserializeError { key, .. }
                | ErrorKind::InvalidUtf8InPathParam { key } => return invalid_field(key),
                _ => {}
            }
        }
        AppError::validation("invalid_field", rejection.body_text(), &[])
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        deserialize_error(&rejection.body_text())
    }
}

fn invalid_field(field: &str) -> AppError {
    AppError::validation("invalid_field", format!("Invalid value for {}", field), &[field])
}

/// Turns a serde message such as `"...: is_emergency: invalid type: ..."`
/// into a field-level validation error.
fn deserialize_error(text: &str) -> AppError {
    if let Some(field) = missing_field(text) {
        return AppError::validation("missing_fields", format!("Missing required field: {}", field), &[field]);
    }

    match text.split(": ").nth(1) {
        Some(field) if !field.is_empty() && !field.contains(char::is_whitespace) => invalid_field(field),
        _ => AppError::validation("invalid_field", text.to_string(), &[]),
    }
}

fn missing_field(text: &str) -> Option<&str> {
    let rest = text.split("missing field `").nth(1)?;
    rest.split('`').next().filter(|field| !field.is_empty())
}
