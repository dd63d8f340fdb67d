use crate::error::AppError;
use crate::sync::{MutationFailure, Notice, NoticeKind};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub type ApiError = Custom<Json<ValidationResponse>>;

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ApiError;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> ApiError {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Database(_) => ("database", "Database error".to_string()),
            AppError::Configuration(_) => ("server", "Server misconfigured".to_string()),
            AppError::Authentication(msg) => ("authentication", msg.clone()),
            AppError::Authorization(msg) => ("authorization", format!("Permission denied: {}", msg)),
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Validation(msg) => ("validation", msg.clone()),
            AppError::Subscription(msg) => ("service", format!("Service error: {}", msg)),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

#[derive(Debug)]
pub struct ValidationErrorWrapper(pub validator::ValidationErrors);

impl From<ValidationErrorWrapper> for ApiError {
    #[instrument]
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        let errors = wrapper.0;
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

/// Validates a JSON body with its `validator` rules.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ApiError> {
        let inner = self.into_inner();
        inner
            .validate()
            .map_err(|e| ApiError::from(ValidationErrorWrapper(e)))?;
        Ok(inner)
    }
}

pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, ApiError> {
        self.map_err(|e| e.to_validation_response())
    }
}

/// Body of every edit response: whether it went through and the toast to show.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NoticeResponse {
    pub success: bool,
    pub message: String,
}

impl From<Notice> for NoticeResponse {
    fn from(notice: Notice) -> Self {
        Self {
            success: notice.kind == NoticeKind::Success,
            message: notice.message,
        }
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for MutationFailure {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        Custom(
            self.error.status_code(),
            Json(NoticeResponse::from(self.notice)),
        )
        .respond_to(req)
    }
}
