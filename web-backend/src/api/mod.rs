use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError, Scope};
use hermes_core::error::CoreError;

pub mod project;
pub mod scanner;
pub mod user;

pub fn create_api_router() -> Scope {
    web::scope("/api")
        .service(user_routes())
        .service(project_routes())
        .service(scan_routes())
        .service(scanner_routes())
}

fn user_routes() -> Scope {
    web::scope("/users")
        .configure(user::configure_user_routes)
}

fn project_routes() -> Scope {
    web::scope("/projects")
        .configure(project::configure_project_routes)
}

fn scan_routes() -> Scope {
    web::scope("/scans")
        .configure(scanner::configure_scan_routes)
}

fn scanner_routes() -> Scope {
    web::scope("/scanners")
        .configure(scanner::configure_scanner_routes)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::UnknownScanner(_))
            | ApiError::Core(CoreError::Precondition(_))
            | ApiError::Core(CoreError::Parse(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(CoreError::QueueClosed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

pub type ApiResult = Result<HttpResponse, ApiError>;
