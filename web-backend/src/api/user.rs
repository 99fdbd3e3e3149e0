use actix_web::{web, HttpResponse};
use hermes_core::User;
use serde::Deserialize;

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

pub fn configure_user_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("", web::post().to(create_user))                             // POST /api/users
        .route("/{id}/notifications", web::get().to(take_notifications));  // GET /api/users/{id}/notifications
}

async fn create_user(
    state: web::Data<AppState>,
    req: web::Json<CreateUserRequest>,
) -> ApiResult {
    let req = req.into_inner();
    if req.username.trim().is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }

    let user = User {
        id: req.id,
        username: req.username,
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
    };
    state.store.insert_user(&user).await?;
    tracing::info!("Registered user {} ({})", user.id, user.username);

    Ok(HttpResponse::Created().json(user))
}

/// 返回并清空用户的待显示通知
async fn take_notifications(state: web::Data<AppState>, path: web::Path<i64>) -> ApiResult {
    let user_id = path.into_inner();
    let notifications = state.store.take_notifications(user_id).await?;
    Ok(HttpResponse::Ok().json(notifications))
}
