use actix_web::{web, HttpResponse};
use uuid::Uuid;

use super::ApiResult;
use crate::state::AppState;

pub fn configure_scanner_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list_scanners)); // GET /api/scanners
}

pub fn configure_scan_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/{id}", web::get().to(get_scan))                                // GET /api/scans/{id}
        .route("/{id}/vulnerabilities", web::get().to(get_scan_vulnerabilities)); // GET /api/scans/{id}/vulnerabilities
}

/// 已注册的扫描器，供项目设置页选择
async fn list_scanners(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.registry.descriptions())
}

async fn get_scan(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let scan = state.store.get_scan(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "scan": scan,
        "scanner_versions": scan.scanner_versions(),
    })))
}

async fn get_scan_vulnerabilities(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let scan = state.store.get_scan(path.into_inner()).await?;
    let vulnerabilities = state.store.list_scan_vulnerabilities(scan.id).await?;
    Ok(HttpResponse::Ok().json(vulnerabilities))
}
