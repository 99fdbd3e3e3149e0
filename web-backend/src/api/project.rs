use actix_web::{web, HttpResponse};
use hermes_core::{Job, Project, ProjectAutomation, ScanArchive};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub owner: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 相对 PROJECT_DIR 的源码目录，缺省为项目 id
    pub directory: Option<String>,
    #[serde(default)]
    pub code_scanners: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct CloneProjectRequest {
    pub user_id: i64,
    pub git_url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code_scanners: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct UpdateScannersRequest {
    pub code_scanners: Vec<String>,
}

#[derive(Deserialize)]
pub struct JobRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    pub user_id: i64,
}

pub fn configure_project_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("", web::post().to(create_project))                       // POST /api/projects
        .route("/clone", web::post().to(clone_project))                  // POST /api/projects/clone
        .route("/{id}", web::get().to(get_project))                      // GET /api/projects/{id}
        .route("/{id}", web::delete().to(delete_project))                // DELETE /api/projects/{id}
        .route("/{id}/scanners", web::put().to(update_scanners))         // PUT /api/projects/{id}/scanners
        .route("/{id}/scan", web::post().to(run_scanners))               // POST /api/projects/{id}/scan
        .route("/{id}/pull", web::post().to(pull_project))               // POST /api/projects/{id}/pull
        .route("/{id}/scans", web::get().to(list_scans))                 // GET /api/projects/{id}/scans
        .route("/{id}/vulnerabilities", web::get().to(list_vulnerabilities))
        .route("/{id}/scans/{number}/export", web::get().to(export_scan));
}

fn accepted(job_id: Uuid) -> HttpResponse {
    HttpResponse::Accepted().json(serde_json::json!({ "job_id": job_id }))
}

async fn create_project(
    state: web::Data<AppState>,
    req: web::Json<CreateProjectRequest>,
) -> ApiResult {
    let req = req.into_inner();
    state.registry.validate(&req.code_scanners)?;
    let owner = state.store.get_user(req.owner).await?;

    let mut project = Project::new(owner.id, req.title).with_scanners(req.code_scanners);
    project.description = req.description;
    project.is_public = req.is_public;
    project.directory = req.directory.unwrap_or_else(|| project.id.to_string());
    Project::check_directory(&project.directory)?;

    state.store.insert_project(&project).await?;
    state
        .store
        .save_automation(&ProjectAutomation::new(project.id))
        .await?;
    tracing::info!("Created project {} ({})", project.id, project.title);

    Ok(HttpResponse::Created().json(project))
}

/// 创建 git 项目并排队克隆，克隆成功后自动扫描
async fn clone_project(
    state: web::Data<AppState>,
    req: web::Json<CloneProjectRequest>,
) -> ApiResult {
    let req = req.into_inner();
    let git_url = req.git_url.trim();
    if git_url.is_empty() {
        return Err(ApiError::BadRequest("git_url is required".to_string()));
    }
    // 以 - 开头会被 git 当作选项
    if git_url.starts_with('-') {
        return Err(ApiError::BadRequest("git_url must not start with '-'".to_string()));
    }
    let git_url = git_url.to_string();
    state.registry.validate(&req.code_scanners)?;
    let owner = state.store.get_user(req.user_id).await?;

    let mut project = Project::new(owner.id, req.title)
        .with_scanners(req.code_scanners)
        .git_based(true);
    project.description = req.description;
    project.is_public = req.is_public;
    project.directory = project.id.to_string();

    state.store.insert_project(&project).await?;
    state
        .store
        .save_automation(&ProjectAutomation::new(project.id))
        .await?;

    let job_id = state
        .jobs
        .enqueue(Job::GitClone {
            git_url,
            destination: project.scanner_path(&state.config),
            project: project.id,
            user: owner.id,
        })
        .await?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "job_id": job_id,
        "project": project,
    })))
}

async fn get_project(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let project = state.store.get_project(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

async fn delete_project(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let id = path.into_inner();
    state.store.delete_project(id).await?;
    tracing::info!("Deleted project {}", id);
    Ok(HttpResponse::NoContent().finish())
}

async fn update_scanners(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateScannersRequest>,
) -> ApiResult {
    let id = path.into_inner();
    state.registry.validate(&req.code_scanners)?;
    state.store.update_project_scanners(id, &req.code_scanners).await?;
    let project = state.store.get_project(id).await?;
    Ok(HttpResponse::Ok().json(project))
}

async fn run_scanners(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<JobRequest>,
) -> ApiResult {
    let project = state.store.get_project(path.into_inner()).await?;
    let job_id = state
        .jobs
        .enqueue(Job::RunScanners {
            project: project.id,
            user: req.user_id,
        })
        .await?;
    Ok(accepted(job_id))
}

async fn pull_project(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<JobRequest>,
) -> ApiResult {
    let project = state.store.get_project(path.into_inner()).await?;
    let job_id = state
        .jobs
        .enqueue(Job::UpdateFromSource {
            project: project.id,
            user: req.user_id,
        })
        .await?;
    Ok(accepted(job_id))
}

async fn list_scans(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let project = state.store.get_project(path.into_inner()).await?;
    let scans = state.store.list_scans(project.id).await?;
    Ok(HttpResponse::Ok().json(scans))
}

async fn list_vulnerabilities(state: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult {
    let project = state.store.get_project(path.into_inner()).await?;
    let vulnerabilities = state.store.list_project_vulnerabilities(project.id).await?;
    Ok(HttpResponse::Ok().json(vulnerabilities))
}

/// 下载扫描归档
async fn export_scan(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, i64)>,
    query: web::Query<ExportQuery>,
) -> ApiResult {
    let (project_id, number) = path.into_inner();
    let user = state.store.get_user(query.user_id).await?;
    let project = state.store.get_project(project_id).await?;
    if !project.is_visible_to(user.id) {
        return Err(ApiError::Forbidden(format!(
            "user {} cannot view project {}",
            user.id, project.id
        )));
    }

    let scan = state.store.get_scan_by_number(project.id, number).await?;
    let archive = ScanArchive::build(state.store.as_ref(), scan.id, &user).await?;
    let body = archive.to_json_pretty()?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=hermes_archive.json",
        ))
        .body(body))
}
