use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Result;
use hermes_core::HermesConfig;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod db;
mod state;

use api::create_api_router;
use state::AppState;

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": state.jobs.stats().await,
    }))
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hermes_web=debug,hermes_core=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = HermesConfig::from_env()?;
    config.ensure_project_dir()?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://hermes.db".to_string());
    let bind_address = std::env::var("HERMES_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

    // 初始化状态
    let (state, dispatcher) = AppState::new(config, &database_url).await?;
    let jobs = state.jobs.clone();

    tracing::info!("Hermes web server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            // API 路由
            .service(create_api_router())
            // 健康检查
            .route("/health", web::get().to(health_check))
    })
    .bind(bind_address)?
    .run()
    .await?;

    // 等待运行中的扫描结束
    if let Err(e) = jobs.shutdown().await {
        tracing::warn!("Job queue shutdown: {}", e);
    }
    dispatcher.await?;

    Ok(())
}
