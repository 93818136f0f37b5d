use crate::{models::{DiagnosticsResponse, ErrorResponse}, AppState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::{error, info};

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Hub counters plus process level resource usage
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    let stats = match app_state.hub.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Diagnostics unavailable: {}", e);
            return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
        }
    };

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Sessions: {}, Online: {}, Typing: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.sessions,
        stats.online,
        stats.typing
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions: stats.sessions as u32,
            n_online: stats.online as u32,
            n_typing: stats.typing as u32,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
