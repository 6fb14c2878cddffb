use crate::{models::DiagnosticsResponse, ws::relay::Relay};
use axum::{extract::State, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Relay and process diagnostics
pub async fn diagnostics(State(relay): State<Arc<Relay>>) -> Json<DiagnosticsResponse> {
    let stats = relay.stats();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
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
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.connections,
        stats.rooms
    );

    Json(DiagnosticsResponse {
        n_conn: stats.connections as u32,
        n_rooms: stats.rooms as u32,
        n_nonempty_docs: stats.nonempty_docs as u32,
        n_presence_entries: stats.presence_entries as u32,
        cpu_usage,
        memory_alloc,
        memory_total,
        memory_free,
    })
}
