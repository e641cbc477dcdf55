//! Request and response models of the mock REST API.

use serde::{Deserialize, Serialize};

/// Dynamic system telemetry, shape-compatible with the real backend's
/// `info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub api_ver: u32,
    pub total_mem: u64,
    pub free_mem: u64,
    pub free_mem_per: u64,
    pub cpu_use: u64,
    pub cpu_usr_use: u64,
    pub cpu_sys_use: u64,
    pub cpu_idle: u64,
    /// 0 = stopped, 1 = starting, 2 = running.
    pub ssh_status: u8,
    /// Uptime as `HH:MM:SS`.
    pub uptime: String,
}

/// Result envelope of `do.json` actions. `result: -1` means the action was
/// unknown and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub api_ver: u32,
    pub result: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoParams {
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanRequest {
    pub speed: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
