// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon (spec §3
//! "Config"), following the reference daemon's `env.rs`/`Config::load()`
//! split: one function per variable, one `Config::from_env()` that calls
//! them all.

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_GLOBAL_CONCURRENCY: usize = 4;
const DEFAULT_DEDUP_CAPACITY: usize = 10_000;
const DEFAULT_DEDUP_TTL_MS: i64 = 60_000;
const DEFAULT_KEEP_ALIVE_TTL_MS: i64 = 24 * 60 * 60 * 1_000;
const DEFAULT_ESCALATION_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1_000;
const DEFAULT_RUN_LOG_RETENTION: u32 = 1_000;
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4040";

/// Everything `main` needs to wire store → scheduler → bus → engine, read
/// once at startup from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the app database and per-app working trees
    /// (`HALO_DATA_DIR`, default `~/.local/share/halo`).
    pub data_dir: PathBuf,
    /// Global run concurrency `G` (`HALO_CONCURRENCY`).
    pub global_concurrency: usize,
    /// Event dedup cache capacity (`HALO_DEDUP_CAPACITY`).
    pub dedup_capacity: usize,
    /// Event dedup cache TTL in milliseconds (`HALO_DEDUP_TTL_MS`).
    pub dedup_ttl_ms: i64,
    /// Keep-alive reason TTL in milliseconds (`HALO_KEEP_ALIVE_TTL_MS`).
    pub keep_alive_ttl_ms: i64,
    /// Fallback for how long an unanswered escalation waits before being
    /// reaped to `error` (`HALO_ESCALATION_TIMEOUT_MS`), for apps whose
    /// spec doesn't set its own `escalation.timeout_hours`.
    pub escalation_timeout_ms: i64,
    /// Scheduler run-log retention, rows per job (`HALO_RUN_LOG_RETENTION`).
    pub run_log_retention: u32,
    /// Consecutive scheduler-job errors before auto-disable
    /// (`HALO_MAX_CONSECUTIVE_ERRORS`).
    pub max_consecutive_errors: u32,
    /// Address the webhook HTTP mount listens on (`HALO_HTTP_ADDR`).
    pub http_addr: SocketAddr,
    /// Shared HMAC secret applied to every webhook path, if set
    /// (`HALO_WEBHOOK_SECRET`); unset means every path is unauthenticated.
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: data_dir()?,
            global_concurrency: env_usize("HALO_CONCURRENCY", DEFAULT_GLOBAL_CONCURRENCY)?,
            dedup_capacity: env_usize("HALO_DEDUP_CAPACITY", DEFAULT_DEDUP_CAPACITY)?,
            dedup_ttl_ms: env_i64("HALO_DEDUP_TTL_MS", DEFAULT_DEDUP_TTL_MS)?,
            keep_alive_ttl_ms: env_i64("HALO_KEEP_ALIVE_TTL_MS", DEFAULT_KEEP_ALIVE_TTL_MS)?,
            escalation_timeout_ms: env_i64("HALO_ESCALATION_TIMEOUT_MS", DEFAULT_ESCALATION_TIMEOUT_MS)?,
            run_log_retention: env_u32("HALO_RUN_LOG_RETENTION", DEFAULT_RUN_LOG_RETENTION)?,
            max_consecutive_errors: env_u32("HALO_MAX_CONSECUTIVE_ERRORS", DEFAULT_MAX_CONSECUTIVE_ERRORS)?,
            http_addr: http_addr()?,
            webhook_secret: std::env::var("HALO_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory to derive HALO_DATA_DIR from; set HALO_DATA_DIR explicitly")]
    NoDataDir,

    #[error("{var}={value:?} is not a valid {expected}")]
    Invalid { var: &'static str, value: String, expected: &'static str },
}

/// `HALO_DATA_DIR` > `XDG_DATA_HOME/halo` > `~/.local/share/halo`.
fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("HALO_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg).join("halo"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoDataDir)?;
    Ok(PathBuf::from(home).join(".local/share/halo"))
}

fn http_addr() -> Result<SocketAddr, ConfigError> {
    let raw = std::env::var("HALO_HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
    raw.parse().map_err(|_| ConfigError::Invalid { var: "HALO_HTTP_ADDR", value: raw, expected: "socket address" })
}

fn env_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw, expected: "non-negative integer" }),
        Err(_) => Ok(default),
    }
}

fn env_u32(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw, expected: "non-negative integer" }),
        Err(_) => Ok(default),
    }
}

fn env_i64(var: &'static str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw, expected: "integer" }),
        Err(_) => Ok(default),
    }
}
