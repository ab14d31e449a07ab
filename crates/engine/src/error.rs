// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use halo_adapters::AgentAdapterError;
use halo_core::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] halo_storage::StoreError),

    #[error(transparent)]
    Scheduler(#[from] halo_scheduler::SchedulerError),

    #[error(transparent)]
    Bus(#[from] halo_bus::BusError),

    #[error(transparent)]
    Agent(#[from] AgentAdapterError),

    #[error("failed to provision app directory {0:?}: {1}")]
    AppDirectory(String, std::io::Error),
}
