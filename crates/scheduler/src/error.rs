// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use halo_core::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] halo_storage::StoreError),

    #[error("job {0} could not compute an initial next-run time")]
    NoInitialFireTime(String),
}
