// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("source {0:?} is already registered")]
    SourceAlreadyRegistered(String),

    #[error("source {0:?} is not registered")]
    SourceNotFound(String),

    #[error("sink error (caught, not propagated): {0}")]
    SinkFailed(String),

    #[error("webhook error: {0}")]
    Webhook(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),
}
