// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for the Halo data model (spec §3).

crate::define_id! {
    /// Identifies a persistent scheduler job.
    pub struct SchedulerJobId("sjb-");
}

crate::define_id! {
    /// Identifies an installed automation app within a space.
    pub struct AppId("app-");
}

crate::define_id! {
    /// Identifies a single run of an installed app.
    pub struct RunId("run-");
}

crate::define_id! {
    /// Identifies an append-only activity entry.
    pub struct ActivityId("act-");
}
