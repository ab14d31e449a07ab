// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installed-app management: install/uninstall/reinstall/delete (spec
//! §4.4.1 "Install", "Uninstall", "Reinstall", "Delete").

use crate::error::EngineError;
use crate::repo;
use halo_core::{AppId, AppStatus, Clock, DomainError, InstalledApp, Permissions};
use halo_storage::DbHandle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where an app's working tree lives under the space root (spec §4.4.1
/// "create `{space}/apps/{id}/` and `{space}/apps/{id}/memory/`").
pub fn app_dir(space_root: &Path, app_id: &AppId) -> PathBuf {
    space_root.join("apps").join(app_id.as_str())
}

pub fn app_memory_dir(space_root: &Path, app_id: &AppId) -> PathBuf {
    app_dir(space_root, app_id).join("memory")
}

pub struct InstallInput {
    pub spec_id: String,
    pub space_id: String,
    pub spec: serde_json::Value,
    pub user_config: HashMap<String, serde_json::Value>,
    pub permissions: Permissions,
}

const VALID_SPEC_TYPES: [&str; 4] = ["automation", "skill", "mcp", "extension"];

/// Validates `spec.type` (spec §3 "InstalledApp" — `spec` only required
/// shape is `type ∈ {automation, skill, mcp, extension}`). Unlike
/// [`InstalledApp::spec_type`], which defaults to `"automation"` for
/// display/dispatch convenience once an app is already installed, this
/// gate rejects anything that isn't one of the four allowed values
/// up front.
fn validate_spec_type(spec: &serde_json::Value) -> Result<(), DomainError> {
    match spec.get("type").and_then(|v| v.as_str()) {
        Some(t) if VALID_SPEC_TYPES.contains(&t) => Ok(()),
        Some(other) => Err(DomainError::InvalidSpec { found: other.to_string() }),
        None => Err(DomainError::InvalidSpec { found: "<missing>".to_string() }),
    }
}

/// Install a new app (spec §4.4.1 "Install (atomic)"). Validates the
/// spec's `type`, validates uniqueness both pre-check and via the DB's
/// own `UNIQUE(spec_id, space_id)` constraint, creates the app's
/// working directory tree, and rolls the row back if directory
/// creation fails.
pub fn install_app<C: Clock>(db: &DbHandle, clock: &C, space_root: &Path, input: InstallInput) -> Result<InstalledApp, EngineError> {
    validate_spec_type(&input.spec)?;

    if repo::find_by_spec_and_space(db, &input.spec_id, &input.space_id)?.is_some() {
        return Err(DomainError::AppAlreadyInstalled { spec_id: input.spec_id, space_id: input.space_id }.into());
    }

    let now = clock.epoch_ms();
    let app = InstalledApp {
        id: AppId::new(),
        spec_id: input.spec_id,
        space_id: input.space_id,
        spec: input.spec,
        user_config: input.user_config,
        user_overrides: serde_json::json!({}),
        permissions: input.permissions,
        status: AppStatus::Active,
        pending_escalation_id: None,
        installed_at: now,
        uninstalled_at: None,
        last_run_at: None,
        last_run_outcome: None,
        error_message: None,
    };

    match repo::insert_app(db, &app) {
        Ok(()) => {}
        Err(EngineError::Store(halo_storage::StoreError::Sqlite(e)))
            if matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::ConstraintViolation)
            ) =>
        {
            return Err(DomainError::AppAlreadyInstalled { spec_id: app.spec_id, space_id: app.space_id }.into());
        }
        Err(e) => return Err(e),
    }

    let memory_dir = app_memory_dir(space_root, &app.id);
    if let Err(e) = std::fs::create_dir_all(&memory_dir) {
        let _ = repo::delete_app(db, &app.id);
        return Err(EngineError::AppDirectory(memory_dir.display().to_string(), e));
    }

    Ok(app)
}

/// Uninstall: status -> `uninstalled`. Directory and scheduler jobs are
/// left in place.
pub fn uninstall_app<C: Clock>(db: &DbHandle, clock: &C, id: &AppId) -> Result<InstalledApp, EngineError> {
    let mut app = get_app_or_err(db, id)?;
    app.status.validate_transition(AppStatus::Uninstalled)?;
    app.status = AppStatus::Uninstalled;
    app.uninstalled_at = Some(clock.epoch_ms());
    repo::update_app(db, &app)?;
    Ok(app)
}

/// Reinstall: status -> `active`, clears `uninstalled_at`.
pub fn reinstall_app(db: &DbHandle, id: &AppId) -> Result<InstalledApp, EngineError> {
    let mut app = get_app_or_err(db, id)?;
    app.status.validate_transition(AppStatus::Active)?;
    app.status = AppStatus::Active;
    app.uninstalled_at = None;
    repo::update_app(db, &app)?;
    Ok(app)
}

/// Delete: requires `uninstalled`; hard-deletes the row and purges the
/// app's directory. Scheduler job teardown is the activation layer's
/// responsibility (it already ran at the `active -> uninstalled`
/// transition's corresponding deactivation).
pub fn delete_app(db: &DbHandle, space_root: &Path, id: &AppId) -> Result<(), EngineError> {
    let app = get_app_or_err(db, id)?;
    if app.status != AppStatus::Uninstalled {
        return Err(DomainError::DeleteRequiresUninstalled(*id).into());
    }
    repo::delete_app(db, id)?;
    let dir = app_dir(space_root, id);
    if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(|e| EngineError::AppDirectory(dir.display().to_string(), e))?;
    }
    Ok(())
}

fn get_app_or_err(db: &DbHandle, id: &AppId) -> Result<InstalledApp, EngineError> {
    repo::get_app(db, id)?.ok_or_else(|| DomainError::AppNotFound(*id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::FakeClock;
    use halo_storage::Store;
    use tempfile::tempdir;

    fn setup() -> (DbHandle, FakeClock, tempfile::TempDir) {
        let store = Store::new();
        let db = store.open_memory().unwrap();
        db.with_connection(|conn| {
            halo_storage::run_migrations(conn, crate::migrations::NAMESPACE, &crate::migrations::migrations(), 0)
        })
        .unwrap();
        (db, FakeClock::new(), tempdir().unwrap())
    }

    fn install_input() -> InstallInput {
        InstallInput {
            spec_id: "weather-bot".into(),
            space_id: "space-1".into(),
            spec: serde_json::json!({"type": "automation", "subscriptions": []}),
            user_config: HashMap::new(),
            permissions: Permissions::default(),
        }
    }

    #[test]
    fn install_creates_row_and_memory_directory() {
        let (db, clock, dir) = setup();
        let app = install_app(&db, &clock, dir.path(), install_input()).unwrap();
        assert_eq!(app.status, AppStatus::Active);
        assert!(app_memory_dir(dir.path(), &app.id).is_dir());
    }

    #[test]
    fn install_rejects_unknown_spec_type() {
        let (db, clock, dir) = setup();
        let mut input = install_input();
        input.spec = serde_json::json!({"type": "not-a-real-type", "subscriptions": []});
        let err = install_app(&db, &clock, dir.path(), input).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidSpec { .. })));
    }

    #[test]
    fn install_rejects_missing_spec_type() {
        let (db, clock, dir) = setup();
        let mut input = install_input();
        input.spec = serde_json::json!({"subscriptions": []});
        let err = install_app(&db, &clock, dir.path(), input).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidSpec { .. })));
    }

    #[test]
    fn duplicate_spec_and_space_is_rejected() {
        let (db, clock, dir) = setup();
        install_app(&db, &clock, dir.path(), install_input()).unwrap();
        let err = install_app(&db, &clock, dir.path(), install_input()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::AppAlreadyInstalled { .. })));
    }

    #[test]
    fn uninstall_reinstall_round_trip() {
        let (db, clock, dir) = setup();
        let app = install_app(&db, &clock, dir.path(), install_input()).unwrap();
        let uninstalled = uninstall_app(&db, &clock, &app.id).unwrap();
        assert_eq!(uninstalled.status, AppStatus::Uninstalled);
        assert!(uninstalled.uninstalled_at.is_some());

        let reinstalled = reinstall_app(&db, &app.id).unwrap();
        assert_eq!(reinstalled.status, AppStatus::Active);
        assert!(reinstalled.uninstalled_at.is_none());
    }

    #[test]
    fn delete_requires_uninstalled_first() {
        let (db, clock, dir) = setup();
        let app = install_app(&db, &clock, dir.path(), install_input()).unwrap();
        let err = delete_app(&db, dir.path(), &app.id).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::DeleteRequiresUninstalled(_))));

        uninstall_app(&db, &clock, &app.id).unwrap();
        delete_app(&db, dir.path(), &app.id).unwrap();
        assert!(repo::get_app(&db, &app.id).unwrap().is_none());
        assert!(!app_dir(dir.path(), &app.id).exists());
    }
}
