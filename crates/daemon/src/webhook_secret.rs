// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's `SecretResolver`: one shared HMAC secret (`HALO_WEBHOOK_SECRET`)
//! applied to every webhook path, or none at all.

use halo_bus::sources::SecretResolver;

pub struct SharedSecret(pub Option<Vec<u8>>);

impl SecretResolver for SharedSecret {
    fn secret_for(&self, _path: &str) -> Option<Vec<u8>> {
        self.0.clone()
    }
}
