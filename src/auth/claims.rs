// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal extracted from a verified bearer token.

/// The authenticated caller of a protected endpoint.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Canonical user ID (JWT `sub` claim).
    pub user_id: String,
    /// Token issuer (JWT `iss` claim).
    pub issuer: String,
    /// Expiry timestamp (JWT `exp` claim, seconds since epoch).
    pub expires_at: i64,
}
