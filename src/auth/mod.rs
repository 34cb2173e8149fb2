// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer JWT authentication for the wallet API. Token issuance lives in
//! the upstream identity service; this module only verifies what arrives
//! in the `Authorization` header.
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <JWT>`
//! 2. Server:
//!    - Verifies signature (HS256, `WALLET_JWT_SECRET`) when a secret is
//!      configured; otherwise validates structure and expiry only
//!      (development mode)
//!    - Extracts `sub` → canonical `user_id`
//!
//! ## Security
//!
//! - The watch registration endpoint requires authentication; the webhook
//!   callback and housekeeping endpoints do not (the webhook is correlated
//!   by record, housekeeping is operator/network-restricted)
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::Auth;
