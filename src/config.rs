// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3018` |
//! | `DATA_DIR` | Directory holding the watcher registry database | `/data` |
//! | `DHIWAY_API_BASE_URL` | Dhiway wallet service base URL | Required |
//! | `DHIWAY_API_TOKEN` | Service bearer token for Dhiway API calls | Required |
//! | `DHIWAY_REQUEST_TIMEOUT_SECS` | Per-request timeout for Dhiway calls | `15` |
//! | `WATCH_CALLBACK_BASE_URL` | Public base URL of this service | `http://localhost:3018` |
//! | `WATCH_SETTLE_DELAY_SECS` | Settle delay before processing a watch callback | `7` |
//! | `RECONCILE_INTERVAL_SECS` | Interval between reconciliation sweeps | `300` |
//! | `RECONCILE_CHUNK_SIZE` | Default batch size per reconciliation run | `100` |
//! | `WALLET_JWT_SECRET` | HS256 secret for bearer token verification | Unset (dev decode) |
//! | `WALLET_JWT_ISSUER` | Expected JWT issuer claim | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the data directory path.
///
/// The watcher registry database file ([`WATCHER_DB_FILE`]) lives directly
/// under this directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default data directory when [`DATA_DIR_ENV`] is not set.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// File name of the embedded watcher registry database.
pub const WATCHER_DB_FILE: &str = "watchers.redb";

/// Environment variable for the public base URL of this service.
///
/// Used to derive the default callback URL handed to Dhiway when the caller
/// does not supply one: `{base}/api/wallet/vcs/watch/callback`.
pub const CALLBACK_BASE_URL_ENV: &str = "WATCH_CALLBACK_BASE_URL";

/// Default public base URL (local development).
pub const DEFAULT_CALLBACK_BASE_URL: &str = "http://localhost:3018";

/// Path of the watch callback webhook, appended to the public base URL.
pub const WATCH_CALLBACK_PATH: &str = "/api/wallet/vcs/watch/callback";

/// Environment variable for the callback settle delay in seconds.
pub const SETTLE_DELAY_ENV: &str = "WATCH_SETTLE_DELAY_SECS";

/// Default settle delay applied before processing a watch callback.
///
/// Gives the Dhiway side time to finish updating the credential record
/// before we read or forward anything derived from it.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 7;

/// Environment variable for the reconciliation sweep interval in seconds.
pub const RECONCILE_INTERVAL_ENV: &str = "RECONCILE_INTERVAL_SECS";

/// Default interval between reconciliation sweeps.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Environment variable for the default reconciliation chunk size.
pub const RECONCILE_CHUNK_ENV: &str = "RECONCILE_CHUNK_SIZE";

/// Default number of credentials processed per reconciliation run.
pub const DEFAULT_RECONCILE_CHUNK_SIZE: usize = 100;

/// Maximum number of concurrent outbound watch registrations per run.
pub const RECONCILE_WORKER_CAP: usize = 8;

/// Environment variable for the HS256 JWT verification secret.
pub const JWT_SECRET_ENV: &str = "WALLET_JWT_SECRET";

/// Environment variable for the expected JWT issuer claim.
pub const JWT_ISSUER_ENV: &str = "WALLET_JWT_ISSUER";
