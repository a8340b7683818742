// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Environment variables read at startup
pub mod env {
    /// Path to the agent's YAML configuration file
    pub const CONFIG_PATH: &str = "SECRETSYNC_CONFIG";
    /// Filter directives for tracing output
    pub const LOG_FILTER: &str = "SECRETSYNC_LOG";
}

/// Filesystem modes used when materializing secrets
pub mod modes {
    /// Mode of a client directory when we have to create it
    pub const CLIENT_DIR: u32 = 0o775;
    /// Mode of a secret file when the server does not specify one
    pub const DEFAULT_FILE: u32 = 0o440;
    /// Permission bits we record and compare (drops file type bits)
    pub const PERMISSION_MASK: u32 = 0o7777;
}

/// Poll loop timing
pub mod poll {
    /// Jitter adds up to interval / JITTER_DIVISOR on top of the base interval
    pub const JITTER_DIVISOR: u32 = 4;
}

/// Secret service client settings
pub mod remote {
    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
    /// Endpoint listing secret metadata
    pub const LIST_PATH: &str = "secrets";
    /// Endpoint prefix for a single secret
    pub const SECRET_PATH: &str = "secret";
}

/// statfs magic numbers for the filesystems secrets may be pinned to
pub mod fs_magic {
    pub const TMPFS: i64 = 0x0102_1994;
    pub const RAMFS: i64 = 0x8584_58f6;
}
