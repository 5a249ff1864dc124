//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5639
    }
}

// ============================================================================
// [cache] Section Defaults
// ============================================================================

pub mod cache {
    /// One day, shared by per-app and compiled-instruction entries.
    pub fn ttl_secs() -> u64 {
        60 * 60 * 24
    }

    pub fn swr_secs() -> u64 {
        0
    }
}

// ============================================================================
// [playground] Section Defaults
// ============================================================================

pub mod playground {
    pub fn hook_command() -> Vec<String> {
        vec!["node".into()]
    }
}

// ============================================================================
// [dev] Section Defaults
// ============================================================================

pub mod dev {
    pub fn command() -> Vec<String> {
        vec!["npm".into(), "run".into(), "dev".into()]
    }

    pub fn health_timeout_secs() -> u64 {
        30
    }
}
