/// Environment variable names read by this crate.
///
/// These are purely helpers; the core types take explicit values and stay
/// decoupled from environment access.

/// `"true"` selects JSON rendering; anything else selects plain rendering.
pub const JSON_LOGGING_ENV: &str = "JSON_LOGGING";

/// Path of the ECS container metadata file. Unset outside ECS.
pub const ECS_CONTAINER_METADATA_FILE_ENV: &str = "ECS_CONTAINER_METADATA_FILE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty the same way.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
