use crate::config::ProjectConfig;

/// Hash of the build configuration.
/// A different value between two compiles invalidates every emitted output.
pub fn hash_config(config: &ProjectConfig) -> String {
    // JSON keeps the hash stable across runs; IndexMap preserves key order
    let json = serde_json::to_vec(config).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
