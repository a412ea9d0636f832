//! Reads the optional TOML config file named in spec.md §6 and layers it
//! under whatever the CLI/env overlay supplies. Grounded on the teacher's
//! `bootstrap::bootstrap` (same file-then-overlay order), adapted to the
//! `toml` crate since gateway config here isn't DSN-shaped like the
//! teacher's storage bootstrap.

use std::path::Path;

use relaygate_common::GatewayConfig;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let Some(path) = path else {
        return Ok(GatewayConfig::default());
    };
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed reading config file {}: {e}", path.display()))?;
    let config: GatewayConfig = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed parsing config file {}: {e}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_returns_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn nonexistent_file_errors() {
        let err = load_config(Some(Path::new("/does/not/exist.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
