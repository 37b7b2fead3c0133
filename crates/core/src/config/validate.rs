use super::types::{ActionMode, ClientBackend, Config, ConfigError};

/// Validate semantic constraints the type system cannot express.
///
/// Called once at startup; any failure is a fatal configuration error.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&config.matching.size_fuzz) {
        return Err(ConfigError::Invalid(format!(
            "matching.size_fuzz must be in [0, 1), got {}",
            config.matching.size_fuzz
        )));
    }
    if !(0.0..=1.0).contains(&config.matching.partial_threshold) {
        return Err(ConfigError::Invalid(format!(
            "matching.partial_threshold must be in [0, 1], got {}",
            config.matching.partial_threshold
        )));
    }
    if config.search.concurrency == 0 {
        return Err(ConfigError::Invalid(
            "search.concurrency must be at least 1".to_string(),
        ));
    }

    for indexer in &config.indexers {
        if indexer.id.is_empty() {
            return Err(ConfigError::Invalid("indexer with empty id".to_string()));
        }
        if indexer.apikey.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "indexer '{}' has an empty apikey",
                indexer.id
            )));
        }
        if indexer.rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid(format!(
                "indexer '{}' has rate_limit_rpm = 0",
                indexer.id
            )));
        }
    }

    let mut ids: Vec<&str> = config.indexers.iter().map(|i| i.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != config.indexers.len() {
        return Err(ConfigError::Invalid("duplicate indexer ids".to_string()));
    }

    for arr in config.sonarr.iter().chain(&config.radarr) {
        if arr.apikey.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "arr instance '{}' has an empty apikey",
                arr.url
            )));
        }
    }

    if config.action.mode == ActionMode::Inject {
        if config.action.link_dir.is_none() {
            return Err(ConfigError::Invalid(
                "inject mode requires action.link_dir".to_string(),
            ));
        }
        let client = config
            .client
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("inject mode requires [client]".to_string()))?;
        match client.backend {
            ClientBackend::QBittorrent => {
                if client.qbittorrent.is_none() {
                    return Err(ConfigError::Invalid(
                        "client.backend = \"qbittorrent\" requires [client.qbittorrent]"
                            .to_string(),
                    ));
                }
            }
        }
    }

    for dir in config.sources.torrent_dirs.iter().chain(&config.sources.data_dirs) {
        if !dir.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "source directory does not exist: {}",
                dir.display()
            )));
        }
    }

    Ok(())
}
