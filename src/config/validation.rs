use crate::config::types::{
    AssetStorageConfig, AssetStorageKind, AssetsConfig, Config, CrawlerConfig, FetchConfig,
    OutputConfig, SupervisorConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_assets_config(&config.assets)?;
    validate_supervisor_config(&config.supervisor, &config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_asset_storage_config(&config.asset_storage)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.global_concurrency < 1 || config.global_concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "global_concurrency must be between 1 and 256, got {}",
            config.global_concurrency
        )));
    }

    if config.domain_concurrency < 1 || config.domain_concurrency > config.global_concurrency {
        return Err(ConfigError::Validation(format!(
            "domain_concurrency must be between 1 and global_concurrency ({}), got {}",
            config.global_concurrency, config.domain_concurrency
        )));
    }

    if config.crawl_budget_secs < 1 {
        return Err(ConfigError::Validation(
            "crawl_budget_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "initial_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_assets_config(config: &AssetsConfig) -> Result<(), ConfigError> {
    if config.workers < 1 {
        return Err(ConfigError::Validation(format!(
            "asset workers must be >= 1, got {}",
            config.workers
        )));
    }

    if config.download_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "download_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_asset_bytes < 1 {
        return Err(ConfigError::Validation(
            "max_asset_bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// The hard run timeout must leave room for the softer crawl budget
fn validate_supervisor_config(
    config: &SupervisorConfig,
    crawler: &CrawlerConfig,
) -> Result<(), ConfigError> {
    if config.run_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "run_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.run_timeout_secs < crawler.crawl_budget_secs {
        return Err(ConfigError::Validation(format!(
            "run_timeout_secs ({}) must be >= crawl_budget_secs ({})",
            config.run_timeout_secs, crawler.crawl_budget_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Each storage kind needs its own location setting
fn validate_asset_storage_config(config: &AssetStorageConfig) -> Result<(), ConfigError> {
    match config.kind {
        AssetStorageKind::Disabled => Ok(()),
        AssetStorageKind::Directory => match config.directory.as_deref() {
            Some(dir) if !dir.is_empty() => Ok(()),
            _ => Err(ConfigError::Validation(
                "asset-storage kind \"directory\" requires a directory".to_string(),
            )),
        },
        AssetStorageKind::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "asset-storage kind \"http\" requires an endpoint".to_string(),
                )
            })?;
            let url = Url::parse(endpoint)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(format!(
                    "Asset endpoint '{}' must use http or https",
                    endpoint
                )));
            }
            Ok(())
        }
    }
}
