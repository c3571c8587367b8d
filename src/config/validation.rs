use crate::config::types::{
    Config, CrawlerConfig, IndexConfig, OutputConfig, PolicyConfig, RewriteConfig, SiteConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_policy_config(&config.policy)?;
    validate_index_config(&config.index)?;
    validate_rewrite_config(&config.rewrite)?;
    Ok(())
}

/// Validates the remote site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    validate_origin(&config.origin, "origin")?;

    if config.hostnames.is_empty() {
        return Err(ConfigError::Validation(
            "site.hostnames must list at least one hostname".to_string(),
        ));
    }

    for hostname in &config.hostnames {
        validate_hostname(hostname)?;
    }
    validate_hostname(&config.authoring_hostname)?;
    validate_hostname(&config.public_hostname)?;

    // A username alone is fine: the binary may fill the password from the environment
    if config.password.is_some() && config.username.is_none() {
        return Err(ConfigError::Validation(
            "site.password is set without site.username".to_string(),
        ));
    }

    if let Some(marker) = &config.query_marker {
        if marker.is_empty() || marker.starts_with('?') {
            return Err(ConfigError::Validation(format!(
                "site.query-marker must be non-empty and without a leading '?', got '{}'",
                marker
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.entry_routes.is_empty() {
        return Err(ConfigError::Validation(
            "crawler.entry-routes cannot be empty".to_string(),
        ));
    }

    for route in &config.entry_routes {
        validate_site_path(route, "crawler.entry-routes")?;
    }

    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation(
            "output.root cannot be empty".to_string(),
        ));
    }

    if config.root.trim_end_matches('/').is_empty() {
        return Err(ConfigError::Validation(
            "output.root cannot be the filesystem root".to_string(),
        ));
    }

    Ok(())
}

fn validate_policy_config(config: &PolicyConfig) -> Result<(), ConfigError> {
    validate_site_path(&config.not_found_path, "policy.not-found-path")?;
    validate_site_path(&config.restricted_prefix, "policy.restricted-prefix")?;
    for path in &config.always_redownload {
        validate_site_path(path, "policy.always-redownload")?;
    }
    Ok(())
}

fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    for collection in &config.collections {
        validate_site_path(collection, "index.collections")?;
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "index.page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if let Some(origin) = &config.events_origin {
        validate_origin(origin, "index.events-origin")?;
    }

    validate_site_path(&config.events_prefix, "index.events-prefix")?;

    Ok(())
}

fn validate_rewrite_config(config: &RewriteConfig) -> Result<(), ConfigError> {
    for rel in &config.rel_allow {
        if config.rel_deny.iter().any(|d| d.eq_ignore_ascii_case(rel)) {
            return Err(ConfigError::Validation(format!(
                "relation type '{}' is both allowed and denied",
                rel
            )));
        }
    }

    for path in &config.literal_passthrough {
        validate_site_path(path, "rewrite.literal-passthrough")?;
    }

    Ok(())
}

/// Validates an http(s) origin URL
fn validate_origin(origin: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(origin)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, origin, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, origin
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, origin
        )));
    }

    Ok(())
}

/// Validates a site path such as "/404.html"
fn validate_site_path(path: &str, field: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "{} entries must start with '/', got '{}'",
            field, path
        )));
    }

    if path.contains(['?', '#']) {
        return Err(ConfigError::Validation(format!(
            "{} entries cannot carry a query or fragment, got '{}'",
            field, path
        )));
    }

    Ok(())
}

/// Validates a hostname, optionally followed by a port
fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    if hostname.is_empty() {
        return Err(ConfigError::InvalidHostname(
            "Hostname cannot be empty".to_string(),
        ));
    }

    let host = match hostname.rsplit_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::InvalidHostname(format!(
                    "Hostname '{}' has an invalid port",
                    hostname
                )));
            }
            host
        }
        None => hostname,
    };

    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidHostname(format!(
            "Hostname '{}' contains invalid characters",
            hostname
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidHostname(format!(
            "Hostname '{}' cannot start or end with '.' or '-'",
            hostname
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidHostname(format!(
            "Hostname '{}' cannot contain consecutive dots",
            hostname
        )));
    }

    Ok(())
}
