use crate::config::{Config, Credentials, Endpoints, TransportConfig};
use crate::error::{Error, Result};
use url::Url;

/// Validates the account credentials
pub fn validate_credentials(credentials: &Credentials) -> Result<()> {
    if credentials.username.trim().is_empty() {
        return Err(Error::ConfigInvalid("Username is empty".to_string()));
    }

    if credentials.password.is_empty() {
        return Err(Error::ConfigInvalid("Password is empty".to_string()));
    }

    Ok(())
}

/// Validates that every endpoint is an absolute http(s) URL
pub fn validate_endpoints(endpoints: &Endpoints) -> Result<()> {
    let named = [
        ("baseUrl", &endpoints.base_url),
        ("homeUrl", &endpoints.home_url),
        ("loginUrl", &endpoints.login_url),
        ("serverListUrl", &endpoints.server_list_url),
    ];

    for (name, value) in named {
        let url = Url::parse(value)
            .map_err(|e| Error::ConfigInvalid(format!("{} '{}' is not a valid URL: {}", name, value, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::ConfigInvalid(format!(
                "{} '{}' must use http or https",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates retry settings
pub fn validate_transport(transport: &TransportConfig) -> Result<()> {
    if transport.max_retries == 0 {
        return Err(Error::ConfigInvalid(
            "maxRetries must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_credentials(&config.credentials)?;
    validate_endpoints(&config.endpoints)?;
    validate_transport(&config.transport)?;

    Ok(())
}
