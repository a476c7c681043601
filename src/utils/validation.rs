use crate::utils::error::{DelegateError, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<Url> {
    if url_str.is_empty() {
        return Err(DelegateError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            "http" | "https" => Err(DelegateError::InvalidConfigValue {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: "URL has no host".to_string(),
            }),
            scheme => Err(DelegateError::InvalidConfigValue {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(DelegateError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DelegateError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

static CONTAINER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]*$").expect("valid regex"));

/// Container ids name scratch files, so they follow the CNI grammar: no
/// separators and no leading `.`, which keeps them apart from the store's
/// own dot-prefixed working files.
pub fn validate_container_id(container_id: &str) -> Result<()> {
    validate_non_empty_string("CNI_CONTAINERID", container_id)?;

    if !CONTAINER_ID_PATTERN.is_match(container_id) {
        return Err(DelegateError::InvalidConfigValue {
            field: "CNI_CONTAINERID".to_string(),
            value: container_id.to_string(),
            reason: "Container id must start with an alphanumeric character and contain only \
                     alphanumerics, '_', '.' or '-'"
                .to_string(),
        });
    }
    Ok(())
}
