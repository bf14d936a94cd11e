use reqwest::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("not a URL: {0}")]
    Malformed(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Pull the target reference out of free text: everything from the first
/// `http` onwards. Text without `http` is returned whole so validation can
/// reject it.
pub fn extract_target(text: &str) -> &str {
    match text.find("http") {
        Some(start) => text[start..].trim(),
        None => text.trim(),
    }
}

/// Accept only well-formed http(s) URLs with a host.
pub fn validate_target(candidate: &str) -> Result<Url, TargetError> {
    let url = Url::parse(candidate).map_err(|e| TargetError::Malformed(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(TargetError::MissingHost),
    }
}
