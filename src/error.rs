use thiserror::Error;

/// Problems that keep the assistant from starting at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("configuration errors:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Failures reported by the HTTP-based providers (chat, calendar, language model).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned an empty response")]
    Empty { provider: &'static str },
}
