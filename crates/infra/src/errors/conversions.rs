//! Conversions from external infrastructure errors into domain errors.

use dotenvy::Error as DotenvError;
use policylink_domain::PceError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PceError);

impl From<InfraError> for PceError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PceError> for InfraError {
    fn from(value: PceError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPceError {
    fn into_pce(self) -> PceError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PceError */
/* -------------------------------------------------------------------------- */

impl IntoPceError for HttpError {
    fn into_pce(self) -> PceError {
        let target = self.url().map(|url| format!(" ({url})")).unwrap_or_default();

        if self.is_timeout() {
            return PceError::Transport(format!("HTTP request timed out{target}"));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return PceError::Transport(format!("HTTP connection failure{target}: {self}"));
        }

        if self.is_builder() {
            return PceError::Transport(format!("invalid HTTP request{target}: {self}"));
        }

        if self.is_body() || self.is_decode() {
            return PceError::Transport(format!("failed to read HTTP response body{target}"));
        }

        PceError::Transport(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_pce())
    }
}

/* -------------------------------------------------------------------------- */
/* dotenvy::Error → PceError */
/* -------------------------------------------------------------------------- */

impl IntoPceError for DotenvError {
    fn into_pce(self) -> PceError {
        match self {
            DotenvError::LineParse(line, index) => {
                PceError::Config(format!(".env line could not be parsed at {index}: {line}"))
            }
            DotenvError::Io(err) => PceError::Config(format!("failed to read .env file: {err}")),
            other => PceError::Config(format!(".env error: {other}")),
        }
    }
}

impl From<DotenvError> for InfraError {
    fn from(value: DotenvError) -> Self {
        InfraError(value.into_pce())
    }
}

/* -------------------------------------------------------------------------- */
/* Config file formats → PceError */
/* -------------------------------------------------------------------------- */

impl IntoPceError for toml::de::Error {
    fn into_pce(self) -> PceError {
        PceError::Config(format!("Invalid TOML format: {self}"))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(value.into_pce())
    }
}

impl IntoPceError for serde_json::Error {
    fn into_pce(self) -> PceError {
        PceError::Config(format!(
            "Invalid JSON format at line {} column {}: {self}",
            self.line(),
            self.column()
        ))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_pce())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
