use std::collections::BTreeMap;

/// Failure taxonomy of the core. Every variant is terminal: nothing here is
/// retried, a caller either fixes its input or fixes the environment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {}", format_field_errors(.field_errors))]
    InvalidRequest {
        field_errors: BTreeMap<String, String>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("instance already running: {0}")]
    AlreadyRunning(String),

    #[error("generation failed: {0}")]
    GenerationFailed(#[source] std::io::Error),

    #[error("packaging failed: {0}")]
    PackagingFailed(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

impl Error {
    pub fn invalid_request(field_errors: BTreeMap<String, String>) -> Self {
        Self::InvalidRequest { field_errors }
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.to_string(), message.into());
        Self::InvalidRequest { field_errors }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

fn format_field_errors(field_errors: &BTreeMap<String, String>) -> String {
    field_errors
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_lists_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("bot_name".to_string(), "Required.".to_string());
        fields.insert("command_prefix".to_string(), "Too long.".to_string());
        let err = Error::invalid_request(fields);
        let msg = err.to_string();
        assert!(msg.contains("bot_name: Required."));
        assert!(msg.contains("command_prefix: Too long."));
    }

    #[test]
    fn not_found_names_the_subject() {
        let err = Error::not_found("template: nope");
        assert_eq!(err.to_string(), "not found: template: nope");
    }
}
