// Error taxonomy shared by the calendar, FX and deal pipeline components

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TripError {
    // Non-success status (or no response at all) from a fetch collaborator
    #[error("Upstream unavailable: {service} ({})", describe_status(.status, .message))]
    UpstreamUnavailable {
        service: String,
        status: Option<u16>,
        message: String,
    },

    // Well-formed response lacking a field we depend on
    #[error("Missing data: {0}")]
    DataMissing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Cache store error: {0}")]
    StoreError(String),
}

fn describe_status(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code) if message.is_empty() => format!("status {}", code),
        Some(code) => format!("status {}: {}", code, message),
        None => message.to_string(),
    }
}

impl TripError {
    pub fn upstream(service: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        TripError::UpstreamUnavailable {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, TripError::UpstreamUnavailable { .. })
    }

    pub fn is_data_missing(&self) -> bool {
        matches!(self, TripError::DataMissing(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, TripError::InvalidArgument(_))
    }
}

impl From<serde_json::Error> for TripError {
    fn from(err: serde_json::Error) -> Self {
        TripError::JsonParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_includes_status() {
        let err = TripError::upstream("fx", Some(503), "");
        assert_eq!(err.to_string(), "Upstream unavailable: fx (status 503)");
        assert!(err.is_upstream());
        assert!(!err.is_data_missing());
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let err = TripError::upstream("flight-search", None, "connection refused");
        assert_eq!(
            err.to_string(),
            "Upstream unavailable: flight-search (connection refused)"
        );
    }

    #[test]
    fn test_json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: TripError = parse.unwrap_err().into();
        assert!(matches!(err, TripError::JsonParseError(_)));
    }
}
