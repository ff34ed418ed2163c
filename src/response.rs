use serde::{Deserialize, Serialize};

use crate::errors::RpcError;

/// Envelope for the reply to an [`RpcRequest`](crate::RpcRequest).
///
/// Exactly one of `result` and `error` is set by a well-behaved server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    id: u64,
    result: Option<Vec<u8>>,
    error: Option<String>,
}

impl RpcResponse {
    pub fn new(id: u64, result: Option<Vec<u8>>, error: Option<String>) -> Self {
        Self { id, result, error }
    }

    pub fn from_result(id: u64, result: Result<Vec<u8>, RpcError>) -> Self {
        match result {
            Ok(data) => Self::new(id, Some(data), None),
            Err(e) => Self::new(id, None, Some(e.to_string())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn result(&self) -> Option<&Vec<u8>> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&String> {
        self.error.as_ref()
    }

    /// Converts the envelope into the payload the caller asked for.
    pub fn into_result(self) -> Result<Vec<u8>, RpcError> {
        match (self.result, self.error) {
            (Some(data), None) => Ok(data),
            (None, Some(err_msg)) => Err(RpcError::ServerError(err_msg)),
            _ => Err(RpcError::StreamError("Invalid response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_maps_error_to_message() {
        let resp = RpcResponse::from_result(7, Err(RpcError::UnknownMethod("nope".into())));
        assert_eq!(resp.id(), 7);
        assert!(resp.result().is_none());
        assert_eq!(resp.error(), Some(&"Unknown method: nope".to_string()));
    }

    #[test]
    fn into_result_rejects_empty_envelope() {
        let resp = RpcResponse::new(1, None, None);
        assert!(matches!(resp.into_result(), Err(RpcError::StreamError(_))));
    }

    #[test]
    fn into_result_surfaces_server_error() {
        let resp = RpcResponse::new(1, None, Some("boom".into()));
        assert!(matches!(resp.into_result(), Err(RpcError::ServerError(msg)) if msg == "boom"));
    }
}
