use serde::{Deserialize, Serialize};

/// Envelope for a single remote procedure call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    id: u64,
    method: String,
    params: Vec<u8>,
}

impl RpcRequest {
    pub fn new(id: u64, method: String, params: Vec<u8>) -> Self {
        Self { id, method, params }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn into_params(self) -> Vec<u8> {
        self.params
    }
}
