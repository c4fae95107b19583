use serde::Serialize;
use serde_json::Value;

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// ==================== HOOK ACK ====================
/// Uniform webhook acknowledgement body. Benign duplicates answer 200 with
/// `skipped = true` so the provider does not retry them.
#[derive(Debug, Serialize)]
pub struct HookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, Value>,
}

impl HookAck {
    pub fn applied() -> Self {
        Self {
            success: true,
            skipped: None,
            reason: None,
            detail: serde_json::Map::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: Some(true),
            reason: Some(reason.into()),
            detail: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_sets_flag() {
        // Memastikan helper ApiResponse::success mengisi flag sukses
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }

    #[test]
    fn applied_ack_omits_skip_fields() {
        let ack = HookAck::applied().with("token_id", 7);
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["token_id"], 7);
        assert!(json.get("skipped").is_none());
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn skipped_ack_carries_reason() {
        // Memastikan duplikat tetap dijawab 200 dengan alasan skip
        let ack = HookAck::skipped("already processed");
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["skipped"], true);
        assert_eq!(json["reason"], "already processed");
    }
}
