use serde::Serialize;

/// `client_type` of bundle-identifier clients; path clients are stored with the same value.
pub const CLIENT_TYPE_BUNDLE_ID: i64 = 0;

/// One row of the `access` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub service: String,
    pub client: String,
    pub client_type: i64,
    pub allowed: bool,
    pub prompt_count: i64,
    pub csreq: Option<Vec<u8>>,
}

impl AccessRecord {
    #[must_use]
    pub fn allowed(service: &str, client: &str) -> Self {
        Self {
            service: service.to_string(),
            client: client.to_string(),
            client_type: CLIENT_TYPE_BUNDLE_ID,
            allowed: true,
            prompt_count: 1,
            csreq: None,
        }
    }

    /// A denied record; `prompt_count` stays at 1 so the OS does not prompt again.
    #[must_use]
    pub fn denied(service: &str, client: &str) -> Self {
        Self {
            allowed: false,
            ..Self::allowed(service, client)
        }
    }
}
