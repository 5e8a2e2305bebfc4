use serde::{Deserialize, Serialize};

/// An SMS station as listed by `/sections/{id}/devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub client_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    /// Free text, usually "<station>, <city>" or "<code>, <country>".
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
}

impl Device {
    pub fn display_name(&self) -> &str {
        match self.device_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.client_id,
        }
    }
}

/// Per-section totals from `/sections/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStat {
    pub section_id: String,
    pub section_name: String,
    #[serde(default)]
    pub sms_count: u32,
    #[serde(default)]
    pub active_sms: u32,
    #[serde(default)]
    pub cumulative_volume_flow: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_decodes_with_sparse_fields() {
        let d: Device = serde_json::from_str(
            r#"{"id": 7, "client_id": "SMS-I-007", "location": null, "is_active": true}"#,
        )
        .unwrap();

        assert_eq!(d.id, 7);
        assert_eq!(d.location, None);
        assert_eq!(d.display_name(), "SMS-I-007");
    }

    #[test]
    fn display_name_prefers_device_name() {
        let d = Device {
            id: 1,
            client_id: "SMS-I-001".to_string(),
            device_name: Some("Shujabad".to_string()),
            device_type: None,
            location: None,
            is_active: true,
            last_seen: None,
        };
        assert_eq!(d.display_name(), "Shujabad");
    }
}
