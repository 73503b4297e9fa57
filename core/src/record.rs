use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// One usage record as stored in the document store.
///
/// Every field is optional. Unknown fields are ignored so documents written
/// by newer converters still load, and a field holding the wrong JSON type
/// loads as absent instead of rejecting the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingRecord {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub global_user_name: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub local_user_id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vo_issuer: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vo_name: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vo_attrs: Option<Vec<VoAttribute>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cpu_duration: Option<f64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub wall_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoAttribute {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Field deserializer that turns a value of the wrong type into `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Treats an empty string the same as a missing field.
pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

impl AccountingRecord {
    /// Label used when reporting a rejected record.
    pub fn display_id(&self) -> &str {
        present(&self.record_id).unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_sparse_document_and_ignores_unknown_fields() {
        let doc = json!({
            "type": "usagerecord",
            "record_id": "gsiftp://example.org/jobs/1",
            "create_time": "2009-07-07 09:06:52",
            "machine_name": "benedict.grid.aau.dk",
            "vo_attrs": [{"group": "atlas", "role": "production"}],
            "wall_duration": 1,
            "convert_version": 4
        });
        let record: AccountingRecord = serde_json::from_value(doc).expect("record");

        assert_eq!(record.display_id(), "gsiftp://example.org/jobs/1");
        assert_eq!(record.machine_name.as_deref(), Some("benedict.grid.aau.dk"));
        assert_eq!(record.wall_duration, Some(1.0));
        assert_eq!(record.cpu_duration, None);
        assert_eq!(record.end_time, None);
        let attrs = record.vo_attrs.expect("vo attrs");
        assert_eq!(attrs[0].group.as_deref(), Some("atlas"));
    }

    #[test]
    fn null_durations_load_as_missing() {
        let record: AccountingRecord =
            serde_json::from_value(json!({"cpu_duration": null})).expect("record");
        assert_eq!(record.cpu_duration, None);
        assert_eq!(record.display_id(), "<unknown>");
    }

    #[test]
    fn wrongly_typed_fields_load_as_missing() {
        let record: AccountingRecord = serde_json::from_value(json!({
            "create_time": "2021-01-01",
            "machine_name": 123,
            "cpu_duration": "10",
            "wall_duration": 5,
            "vo_attrs": {},
        }))
        .expect("record");

        assert_eq!(record.create_time.as_deref(), Some("2021-01-01"));
        assert_eq!(record.machine_name, None);
        assert_eq!(record.cpu_duration, None);
        assert_eq!(record.wall_duration, Some(5.0));
        assert_eq!(record.vo_attrs, None);

        let record: AccountingRecord = serde_json::from_value(json!({
            "vo_attrs": [{"group": ["atlas"], "role": "pilot"}],
        }))
        .expect("record");
        let attrs = record.vo_attrs.expect("vo attrs");
        assert_eq!(attrs[0].group, None);
        assert_eq!(attrs[0].role.as_deref(), Some("pilot"));
    }

    #[test]
    fn empty_strings_are_not_present() {
        assert_eq!(present(&Some(String::new())), None);
        assert_eq!(present(&Some("h1".to_string())), Some("h1"));
        assert_eq!(present(&None), None);
    }
}
