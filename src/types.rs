use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// One person found in a birth or baptism record.
///
/// Field names on the wire follow the extraction schema; every field may be
/// null or missing. Values of an unexpected shape are coerced rather than
/// rejected: scalars become text, a lone name becomes a one-element list and
/// anything else is treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRecord {
    #[serde(rename = "nombreCompleto", deserialize_with = "lenient_text")]
    pub full_name: Option<String>,
    #[serde(rename = "fechaNacimiento", deserialize_with = "lenient_text")]
    pub birth_date: Option<String>,
    #[serde(rename = "fechaBautismo", deserialize_with = "lenient_text")]
    pub baptism_date: Option<String>,
    #[serde(rename = "nombrePadre", deserialize_with = "lenient_text")]
    pub father_name: Option<String>,
    #[serde(rename = "nombreMadre", deserialize_with = "lenient_text")]
    pub mother_name: Option<String>,
    #[serde(rename = "abuelosPaternos", deserialize_with = "lenient_names")]
    pub paternal_grandparents: Option<Vec<String>>,
    #[serde(rename = "abuelosMaternos", deserialize_with = "lenient_names")]
    pub maternal_grandparents: Option<Vec<String>>,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn lenient_names<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(items.into_iter().filter_map(scalar_text).collect()),
        other => scalar_text(other).map(|name| vec![name]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ExtractedRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scalars_become_text() {
        let parsed = record(json!({
            "nombreCompleto": "Ana Ruiz",
            "fechaNacimiento": 1890,
            "fechaBautismo": true,
        }));
        assert_eq!(parsed.full_name.as_deref(), Some("Ana Ruiz"));
        assert_eq!(parsed.birth_date.as_deref(), Some("1890"));
        assert_eq!(parsed.baptism_date.as_deref(), Some("true"));
    }

    #[test]
    fn lone_grandparent_string_becomes_a_list() {
        let parsed = record(json!({ "abuelosPaternos": "Juan y Rosa" }));
        assert_eq!(parsed.paternal_grandparents, Some(vec!["Juan y Rosa".to_string()]));
    }

    #[test]
    fn unexpected_shapes_are_absent() {
        let parsed = record(json!({
            "nombrePadre": ["x"],
            "nombreMadre": { "nombre": "Lucía" },
            "abuelosMaternos": { "abuelo": "Pedro" },
            "abuelosPaternos": ["Juan", null, 3],
        }));
        assert_eq!(parsed.father_name, None);
        assert_eq!(parsed.mother_name, None);
        assert_eq!(parsed.maternal_grandparents, None);
        assert_eq!(
            parsed.paternal_grandparents,
            Some(vec!["Juan".to_string(), "3".to_string()])
        );
    }

    #[test]
    fn missing_and_null_fields_are_absent() {
        assert_eq!(record(json!({ "fechaNacimiento": null })), ExtractedRecord::default());
    }
}
