use super::{
    Content, GeminiError, GeminiResult, GenerateContentRequest, GenerationConfig,
    GenerativeBackend, InlineData, Part,
};
use crate::types::ExtractedRecord;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::sync::Arc;

pub const EXTRACTION_PROMPT: &str = "Analyze this document image, which is likely a baptism or birth certificate. \
Extract the key information for all individuals found based on the provided JSON schema. \
The document may be in Spanish. Be precise and return a JSON array of objects. \
If a value is not found, return null. The names for grandparents should be an array of strings.";

/// Every property of the person schema, in declaration order.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "nombreCompleto",
    "fechaNacimiento",
    "fechaBautismo",
    "nombrePadre",
    "nombreMadre",
    "abuelosPaternos",
    "abuelosMaternos",
];

fn string_field(description: &str) -> Value {
    json!({ "type": "STRING", "nullable": true, "description": description })
}

fn names_field(description: &str) -> Value {
    json!({
        "type": "ARRAY",
        "nullable": true,
        "items": { "type": "STRING" },
        "description": description,
    })
}

/// Response schema: an array of people, each with all seven keys present but nullable.
pub fn document_schema() -> Value {
    let person = json!({
        "type": "OBJECT",
        "properties": {
            "nombreCompleto": string_field("Full name of the person, including first name and surnames."),
            "fechaNacimiento": string_field("Date of birth (e.g., YYYY-MM-DD). Null if not found."),
            "fechaBautismo": string_field("Date of baptism (e.g., YYYY-MM-DD). Null if not found."),
            "nombrePadre": string_field("Full name of the father. Null if not found."),
            "nombreMadre": string_field("Full name of the mother. Null if not found."),
            "abuelosPaternos": names_field("Names of paternal grandparents. Null if not found."),
            "abuelosMaternos": names_field("Names of maternal grandparents. Null if not found."),
        },
        "required": REQUIRED_FIELDS,
        "propertyOrdering": REQUIRED_FIELDS,
    });

    json!({ "type": "ARRAY", "items": person })
}

/// Wraps raw image bytes as an inline-data part.
pub fn inline_image_part(image: &[u8], mime_type: &str) -> Part {
    Part::InlineData(InlineData {
        mime_type: mime_type.to_string(),
        data: BASE64.encode(image),
    })
}

/// Parses the model's JSON answer. A lone object means exactly one person was
/// found and is wrapped in a one-element list. Array elements are taken as
/// they come; fields of an unexpected shape are coerced by [`ExtractedRecord`]
/// and elements that are not objects become empty records.
pub fn parse_records(text: &str) -> GeminiResult<Vec<ExtractedRecord>> {
    let trimmed = text.trim();
    let malformed = |err: serde_json::Error| {
        tracing::error!(response = %trimmed, "failed to parse extraction response");
        GeminiError::MalformedOutput(err)
    };

    let items = match serde_json::from_str::<Value>(trimmed).map_err(malformed)? {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(malformed(serde::de::Error::custom(
                "expected a JSON object or array",
            )));
        }
    };

    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

/// Schema-constrained image-to-records extraction.
#[derive(Clone)]
pub struct ExtractionClient {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
}

impl ExtractionClient {
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn build_request(image: &[u8], mime_type: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![
                inline_image_part(image, mime_type),
                Part::Text(EXTRACTION_PROMPT.to_string()),
            ])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(document_schema()),
            }),
        }
    }

    /// All-or-nothing: any transport, service or parse failure is returned as is.
    pub async fn analyze_document(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> GeminiResult<Vec<ExtractedRecord>> {
        let request = Self::build_request(image, mime_type);
        tracing::debug!(bytes = image.len(), %mime_type, model = %self.model, "analyzing document");
        let response = self.backend.generate_content(&self.model, &request).await?;
        let records = parse_records(&response.into_text()?)?;
        tracing::debug!(count = records.len(), "extraction finished");
        Ok(records)
    }
}
