use axum::extract::Multipart;
use pubmed_flow::{FlowError, IntentParams, Upload};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub download_dir: String,
    pub auth_required: bool,
}

/// Reads a translate form: a `file` part or a `text` field, plus the target
/// language under `targetLang` or `targetLanguage`. Unknown parts are skipped.
pub async fn read_translate_form(mut multipart: Multipart) -> Result<IntentParams, FlowError> {
    let mut params = IntentParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FlowError::invalid(format!("Malformed upload: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| FlowError::invalid(format!("Malformed upload: {}", e.body_text())))?;
                params.upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "text" | "targetLang" | "targetLanguage" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| FlowError::invalid(format!("Malformed upload: {}", e.body_text())))?;
                if name == "text" {
                    params.text = Some(value);
                } else {
                    params.target_language = Some(value);
                }
            }
            _ => continue,
        }
    }

    Ok(params)
}
