//! # Feature: Image Editing
//!
//! Gemini powered image edits. A single instruction produces one request; a
//! context placement fans out into two concurrent variant requests.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.0.0: Initial release with Gemini `generateContent` integration

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::data_url::InlineImage;
use crate::error::EditError;

/// Appended to the instruction for the second fan-out variant.
pub const VARIANT_DIRECTIVE: &str = "Use exactly the same model (if any) and the same setting. All background details, lighting and environment must be identical. Only slightly change the model's pose or the product's angle to create a different look.";

/// A single remote edit. `Ok(None)` means the call went through but the
/// response carried no image part.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(&self, image: &InlineImage, instruction: &str) -> Result<Option<String>, EditError>;
}

/// Instruction texts issued for a request of `count` images.
pub fn variant_instructions(instruction: &str, count: usize) -> Vec<String> {
    if count <= 1 {
        return vec![instruction.to_string()];
    }
    let variants = vec![
        instruction.to_string(),
        format!("{} {}", instruction, VARIANT_DIRECTIVE),
    ];
    variants.into_iter().take(count).collect()
}

/// Runs one or more edits against `provider` and returns the produced data URLs.
///
/// With more than one variant every request is awaited. Any hard error fails
/// the whole call, even if other variants produced images. Variants that
/// produced nothing are dropped, and only an all-empty result is
/// `NoImageProduced`.
pub async fn generate_edits(
    provider: &dyn ImageProvider,
    image: &InlineImage,
    instruction: &str,
    count: usize,
) -> Result<Vec<String>, EditError> {
    let instructions = variant_instructions(instruction, count);

    if instructions.len() == 1 {
        return match provider.generate_image(image, &instructions[0]).await? {
            Some(data_url) => Ok(vec![data_url]),
            None => Err(EditError::NoImageProduced),
        };
    }

    info!("Fanning out {} variant requests", instructions.len());
    let settled = join_all(
        instructions
            .iter()
            .map(|text| provider.generate_image(image, text)),
    )
    .await;

    let mut produced = Vec::with_capacity(settled.len());
    for (variant, result) in settled.into_iter().enumerate() {
        match result {
            Ok(Some(data_url)) => produced.push(data_url),
            Ok(None) => warn!("Variant {} returned no image", variant),
            Err(e) => {
                error!("Variant {} failed, abandoning fan-out: {}", variant, e);
                return Err(e);
            }
        }
    }

    if produced.is_empty() {
        return Err(EditError::NoImageProduced);
    }
    Ok(produced)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    #[serde(rename_all = "camelCase")]
    Image { inline_data: RequestInlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Deserialize, Debug)]
struct ResponseInlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    error: GeminiErrorDetails,
}

#[derive(Deserialize, Debug)]
struct GeminiErrorDetails {
    message: String,
    status: Option<String>,
}

impl GenerateContentResponse {
    fn first_image(self) -> Option<InlineImage> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|part| part.inline_data)
            .map(|inline| InlineImage {
                mime_type: inline.mime_type,
                data: inline.data,
            })
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Option<Duration>) -> Result<Self, EditError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(GeminiClient {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, EditError> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
            config.request_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageProvider for GeminiClient {
    async fn generate_image(&self, image: &InlineImage, instruction: &str) -> Result<Option<String>, EditError> {
        info!("Editing image with {} | Input: {} ({} base64 chars) | Prompt: '{}'",
              self.model, image.mime_type, image.data.len(),
              instruction.chars().take(100).collect::<String>());

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Image {
                        inline_data: RequestInlineData {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                    RequestPart::Text { text: instruction },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE"],
            },
        };

        debug!("Sending request to Gemini generateContent API");
        let response = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status.is_success() {
            let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
                .map_err(|e| EditError::GenerationFailed(format!("unreadable Gemini response: {}", e)))?;

            match parsed.first_image() {
                Some(inline) => {
                    info!("Image generated successfully | {} | {} base64 chars", inline.mime_type, inline.data.len());
                    Ok(Some(inline.to_data_url()))
                }
                None => {
                    warn!("Gemini response carried no image part");
                    Ok(None)
                }
            }
        } else if let Ok(error_response) = serde_json::from_str::<GeminiError>(&response_text) {
            error!("Gemini API error: {} (status: {:?})",
                   error_response.error.message,
                   error_response.error.status);
            Err(EditError::GenerationFailed(error_response.error.message))
        } else {
            error!("Gemini API error (status {}): {}", status, response_text);
            Err(EditError::GenerationFailed(format!("Gemini API error (status {})", status)))
        }
    }
}
