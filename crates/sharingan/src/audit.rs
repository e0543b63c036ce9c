/// Audit client: sends an `AuditRequest` to the model and turns whatever comes back into a
/// well-formed `AuditResponse`.
///
/// Only three failures reach the user:
/// - `PreconditionFailure`: no API key, nothing was sent
/// - `ServiceUnavailable`: transport or upstream error
/// - `MalformedResponse`: empty body, or not a JSON object
///
/// Partial bodies are not failures. Missing or mistyped fields are replaced with safe
/// defaults (zero scores, no prompts, no versus report).
use std::future::Future;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use audit_common::gemini::{
    Content, GeminiClient, GeminiClientError, GenerateContentRequest, GenerationConfig,
    GroundingChunk, Part, Tool,
};

use crate::model::{AuditResponse, AuditScores, GroundingCitation};
use crate::prompt::AuditRequest;

pub const MISSING_REPORT_PLACEHOLDER: &str = "Report could not be generated.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("cannot start the audit: {0}")]
    PreconditionFailure(String),

    #[error("audit service unreachable, check your API credits or network ({0})")]
    ServiceUnavailable(String),

    #[error("the audit service returned an unusable response: {0}")]
    MalformedResponse(String),
}

impl From<GeminiClientError> for AuditError {
    fn from(err: GeminiClientError) -> Self {
        match err {
            GeminiClientError::MissingApiKey => Self::PreconditionFailure(err.to_string()),
            GeminiClientError::InvalidJson(_) => Self::MalformedResponse(err.to_string()),
            GeminiClientError::Request(_)
            | GeminiClientError::Upstream { .. }
            | GeminiClientError::UpstreamBody { .. } => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

/// Anything that can run an audit. The session controller only depends on this.
pub trait Auditor: Send + Sync + 'static {
    fn submit(
        &self,
        request: AuditRequest,
    ) -> impl Future<Output = Result<AuditResponse, AuditError>> + Send;
}

pub struct GeminiAuditor {
    client: GeminiClient,
}

impl GeminiAuditor {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

impl Auditor for GeminiAuditor {
    fn submit(
        &self,
        request: AuditRequest,
    ) -> impl Future<Output = Result<AuditResponse, AuditError>> + Send {
        async move {
            info!(
                versus = request.has_versus_directive(),
                deep = request.has_deep_scan_directive(),
                image = request.image().is_some(),
                "submitting audit"
            );
            let wire = to_generate_content(&request);
            let response = self.client.generate_content(&wire).await.inspect_err(|e| {
                warn!(error = %e, "audit request failed");
            })?;

            let text = response.text().ok_or_else(|| {
                AuditError::MalformedResponse("response contained no text".to_string())
            })?;
            let normalized = normalize_response(&text, response.grounding_chunks())?;
            info!(
                report_chars = normalized.markdown_report.len(),
                prompts = normalized.vision_prompts.len(),
                versus = normalized.versus_report.is_some(),
                citations = normalized.citations.len(),
                "audit response normalized"
            );
            Ok(normalized)
        }
    }
}

/// Wire request: system instruction, one user turn, live search, strict JSON output.
pub fn to_generate_content(request: &AuditRequest) -> GenerateContentRequest {
    let mut parts = vec![Part::text(request.user_text())];
    if let Some(image) = request.image() {
        parts.push(Part::inline_data(image.mime_type.clone(), image.to_base64()));
    }

    GenerateContentRequest {
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(request.system_instruction())],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        tools: vec![Tool::google_search()],
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(response_schema()),
            temperature: None,
        }),
    }
}

/// Output schema declared to the model.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "markdownReport": { "type": "STRING" },
            "scores": {
                "type": "OBJECT",
                "properties": {
                    "aesthetics": { "type": "INTEGER" },
                    "storytelling": { "type": "INTEGER" },
                    "authority": { "type": "INTEGER" },
                    "ux": { "type": "INTEGER" },
                    "uniqueness": { "type": "INTEGER" }
                }
            },
            "visionPrompts": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            },
            "versusReport": { "type": "STRING" }
        }
    })
}

/// Validate and default a raw model body. Citations are passed through unfiltered.
pub fn normalize_response(
    body: &str,
    grounding: &[GroundingChunk],
) -> Result<AuditResponse, AuditError> {
    let body = strip_code_fence(body);
    if body.is_empty() {
        return Err(AuditError::MalformedResponse("empty response body".to_string()));
    }

    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| AuditError::MalformedResponse(format!("body is not JSON: {e}")))?;
    let Value::Object(obj) = parsed else {
        return Err(AuditError::MalformedResponse(
            "body is not a JSON object".to_string(),
        ));
    };

    let markdown_report = match obj.get("markdownReport") {
        Some(Value::String(report)) => report.clone(),
        _ => {
            warn!("response missing markdownReport, using placeholder");
            MISSING_REPORT_PLACEHOLDER.to_string()
        }
    };

    let scores = match obj.get("scores") {
        Some(Value::Object(scores)) => scores_from(scores),
        _ => {
            warn!("response missing scores, defaulting to zero");
            AuditScores::default()
        }
    };

    let vision_prompts = match obj.get("visionPrompts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let versus_report = obj
        .get("versusReport")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let citations = grounding
        .iter()
        .map(|chunk| GroundingCitation {
            uri: chunk.web.as_ref().and_then(|w| w.uri.clone()),
            title: chunk.web.as_ref().and_then(|w| w.title.clone()),
        })
        .collect();

    Ok(AuditResponse {
        markdown_report,
        scores,
        vision_prompts,
        versus_report,
        citations,
    })
}

fn scores_from(obj: &Map<String, Value>) -> AuditScores {
    let field = |name: &str| obj.get(name).map(coerce_score).unwrap_or(0);
    AuditScores {
        aesthetics: field("aesthetics"),
        storytelling: field("storytelling"),
        authority: field("authority"),
        ux: field("ux"),
        uniqueness: field("uniqueness"),
    }
}

fn coerce_score(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Models sometimes wrap JSON in a markdown fence despite the declared MIME type.
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match inner.split_once('\n') {
        Some((_, content)) => content.trim(),
        None => inner.trim(),
    }
}
