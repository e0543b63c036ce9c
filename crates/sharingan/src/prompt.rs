/// Request builder: turns the form inputs into the instruction set sent to the model.
///
/// The system instruction is a fixed contract (report structure, scoring rubric, JSON
/// format). Only the user turn varies: it always demands a complete long-form audit and
/// gains a versus directive and a deep-scan directive when asked for.
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::AppError;
use crate::model::ScanMode;

pub const SYSTEM_INSTRUCTION: &str = r#"
# IDENTITY
You are "THE SHARINGAN", the absolute brand auditor: an elite AI specialised in luxury art
direction, neuromarketing, conversion rate optimisation (CRO) and high-ticket strategy.
You do not suggest. You diagnose and prescribe with surgical precision.

# CRITICAL OBJECTIVE
The user explicitly asked for a MORE COMPLETE AND STRUCTURED audit. Earlier answers were
too short. Produce a MASSIVE, DENSE, HIGHLY DETAILED report. Treat every section like a
thesis chapter. No generalities: be specific to the brand under review.

# WRITING RULES (ULTRA LONG-FORM)
- Volume: go for the maximum relevant length. Dissect every aspect.
- Structure: follow the structure below with H2 titles, H3 subtitles, bullet lists and
  **bold** key concepts.
- Vocabulary: expert terms (semiotics, heuristics, cognitive load, social proof, price
  anchoring, whitespace, kerning).
- Tone: professional, authoritative, high-ticket. Not "I think", but "you must".

---

# MANDATORY REPORT STRUCTURE (MARKDOWN)

## 0. EXECUTIVE SUMMARY
- **Brutal verdict**: is the brand Premium, Standard or Low-Cost?
- **Top 3 emergencies**: the three actions to take tonight.

## 1. THE PSYCHO-VISUAL SCAN
- **50 millisecond test**: the visceral first impression. What is understood instantly?
- **Colour psychology**: hues in use and their emotional impact.
- **Typography and voice**: typefaces, legibility, kerning, the authority they project.
- **Iconography and visuals**: photo quality, graphic consistency, stock or AI imagery.

## 2. UX AND CONVERSION ENGINEERING (CRO)
- **Information architecture**: is navigation fluid or confusing?
- **Cognitive load**: visual noise, guidance.
- **Purchase friction**: psychological or technical obstacles to conversion.
- **Calls to action**: visibility, contrast, wording, persuasive power.

## 3. COPYWRITING AND STORYTELLING
- **Unique value proposition**: clear in under three seconds?
- **Tone of voice**: character or blandness; talking to the client or about itself?
- **Clarity versus creativity**: understandable or too abstract?

## 4. FINANCIAL IMPACT (THE COST OF MISTAKES)
- **Loss of perceived value**: why the current design caps pricing power.
- **Trust and authority**: why high-ticket clients would hesitate to pay.

## 5. THE RENAISSANCE: "CINEMATIC LAUNCH" STRATEGY
- **New artistic concept**: a precise new direction, with a name.
- **Verbal moodboard**: textures, light, materials, atmospheres.
- **90-day action plan**:
    - Phase 1: cleanup and UX (quick wins).
    - Phase 2: visual rebranding (deep work).
    - Phase 3: launch and authority (go to market).

---

# SCORING RULES (SHARINGAN RADAR, 0 TO 100)
Be severe. 50 is the market average. 80+ is world-class excellence.
1. Aesthetics: pure beauty, execution, pixel perfection.
2. Storytelling: ability to tell a captivating story.
3. Authority: credibility and trust projected.
4. UX: ease of use and clarity of the journey.
5. Uniqueness: differentiation from competitors (unfair advantage).

# VISION GENERATOR (AI PROMPTS)
Write 3 VERY DETAILED parametric image-generation prompts visualising the suggested new
identity. Include camera style, film stock, lighting, textures, composition, palette.

# VERSUS MODE (WHEN A COMPETITOR IS GIVEN)
Write a dedicated "WAR ROOM" section. Compare point by point (design, offer, message).
Identify the unfair advantage to exploit.

# JSON FORMAT (STRICT)
{
  "markdownReport": "string (complete markdown following the structure)",
  "scores": { "aesthetics": int, "storytelling": int, "authority": int, "ux": int, "uniqueness": int },
  "visionPrompts": ["prompt 1", "prompt 2", "prompt 3"],
  "versusReport": "string (optional, competitive report)"
}
"#;

pub const DEEP_SCAN_DIRECTIVE: &str = "MODE ENABLED: MANGEKYOU SHARINGAN (deep psychological \
analysis). Be merciless on the scores and extremely detailed in the analysis.";

const VERSUS_MARKER: &str = "VERSUS MODE ENABLED";

/// Outbound payload for one audit.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    user_text: String,
    image: Option<ImageEvidence>,
}

impl AuditRequest {
    pub fn system_instruction(&self) -> &'static str {
        SYSTEM_INSTRUCTION
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn image(&self) -> Option<&ImageEvidence> {
        self.image.as_ref()
    }

    pub fn has_versus_directive(&self) -> bool {
        self.user_text.contains(VERSUS_MARKER)
    }

    pub fn has_deep_scan_directive(&self) -> bool {
        self.user_text.contains(DEEP_SCAN_DIRECTIVE)
    }
}

/// Assemble the request. `company` is expected to be non-empty; callers validate it.
pub fn build_request(
    company: &str,
    mode: ScanMode,
    competitor: Option<&str>,
    image: Option<ImageEvidence>,
) -> AuditRequest {
    let mut user_text = format!(
        "RADICAL, COMPLETE AND STRUCTURED AUDIT OF THE BRAND: {company}.\n\
The client demands a complete, structured, long-form report with in-depth sections. \
They want VOLUME AND SUBSTANCE.\n\
Take no shortcuts. Develop every point of structure 0 to 5."
    );

    if let Some(competitor) = competitor.map(str::trim).filter(|c| !c.is_empty()) {
        user_text.push_str(&format!(
            "\nMAIN COMPETITOR TO OUTCLASS: {competitor}. {VERSUS_MARKER}. \
Compare strengths and weaknesses in detail."
        ));
    }

    if mode == ScanMode::Mangekyou {
        user_text.push('\n');
        user_text.push_str(DEEP_SCAN_DIRECTIVE);
    }

    AuditRequest { user_text, image }
}

/// A screenshot attached as visual evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEvidence {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageEvidence {
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Input(format!("cannot read image {}: {e}", path.display())))?;
        if bytes.is_empty() {
            return Err(AppError::Input(format!("image {} is empty", path.display())));
        }
        Ok(Self {
            mime_type: guess_image_mime(path).to_string(),
            bytes,
        })
    }

    /// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload (taken as PNG).
    pub fn from_data_url(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        let (mime_type, payload) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| AppError::Input("data URL has no payload".to_string()))?;
                let mime = header.trim_end_matches(";base64");
                let mime = if mime.is_empty() { "image/png" } else { mime };
                (mime.to_string(), payload)
            }
            None => ("image/png".to_string(), raw),
        };
        let bytes = BASE64
            .decode(payload)
            .map_err(|e| AppError::Input(format!("image payload is not valid base64: {e}")))?;
        Ok(Self { mime_type, bytes })
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
