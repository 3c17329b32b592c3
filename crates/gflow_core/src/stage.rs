//! Evaluation stages and the stage catalog.
//!
//! A stage is one independent evaluation pass over the same document. Each
//! [`StageDescriptor`] carries a system instruction and a user template; the
//! template is rendered against a [`PromptContext`] into the two chat messages
//! sent upstream. The [`StageCatalog`] is loaded once at startup and shared
//! read-only by every request.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::message::ChatMessage;

/// Default document budget per stage, in characters.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 6000;

fn default_max_document_chars() -> usize {
    DEFAULT_MAX_DOCUMENT_CHARS
}

/// Values interpolated into a stage template.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub document: &'a str,
    pub instructions: &'a str,
    pub questions: &'a [String],
}

/// One evaluation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageDescriptor {
    pub id: String,
    /// Upper-case section heading, e.g. `GRADING THEORETICAL FOUNDATION`.
    pub title: String,
    pub system_prompt: String,
    /// User message template. Recognised placeholders are `{document}`,
    /// `{instructions}` and `{questions}`; anything else is left as is.
    pub template: String,
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

impl StageDescriptor {
    /// Label of the progress event announcing this stage.
    pub fn progress_label(&self) -> String {
        format!("{} ...", self.title)
    }

    /// Render the user prompt for `ctx`.
    pub fn render(&self, ctx: &PromptContext<'_>) -> String {
        let document = truncate_chars(ctx.document, self.max_document_chars);
        let questions = ctx
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect::<Vec<_>>()
            .join("\n");

        render_template(&self.template, |name| match name {
            "document" => Some(document),
            "instructions" => Some(ctx.instructions),
            "questions" => Some(questions.as_str()),
            _ => None,
        })
    }

    /// System instruction first, rendered user content second.
    pub fn build_messages(&self, ctx: &PromptContext<'_>) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.render(ctx)),
        ]
    }

    fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::StageCatalog("stage id must not be empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::StageCatalog(format!(
                "stage '{}' has an empty title",
                self.id
            )));
        }
        if self.max_document_chars == 0 {
            return Err(CoreError::StageCatalog(format!(
                "stage '{}' has max_document_chars = 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// Prefix of `s` holding at most `max` characters, cut on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Single-pass placeholder substitution. Substituted values are never
/// rescanned, so document text containing `{questions}` stays literal.
fn render_template<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Anything that can list the configured stages in order.
pub trait StageSource: Send + Sync {
    fn list_stages(&self) -> CoreResult<Vec<StageDescriptor>>;
}

#[derive(Debug, Deserialize)]
struct StageFile {
    stages: Vec<StageDescriptor>,
}

/// YAML file with a top-level `stages:` list.
#[derive(Debug, Clone)]
pub struct YamlStageFile {
    path: std::path::PathBuf,
}

impl YamlStageFile {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StageSource for YamlStageFile {
    fn list_stages(&self) -> CoreResult<Vec<StageDescriptor>> {
        let content = std::fs::read_to_string(&self.path)?;
        let file: StageFile = serde_yaml::from_str(&content)?;
        debug!("Read {} stages from {}", file.stages.len(), self.path.display());
        Ok(file.stages)
    }
}

/// Ordered, immutable set of stages with lookup by id.
#[derive(Debug, Clone, Default)]
pub struct StageCatalog {
    stages: Vec<StageDescriptor>,
    index: HashMap<String, usize>,
}

impl StageCatalog {
    /// Build a catalog, rejecting invalid or duplicate stages.
    pub fn new(stages: Vec<StageDescriptor>) -> CoreResult<Self> {
        let mut index = HashMap::with_capacity(stages.len());
        for (pos, stage) in stages.iter().enumerate() {
            stage.validate()?;
            if index.insert(stage.id.clone(), pos).is_some() {
                return Err(CoreError::StageCatalog(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
        }
        Ok(Self { stages, index })
    }

    pub fn from_source(source: &dyn StageSource) -> CoreResult<Self> {
        Self::new(source.list_stages()?)
    }

    pub fn from_yaml_str(yaml: &str) -> CoreResult<Self> {
        let file: StageFile = serde_yaml::from_str(yaml)?;
        Self::new(file.stages)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::from_source(&YamlStageFile::new(path))
    }

    /// The grading stages shipped with the service.
    pub fn builtin() -> Self {
        let stages = BUILTIN_GRADING
            .iter()
            .map(GradingStage::descriptor)
            .collect::<Vec<_>>();
        let mut all = Vec::with_capacity(stages.len() + 1);
        all.push(analysis_stage());
        all.extend(stages);

        let index = all
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.id.clone(), pos))
            .collect();
        Self { stages: all, index }
    }

    pub fn get(&self, id: &str) -> Option<&StageDescriptor> {
        self.index.get(id).map(|&pos| &self.stages[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl StageSource for StageCatalog {
    fn list_stages(&self) -> CoreResult<Vec<StageDescriptor>> {
        Ok(self.stages.clone())
    }
}

struct GradingStage {
    id: &'static str,
    aspect: &'static str,
    specialty: &'static str,
    criteria: [&'static str; 6],
    asks: [&'static str; 3],
}

impl GradingStage {
    fn descriptor(&self) -> StageDescriptor {
        let criteria = self
            .criteria
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        let template = format!(
            "You are an expert thesis evaluator. Please grade the {aspect} aspects of this thesis.\n\n\
             GRADING CRITERIA:\n{criteria}\n\n\
             THESIS CONTENT:\n{{document}}\n\n\
             Please provide:\n\
             1. A grade (A-F) with justification\n\
             2. {a0}\n\
             3. {a1}\n\
             4. Specific recommendations for improvement\n\
             5. {a2}\n\n\
             Format your response with clear sections and bullet points.",
            aspect = self.aspect,
            criteria = criteria,
            a0 = self.asks[0],
            a1 = self.asks[1],
            a2 = self.asks[2],
        );

        StageDescriptor {
            id: self.id.to_string(),
            title: format!("GRADING {}", self.aspect),
            system_prompt: format!(
                "You are an expert thesis evaluator specializing in {} assessment.",
                self.specialty
            ),
            template,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }
}

fn analysis_stage() -> StageDescriptor {
    StageDescriptor {
        id: "analysis".to_string(),
        title: "THESIS ANALYSIS".to_string(),
        system_prompt: "You are an expert thesis evaluator with deep knowledge of academic writing, \
                        research methodology, and evaluation criteria."
            .to_string(),
        template: "You are an expert thesis evaluator. Please analyze the following thesis document \
                   and provide comprehensive feedback.\n\n\
                   CUSTOM INSTRUCTIONS:\n{instructions}\n\n\
                   PREDEFINED QUESTIONS TO ADDRESS:\n{questions}\n\n\
                   THESIS CONTENT:\n{document}\n\n\
                   Please provide a detailed analysis covering:\n\
                   1. Overall assessment\n\
                   2. Strengths and weaknesses\n\
                   3. Specific feedback on each predefined question\n\
                   4. Recommendations for improvement\n\
                   5. Grading on different aspects\n\n\
                   Format your response in a clear, structured manner with sections and bullet points."
            .to_string(),
        max_document_chars: 8000,
    }
}

const BUILTIN_GRADING: &[GradingStage] = &[
    GradingStage {
        id: "formatting_style",
        aspect: "FORMATTING AND STYLE",
        specialty: "formatting and style",
        criteria: [
            "Document structure and organization",
            "Formatting consistency (fonts, spacing, margins)",
            "Professional presentation",
            "Clarity and readability",
            "Proper use of headings and sections",
            "Citation and reference formatting",
        ],
        asks: [
            "Specific feedback on formatting strengths and weaknesses",
            "Detailed recommendations for the layout",
            "Overall assessment of presentation quality",
        ],
    },
    GradingStage {
        id: "purpose_objectives",
        aspect: "PURPOSE AND OBJECTIVES",
        specialty: "purpose and objectives",
        criteria: [
            "Clarity of research purpose",
            "Well-defined objectives",
            "Logical connection between purpose and objectives",
            "Feasibility of objectives",
            "Alignment with academic standards",
            "Practical relevance",
        ],
        asks: [
            "Assessment of purpose clarity and grounding",
            "Evaluation of objective definition and feasibility",
            "Overall assessment of purpose-objective alignment",
        ],
    },
    GradingStage {
        id: "theoretical_foundation",
        aspect: "THEORETICAL FOUNDATION",
        specialty: "theoretical foundation",
        criteria: [
            "Depth of theoretical framework",
            "Critical analysis of existing literature",
            "Appropriate use of theoretical concepts",
            "Logical theoretical progression",
            "Integration of theory with research",
            "Academic rigor in theoretical discussion",
        ],
        asks: [
            "Assessment of theoretical framework depth",
            "Evaluation of critical thinking and analysis",
            "Overall assessment of theoretical foundation",
        ],
    },
    GradingStage {
        id: "professional_connection",
        aspect: "PROFESSIONAL CONNECTION",
        specialty: "professional connection",
        criteria: [
            "Relevance to professional field",
            "Connection to working life",
            "Practical applicability",
            "Industry relevance",
            "Professional development value",
            "Real-world impact potential",
        ],
        asks: [
            "Assessment of professional relevance",
            "Evaluation of practical applicability",
            "Overall assessment of professional connection",
        ],
    },
    GradingStage {
        id: "development_task",
        aspect: "DEVELOPMENT/RESEARCH TASK",
        specialty: "development task",
        criteria: [
            "Clarity of research/development task",
            "Justification of task selection",
            "Feasibility of task completion",
            "Methodological approach",
            "Task definition quality",
            "Research question formulation",
        ],
        asks: [
            "Assessment of task clarity and definition",
            "Evaluation of task justification and feasibility",
            "Overall assessment of development task quality",
        ],
    },
    GradingStage {
        id: "conclusions_proposals",
        aspect: "CONCLUSIONS AND DEVELOPMENT PROPOSALS",
        specialty: "conclusions and proposals",
        criteria: [
            "Quality of conclusions drawn",
            "Evidence-based conclusions",
            "Development proposal quality",
            "Practical implementation suggestions",
            "Future research directions",
            "Overall synthesis quality",
        ],
        asks: [
            "Assessment of conclusion quality",
            "Evaluation of development proposals",
            "Overall assessment of conclusions and proposals",
        ],
    },
    GradingStage {
        id: "material_methodology",
        aspect: "MATERIAL AND METHODOLOGICAL CHOICES",
        specialty: "materials and methodology",
        criteria: [
            "Diversity of materials used",
            "Appropriateness of methodology",
            "Methodological foundation",
            "Data collection methods",
            "Analysis approach quality",
            "Research design effectiveness",
        ],
        asks: [
            "Assessment of material diversity and foundation",
            "Evaluation of methodological choices",
            "Overall assessment of materials and methodology",
        ],
    },
    GradingStage {
        id: "treatment_analysis",
        aspect: "TREATMENT AND ANALYSIS OF MATERIAL",
        specialty: "treatment and analysis",
        criteria: [
            "Controlled treatment of materials",
            "Proficient analysis approach",
            "Systematic data processing",
            "Analytical depth",
            "Critical evaluation quality",
            "Methodological rigor in analysis",
        ],
        asks: [
            "Assessment of treatment control and proficiency",
            "Evaluation of analysis depth and quality",
            "Overall assessment of treatment and analysis",
        ],
    },
    GradingStage {
        id: "results_product",
        aspect: "RESULTS AND PRODUCT",
        specialty: "results and product",
        criteria: [
            "Originality of results",
            "Application value of results",
            "Product quality and completeness",
            "Innovation level",
            "Practical implementation",
            "Impact and significance",
        ],
        asks: [
            "Assessment of result originality and application",
            "Evaluation of product quality and completeness",
            "Overall assessment of results and product",
        ],
    },
];
