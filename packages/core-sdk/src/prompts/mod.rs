use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::content_type::{ContentCategory, ContentType, OutputShape};
use crate::models::{GenerationRequest, NOT_SPECIFIED};
use crate::telemetry;
use crate::templates::TemplateCatalog;

mod audit;
mod policy;
mod privacy;
mod report;
mod resilience;
mod training;
mod vendor;

/** \brief 风险控制矩阵等复杂结构化输出的最低 token 预算。 */
pub const MATRIX_MIN_TOKENS: u32 = 4000;

/**
 * \brief 单个内容类型的提示词构建函数。
 */
pub type PromptRule = Box<dyn Fn(&GenerationRequest) -> String + Send + Sync>;

/**
 * \brief 声明式规则：任务说明 + 分类字段 + 生成要求。
 */
pub(crate) struct Task {
    pub instruction: &'static str,
    /** \brief (标签, 字段路径) */
    pub fields: &'static [(&'static str, &'static str)],
    pub requirements: &'static [&'static str],
}

/**
 * \brief 规则登记表。
 */
#[derive(Default)]
pub(crate) struct RuleTable {
    rules: HashMap<ContentType, PromptRule>,
}

impl RuleTable {
    pub fn add<F>(&mut self, content_type: ContentType, rule: F)
    where
        F: Fn(&GenerationRequest) -> String + Send + Sync + 'static,
    {
        self.rules.insert(content_type, Box::new(rule));
    }

    pub fn task(&mut self, content_type: ContentType, task: Task) {
        self.add(content_type, move |req| render_task(content_type, &task, req, &[]));
    }
}

/**
 * \brief 每个内容类型一条规则；新增内容类型只需在对应分类文件里多登记一条。
 * \details 所有规则对缺失字段都写入 "Not specified"，从不失败。
 */
static RULES: Lazy<HashMap<ContentType, PromptRule>> = Lazy::new(|| {
    let mut table = RuleTable::default();
    audit::register(&mut table);
    privacy::register(&mut table);
    policy::register(&mut table);
    training::register(&mut table);
    resilience::register(&mut table);
    vendor::register(&mut table);
    report::register(&mut table);
    table.rules
});

/**
 * \brief 使用内置规则构建提示词。对任意内容类型都返回非空文本。
 */
pub fn build_prompt(request: &GenerationRequest) -> String {
    let content_type = request.content_type;
    let body = match RULES.get(&content_type) {
        Some(rule) => rule(request),
        None => render_task(content_type, &GENERIC, request, &[]),
    };
    format!("{}\n\n{}", body.trim_end(), closing_instruction(content_type))
}

/**
 * \brief 构建结果及其来源模板。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    pub template_id: Option<i64>,
}

/**
 * \brief 优先使用匹配的模板，模板查询失败或没有匹配时回退到内置规则。
 * \details 查询失败只写入运行日志，不会返回错误。
 */
pub fn build_enhanced_prompt(request: &GenerationRequest, templates: &TemplateCatalog) -> BuiltPrompt {
    match templates.find_best_template(request) {
        Ok(Some(template)) => BuiltPrompt {
            text: templates.process_template(&template, request),
            template_id: Some(template.id),
        },
        Ok(None) => BuiltPrompt {
            text: build_prompt(request),
            template_id: None,
        },
        Err(e) => {
            telemetry::log_warn(
                "prompt.template",
                &format!(
                    "template lookup failed for {}, using built-in prompt: {}",
                    request.content_type, e
                ),
            );
            BuiltPrompt {
                text: build_prompt(request),
                template_id: None,
            }
        }
    }
}

/**
 * \brief 复杂结构化输出要求的最低 token 预算。
 */
pub fn effective_max_tokens(content_type: ContentType, requested: u32, matrix_floor: u32) -> u32 {
    match content_type.output_shape() {
        OutputShape::JsonObject => requested.max(matrix_floor),
        _ => requested,
    }
}

/**
 * \brief 通用上下文块，模板中的 `{{context_block}}` 也使用它。
 */
pub fn context_block(request: &GenerationRequest) -> String {
    let fields = &request.fields;
    let mut lines = vec![
        format!("- Title: {}", fields.text_or_default("title")),
        format!("- Type: {}", fields.text_or_default("type")),
        format!("- Business Unit: {}", fields.text_or_default("businessUnit")),
        format!("- Scope: {}", fields.text_or_default("scope")),
    ];
    if let Some(industry) = non_blank(request.industry.as_deref()) {
        lines.push(format!("- Industry: {}", industry));
    }
    if let Some(framework) = non_blank(request.framework.as_deref()) {
        lines.push(format!("- Framework: {}", framework));
    }
    lines.push(format!("- Additional Context: {}", free_text(request)));
    lines.join("\n")
}

/**
 * \brief 请求的自由文本上下文，空白时为 "Not specified"。
 */
pub fn free_text(request: &GenerationRequest) -> String {
    non_blank(Some(&request.context))
        .unwrap_or(NOT_SPECIFIED)
        .to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn persona(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::Audit => "an experienced internal auditor writing audit documentation",
        ContentCategory::Privacy => "a data protection specialist drafting privacy documentation",
        ContentCategory::Policy => "a governance specialist drafting corporate policy documents",
        ContentCategory::Training => "an instructional designer building compliance training",
        ContentCategory::Resilience => "a business continuity and operational resilience practitioner",
        ContentCategory::VendorRisk => "a third-party risk management analyst",
        ContentCategory::Report => "a risk and compliance reporting analyst",
    }
}

const GENERIC: Task = Task {
    instruction: "Write the requested content for this engagement.",
    fields: &[],
    requirements: &["Keep a professional, neutral tone"],
};

/**
 * \brief 渲染声明式规则；`extra` 为规则自带的附加段落，放在要求之后。
 */
pub(crate) fn render_task(
    content_type: ContentType,
    task: &Task,
    request: &GenerationRequest,
    extra: &[String],
) -> String {
    let mut sections = vec![
        format!(
            "You are {}. Generate the {} described below.\n\n{}",
            persona(content_type.category()),
            content_type.label(),
            task.instruction
        ),
        format!("Context:\n{}", context_block(request)),
    ];
    if !task.fields.is_empty() {
        let details = task
            .fields
            .iter()
            .map(|(label, path)| format!("- {}: {}", label, request.fields.text_or_default(path)))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Details:\n{}", details));
    }
    let mut requirements: Vec<String> = task.requirements.iter().map(|r| format!("- {}", r)).collect();
    requirements.extend(shape_requirements(content_type).iter().map(|r| format!("- {}", r)));
    sections.push(format!("Requirements:\n{}", requirements.join("\n")));
    sections.extend(extra.iter().cloned());
    sections.join("\n\n")
}

fn shape_requirements(content_type: ContentType) -> &'static [&'static str] {
    match content_type.output_shape() {
        OutputShape::Text => &["Write in plain prose suitable for pasting into a formal document"],
        OutputShape::StringList => &[
            "Format the output as a JSON array of strings",
            "Each item must be a complete, self-contained sentence",
        ],
        OutputShape::JsonObject => &["Format the output as a single JSON object"],
    }
}

fn closing_instruction(content_type: ContentType) -> String {
    match content_type.output_shape() {
        OutputShape::Text => format!(
            "Return only the {} text. Do not add a heading, preamble or closing remarks.",
            content_type.label()
        ),
        OutputShape::StringList => "Return only the JSON array, for example [\"First item\", \"Second item\"]. \
Do not add any text before or after the array."
            .to_string(),
        OutputShape::JsonObject => "Return only the JSON object. Do not wrap it in markdown code fences \
and do not add any text before or after it."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextFields;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_every_content_type_has_a_rule() {
        for ct in ContentType::ALL {
            assert!(RULES.contains_key(ct), "missing rule for {}", ct);
        }
    }

    #[test]
    fn test_prompts_are_total_with_empty_fields() {
        for ct in ContentType::ALL {
            let request = GenerationRequest::new("ollama", "mistral", *ct);
            let prompt = build_prompt(&request);
            assert!(!prompt.trim().is_empty(), "empty prompt for {}", ct);
            assert!(prompt.contains(NOT_SPECIFIED), "no fallback text for {}", ct);
            assert!(prompt.contains("Return only"), "no closing instruction for {}", ct);
        }
    }

    #[test]
    fn test_context_block_embeds_fields() {
        let mut request = GenerationRequest::new("openai", "gpt-4o", ContentType::Description);
        request.fields = ContextFields::with_title("Q3 Data Privacy Review");
        request.context = "Focus on consent records".into();
        request.industry = Some("Healthcare".into());
        let block = context_block(&request);
        assert!(block.contains("- Title: Q3 Data Privacy Review"));
        assert!(block.contains("- Industry: Healthcare"));
        assert!(block.contains("- Business Unit: Not specified"));
        assert!(block.contains("Focus on consent records"));
        assert!(!block.contains("Framework"));
    }

    #[test]
    fn test_category_fields_are_embedded() {
        let mut request = GenerationRequest::new("openai", "gpt-4o", ContentType::VendorRiskAssessment);
        request.fields = serde_json::from_value(json!({
            "title": "Payroll provider review",
            "vendor": {"name": "Acme Payroll", "tier": "Critical"}
        }))
        .expect("fields");
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Acme Payroll"));
        assert!(prompt.contains("Critical"));
    }

    #[test]
    fn test_matrix_floor_only_applies_to_structured_objects() {
        assert_eq!(effective_max_tokens(ContentType::RiskControlMatrix, 1000, 4000), 4000);
        assert_eq!(effective_max_tokens(ContentType::RiskControlMatrix, 6000, 4000), 6000);
        assert_eq!(effective_max_tokens(ContentType::Scope, 1000, 4000), 1000);
    }

    #[test]
    fn test_enhanced_prompt_falls_back_without_templates() {
        let catalog = TemplateCatalog::new(Arc::new(MemoryStore::new()));
        let request = GenerationRequest::new("ollama", "mistral", ContentType::Scope);
        let built = build_enhanced_prompt(&request, &catalog);
        assert_eq!(built.template_id, None);
        assert_eq!(built.text, build_prompt(&request));
    }
}
