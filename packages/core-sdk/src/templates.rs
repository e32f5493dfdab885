use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;

use crate::content_type::ContentType;
use crate::models::{GenerationRequest, Template, TemplateCriteria, TemplateDraft};
use crate::prompts::{context_block, free_text};
use crate::store::TemplateRepository;

/**
 * \brief 模板目录：查询、选择最佳模板、变量替换、增删改。
 */
#[derive(Clone)]
pub struct TemplateCatalog {
    repo: Arc<dyn TemplateRepository>,
}

impl TemplateCatalog {
    pub fn new(repo: Arc<dyn TemplateRepository>) -> Self {
        Self { repo }
    }

    pub fn list_templates(&self, criteria: &TemplateCriteria) -> Result<Vec<Template>> {
        self.repo.list_templates(criteria)
    }

    pub fn get_template(&self, id: i64) -> Result<Option<Template>> {
        self.repo.get_template(id)
    }

    /**
     * \brief 为请求选出唯一的最佳模板。
     * \details 请求指定的 template_id 启用中且内容类型一致时直接使用它；否则在该内容类型的启用模板中按 `select_best` 选择。
     */
    pub fn find_best_template(&self, request: &GenerationRequest) -> Result<Option<Template>> {
        if let Some(id) = request.template_id {
            if let Some(template) = self.repo.get_template(id)? {
                if template.is_active
                    && template
                        .content_type
                        .eq_ignore_ascii_case(request.content_type.as_str())
                {
                    return Ok(Some(template));
                }
            }
        }
        let candidates = self.repo.list_templates(&TemplateCriteria {
            content_type: Some(request.content_type.as_str().to_string()),
            ..TemplateCriteria::default()
        })?;
        Ok(select_best(
            &candidates,
            request.content_type.as_str(),
            request.industry.as_deref(),
            request.framework.as_deref(),
        ))
    }

    /**
     * \brief 替换模板中的占位符，并在模板声明了行业/框架时追加说明。
     */
    pub fn process_template(&self, template: &Template, request: &GenerationRequest) -> String {
        let fields = &request.fields;
        let mut text = template
            .body
            .replace("{{title}}", &fields.text_or_default("title"))
            .replace("{{type}}", &fields.text_or_default("type"))
            .replace("{{content_type}}", request.content_type.label())
            .replace("{{business_unit}}", &fields.text_or_default("businessUnit"))
            .replace("{{scope}}", &fields.text_or_default("scope"))
            .replace("{{context_block}}", &context_block(request))
            .replace("{{context}}", &free_text(request));
        if let Some(industry) = qualifier(&template.industry) {
            text.push_str(&format!(
                "\n\nIndustry context: this content is for the {} industry. Use the terminology, \
regulatory expectations and common practices of that industry.",
                industry
            ));
        }
        if let Some(framework) = qualifier(&template.framework) {
            text.push_str(&format!(
                "\n\nFramework context: align the content with the requirements and terminology of {}.",
                framework
            ));
        }
        text
    }

    pub fn create(&self, draft: &TemplateDraft) -> Result<Template> {
        let draft = normalize_draft(draft)?;
        self.repo.create_template(&draft, OffsetDateTime::now_utc())
    }

    /**
     * \brief 更新模板，每次更新都刷新 updated_at。
     */
    pub fn update(&self, id: i64, draft: &TemplateDraft) -> Result<Template> {
        let draft = normalize_draft(draft)?;
        self.repo.update_template(id, &draft, OffsetDateTime::now_utc())
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        self.repo.delete_template(id)
    }
}

fn normalize_draft(draft: &TemplateDraft) -> Result<TemplateDraft> {
    let content_type = ContentType::from_str(&draft.content_type)?;
    Ok(TemplateDraft {
        content_type: content_type.as_str().to_string(),
        industry: qualifier(&draft.industry).map(str::to_string),
        framework: qualifier(&draft.framework).map(str::to_string),
        ..draft.clone()
    })
}

fn qualifier(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn same(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

/**
 * \brief 模板选择规则。
 * \details 只考虑该内容类型的启用模板，先按 is_default 降序、version 降序排序后扫描：
 *          行业与框架都匹配的模板立即返回；否则依次偏好 仅行业匹配 > 仅框架匹配 > 无限定的默认模板，
 *          同等级取先出现者；都没有时返回排序后的第一个。没有候选时返回 None。
 */
pub fn select_best(
    templates: &[Template],
    content_type: &str,
    industry: Option<&str>,
    framework: Option<&str>,
) -> Option<Template> {
    let mut candidates: Vec<&Template> = templates
        .iter()
        .filter(|t| t.is_active && t.content_type.eq_ignore_ascii_case(content_type))
        .collect();
    candidates.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then(b.version.cmp(&a.version))
    });

    let mut best: Option<(u8, &Template)> = None;
    for template in candidates.iter().copied() {
        let industry_match = same(template.industry.as_deref(), industry);
        let framework_match = same(template.framework.as_deref(), framework);
        let rank = match (industry_match, framework_match) {
            (true, true) => return Some(template.clone()),
            (true, false) => 3,
            (false, true) => 2,
            _ if template.is_default
                && qualifier(&template.industry).is_none()
                && qualifier(&template.framework).is_none() =>
            {
                1
            }
            _ => 0,
        };
        if rank > 0 && best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, template));
        }
    }
    best.map(|(_, t)| t)
        .or_else(|| candidates.first().copied())
        .cloned()
}
