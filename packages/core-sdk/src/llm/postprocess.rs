use serde_json::Value;

use crate::content_type::{ContentType, OutputShape};
use crate::error::GenerationError;
use crate::models::GeneratedContent;
use crate::telemetry;
use crate::utils::extract_json_block;

/**
 * \brief 按内容类型的输出结构归一化原始文本。
 * \details 列表型内容以 `[` 开头时尝试解析为字符串数组，对象型内容以 `{` 开头时尝试解析为 JSON 对象。
 *          解析失败只写入运行日志，原文原样返回，此函数从不失败。
 */
pub fn normalize_content(content_type: Option<ContentType>, raw: &str) -> GeneratedContent {
    let shape = content_type
        .map(|ct| ct.output_shape())
        .unwrap_or(OutputShape::Text);
    let candidate = extract_json_block(raw);
    let parsed = match shape {
        OutputShape::Text => return GeneratedContent::Text(raw.to_string()),
        OutputShape::StringList if candidate.starts_with('[') => parse_list(candidate),
        OutputShape::JsonObject if candidate.starts_with('{') => parse_object(candidate),
        _ => return GeneratedContent::Text(raw.to_string()),
    };
    match parsed {
        Ok(content) => content,
        Err(advisory) => {
            let label = content_type.map(|ct| ct.as_str()).unwrap_or("text");
            telemetry::log_warn("dispatch.postprocess", &format!("{}: {}", label, advisory));
            GeneratedContent::Text(raw.to_string())
        }
    }
}

fn parse_list(text: &str) -> Result<GeneratedContent, GenerationError> {
    let items: Vec<Value> = serde_json::from_str(text)
        .map_err(|e| GenerationError::ParseAdvisory(format!("expected a JSON array: {}", e)))?;
    let list = items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect();
    Ok(GeneratedContent::List(list))
}

fn parse_object(text: &str) -> Result<GeneratedContent, GenerationError> {
    match serde_json::from_str::<Value>(text) {
        Ok(v @ Value::Object(_)) => Ok(GeneratedContent::Structured(v)),
        Ok(other) => Err(GenerationError::ParseAdvisory(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(GenerationError::ParseAdvisory(format!(
            "expected a JSON object: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objectives_array_is_parsed() {
        let content = normalize_content(
            Some(ContentType::Objectives),
            r#"["Assess access controls", "Evaluate change management"]"#,
        );
        assert_eq!(
            content,
            GeneratedContent::List(vec![
                "Assess access controls".into(),
                "Evaluate change management".into()
            ])
        );
    }

    #[test]
    fn test_malformed_array_keeps_raw_text() {
        let raw = "['Assess X', 'Evaluate Y']";
        let content = normalize_content(Some(ContentType::Objectives), raw);
        assert_eq!(content, GeneratedContent::Text(raw.to_string()));
    }

    #[test]
    fn test_fenced_array_is_unwrapped() {
        let raw = "```json\n[\"a\", \"b\"]\n```";
        let content = normalize_content(Some(ContentType::Criteria), raw);
        assert_eq!(content, GeneratedContent::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_prose_for_list_type_stays_text() {
        let raw = "1. Assess X\n2. Evaluate Y";
        let content = normalize_content(Some(ContentType::Objectives), raw);
        assert_eq!(content, GeneratedContent::Text(raw.to_string()));
    }

    #[test]
    fn test_matrix_object_is_parsed() {
        let raw = r#"{"risks": [{"id": "R1", "controls": ["C1"]}]}"#;
        let content = normalize_content(Some(ContentType::RiskControlMatrix), raw);
        assert_eq!(
            content,
            GeneratedContent::Structured(json!({"risks": [{"id": "R1", "controls": ["C1"]}]}))
        );
    }

    #[test]
    fn test_text_types_are_untouched() {
        let raw = "[draft] Scope covers all EU entities.";
        let content = normalize_content(Some(ContentType::Scope), raw);
        assert_eq!(content, GeneratedContent::Text(raw.to_string()));
        assert_eq!(
            normalize_content(None, r#"["x"]"#),
            GeneratedContent::Text(r#"["x"]"#.to_string())
        );
    }
}
