/** \brief 单段输入的默认长度上限（字符）。 */
pub const MAX_INPUT_CHARS: usize = 20_000;

/**
 * \brief 粗略估算 token 数：约 4 个字符一个 token，向上取整。
 */
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/** \brief (模型前缀, 输入单价, 输出单价)，单位：美元 / 1K tokens。长前缀排在前面。 */
const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-5-haiku", 0.0008, 0.004),
    ("claude-3-opus", 0.015, 0.075),
    ("gemini-1.5-flash", 0.000075, 0.0003),
    ("gemini-1.5-pro", 0.00125, 0.005),
    ("gemini-2.0-flash", 0.0001, 0.0004),
];

/**
 * \brief 估算一次调用的费用（美元）。本地运行时恒为 0，价格表中没有的模型返回 None。
 */
pub fn estimate_cost(
    provider: &str,
    model: &str,
    prompt_tokens: u32,
    completion_tokens: u32,
) -> Option<f64> {
    if provider.eq_ignore_ascii_case("ollama") {
        return Some(0.0);
    }
    let model = model.trim().to_ascii_lowercase();
    let (_, input, output) = PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))?;
    Some(prompt_tokens as f64 / 1000.0 * input + completion_tokens as f64 / 1000.0 * output)
}

/**
 * \brief 清洗用户输入：去掉控制字符（保留换行与制表符）、首尾空白，并截断到 `max_chars`。
 */
pub fn sanitize_input(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.chars().count() > max_chars {
        trimmed.chars().take(max_chars).collect::<String>().trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

/**
 * \brief 文本能否按 JSON 解析。
 */
pub fn is_json_safe(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text.trim()).is_ok()
}

/**
 * \brief 去掉 Markdown 代码围栏（```json ... ```），返回内部文本。
 */
pub fn extract_json_block(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 首行是语言标记
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
