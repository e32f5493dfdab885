use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;

use crate::models::{
    ChatRequest, GenerationLogEntry, GenerationRequest, GenerationResult, GenerationStats, Role,
};
use crate::store::LogSink;
use crate::telemetry;

/** \brief 对话记录使用的内容类型键。 */
pub const CHAT_CONTENT_TYPE: &str = "chat";

/**
 * \brief 结果记录与统计。写入失败只进入运行日志，不影响调用方拿到的结果。
 */
#[derive(Clone)]
pub struct OutcomeLogger {
    sink: Arc<dyn LogSink>,
}

impl OutcomeLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn log_generation(
        &self,
        user_id: &str,
        request: &GenerationRequest,
        prompt: &str,
        result: &GenerationResult,
    ) {
        self.append(entry(
            user_id,
            result,
            prompt,
            request.content_type.as_str(),
        ));
    }

    /**
     * \brief 对话以最后一条用户消息作为 prompt 记录。
     */
    pub fn log_chat_interaction(&self, user_id: &str, request: &ChatRequest, result: &GenerationResult) {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        self.append(entry(user_id, result, prompt, CHAT_CONTENT_TYPE));
    }

    fn append(&self, entry: GenerationLogEntry) {
        if let Err(e) = self.sink.append(&entry) {
            telemetry::log_error(
                "outcome.log",
                &format!(
                    "failed to record {} attempt for {}: {}",
                    entry.provider, entry.user_id, e
                ),
            );
        }
    }

    /**
     * \brief 用户维度统计；没有记录时全部为 0 / 空串。
     */
    pub fn get_generation_stats(&self, user_id: &str) -> Result<GenerationStats> {
        let entries = self.sink.entries_for(user_id)?;
        Ok(compute_stats(&entries))
    }

    /**
     * \brief 最近的记录，新到旧。
     */
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationLogEntry>> {
        self.sink.recent_for(user_id, limit)
    }
}

fn entry(user_id: &str, result: &GenerationResult, prompt: &str, content_type: &str) -> GenerationLogEntry {
    GenerationLogEntry {
        user_id: user_id.to_string(),
        provider: result.provider.clone(),
        model: result.model.clone(),
        prompt: prompt.to_string(),
        response: result.text(),
        tokens_used: result.tokens_used,
        content_type: content_type.to_string(),
        success: result.success,
        error: result.error.clone(),
        created_at: OffsetDateTime::now_utc(),
    }
}

/**
 * \brief 统计汇总。平均 token 数按全部记录计算（未上报用量记为 0），四舍五入。
 */
pub fn compute_stats(entries: &[GenerationLogEntry]) -> GenerationStats {
    if entries.is_empty() {
        return GenerationStats::default();
    }
    let total = entries.len() as u64;
    let successful = entries.iter().filter(|e| e.success).count() as u64;
    let token_sum: u64 = entries
        .iter()
        .map(|e| e.tokens_used.unwrap_or(0) as u64)
        .sum();
    GenerationStats {
        total,
        successful,
        failed: total - successful,
        average_tokens: (token_sum as f64 / total as f64).round() as u64,
        most_used_provider: mode(entries.iter().map(|e| e.provider.as_str())),
        most_used_field_type: mode(entries.iter().map(|e| e.content_type.as_str())),
    }
}

/**
 * \brief 出现次数最多的值，次数相同取先出现者。
 */
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for value in values {
        let count = counts.entry(value).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for value in order {
        let count = counts[value];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.to_string()).unwrap_or_default()
}
