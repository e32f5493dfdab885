use thiserror::Error;

/**
 * \brief 生成编排层的错误分类。
 * \details 所有适配器错误都在分发边界转换为 `GenerationResult{success:false}`，不会继续向上抛出。
 */
#[derive(Debug, Error)]
pub enum GenerationError {
    /** \brief 缺少 provider/model/凭据等，发生在任何网络请求之前。 */
    #[error("configuration error: {0}")]
    Configuration(String),

    /** \brief 后端不可达或未运行。 */
    #[error("{0}")]
    Availability(String),

    /** \brief 后端模型目录中不存在所请求的模型。 */
    #[error("model '{model}' is not installed. Run `{remediation}` and try again.")]
    ModelNotFound { model: String, remediation: String },

    /** \brief 非 2xx 状态码或无法解析的响应体。 */
    #[error("backend protocol error: {0}")]
    Protocol(String),

    /** \brief 结构化输出解析失败，仅作提示，不影响结果。 */
    #[error("structured output parse failed: {0}")]
    ParseAdvisory(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Availability(format!("request timed out: {}", err))
        } else if err.is_connect() {
            GenerationError::Availability(format!("backend unreachable: {}", err))
        } else if err.is_decode() {
            GenerationError::Protocol(format!("malformed response body: {}", err))
        } else {
            GenerationError::Protocol(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_names_remediation() {
        let err = GenerationError::ModelNotFound {
            model: "mistral".into(),
            remediation: "ollama pull mistral".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mistral"));
        assert!(msg.contains("ollama pull mistral"));
    }
}
