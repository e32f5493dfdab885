use crate::models::{Message, ProviderDescriptor, Role};

/** \brief 对话中没有 system 消息时使用的前言。 */
pub const GENERIC_PREAMBLE: &str =
    "You are a helpful assistant for governance, risk and compliance professionals.";

/**
 * \brief 按后端能力准备消息：原生多轮直接转发，否则压平成单条 user 消息。
 */
pub fn prepare_messages(provider: &ProviderDescriptor, messages: &[Message]) -> Vec<Message> {
    if provider.multi_turn {
        messages.to_vec()
    } else {
        vec![Message::new(Role::User, flatten_conversation(messages))]
    }
}

/**
 * \brief 把多轮对话压平成单个提示词：前言 + `ROLE: content` 逐行 + 回答最后一条用户消息的指令。
 */
pub fn flatten_conversation(messages: &[Message]) -> String {
    let system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let preamble = if system.is_empty() {
        GENERIC_PREAMBLE.to_string()
    } else {
        system
    };

    let transcript = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{}: {}", m.role.as_str().to_ascii_uppercase(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nConversation:\n{}\n\nRespond to the last USER message above. \
Reply with the ASSISTANT's next message only, without the \"ASSISTANT:\" prefix.",
        preamble, transcript
    )
}
