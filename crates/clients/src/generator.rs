//! Chat-completion client used to summarize retrieved memory context, plus
//! a rich deterministic local fallback that never raises to the caller.
//! Grounded on `sage_core/memory/text_generator.py::TextGenerator`.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sage_domain::config::GeneratorConfig;
use sage_domain::error::Error;
use sage_resilience::{BreakerCallError, BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};

pub struct GeneratorClient {
    http: HttpClient,
    config: GeneratorConfig,
    breakers: BreakerRegistry,
}

#[derive(Serialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// One retrieved fragment inlined into the fusion template, per §6.2's
/// `[用户|助手] <content>` line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassageRole {
    User,
    Assistant,
}

impl PassageRole {
    fn label(self) -> &'static str {
        match self {
            PassageRole::User => "用户",
            PassageRole::Assistant => "助手",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Passage {
    pub role: PassageRole,
    pub content: String,
}

#[derive(Clone, Copy, Default)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl GeneratorClient {
    pub fn new(config: GeneratorConfig, breakers: BreakerRegistry) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self { http, config, breakers }
    }

    /// Never raises: any failure (config, network, parse) falls through to
    /// the local fallback.
    pub async fn generate(&self, messages: &[ChatMessage], params: GenerationParams) -> String {
        match self.generate_remote(messages, params).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "generator call failed, using local fallback");
                fallback_generation(messages)
            }
        }
    }

    async fn generate_remote(&self, messages: &[ChatMessage], params: GenerationParams) -> Result<String, Error> {
        if self.config.api_key.is_empty() {
            return Err(Error::configuration("SILICONFLOW_API_KEY environment variable is not set"));
        }

        let breaker = self.breakers.get_or_create(
            "generator_service",
            CircuitBreakerConfig { failure_threshold: 5, recovery_timeout: Duration::from_secs(60), ..Default::default() },
        );
        let mut retry = RetryPolicy::network();

        sage_resilience::ResilientCall::run(
            &breaker,
            &mut retry,
            || self.call_chat_endpoint(messages, params),
            |_: &Error| Retryable::Yes,
        )
        .await
        .map_err(|e| match e {
            BreakerCallError::Open(open) => Error::breaker_open(open.0),
            BreakerCallError::Inner(inner) => inner,
        })
    }

    async fn call_chat_endpoint(&self, messages: &[ChatMessage], params: GenerationParams) -> Result<String, Error> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::embedding_service(format!("generator request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::embedding_service(format!("generator endpoint returned {}", resp.status())));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::embedding_service(format!("invalid generator response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::embedding_service("generator response had no choices"))
    }

    /// Builds the two-message chat (system carries the fusion template with
    /// `{retrieved_passages}` expanded into numbered `<fragment_NN>` blocks,
    /// user carries the original query) and generates with the source's
    /// `max_tokens=2000, temperature=0.3` defaults, per §6.2.
    pub async fn compress_memory_context(
        &self,
        fusion_template: &str,
        user_query: &str,
        retrieved_passages: &[Passage],
    ) -> String {
        let max_tokens = 2000usize;
        let fragments = retrieved_passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("<fragment_{:02}>\n[{}] {}\n</fragment_{:02}>", i + 1, p.role.label(), p.content, i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let mut system_prompt = fusion_template.replace("{retrieved_passages}", &fragments);
        let max_chars = max_tokens * 4;
        if system_prompt.chars().count() > max_chars {
            system_prompt = system_prompt.chars().take(max_chars).collect();
        }

        let messages = vec![
            ChatMessage { role: "system".into(), content: system_prompt },
            ChatMessage { role: "user".into(), content: user_query.to_string() },
        ];
        self.generate(&messages, GenerationParams { max_tokens: Some(max_tokens as u32), temperature: Some(0.3), top_p: None })
            .await
    }

    pub fn model_info(&self) -> Value {
        json!({ "model": self.config.model, "base_url": self.config.base_url })
    }
}

/// Rich structured fallback summary, grounded on `_fallback_generation`:
/// pulls the user query and any `- ` context lines out of the system
/// prompt, then produces keyword-triggered analysis sections.
fn fallback_generation(messages: &[ChatMessage]) -> String {
    let system_prompt = messages.iter().find(|m| m.role == "system").map(|m| m.content.as_str()).unwrap_or("");
    let user_query = messages.iter().find(|m| m.role == "user").map(|m| m.content.as_str()).unwrap_or("");

    let context_lines: Vec<&str> = system_prompt
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .collect();

    let analysis = analyze_user_query(user_query);
    let summary = generate_context_summary(&context_lines);
    let suggestions = generate_technical_suggestions(user_query);

    if analysis.is_empty() && summary.is_empty() {
        return minimal_fallback(user_query);
    }

    let mut sections = vec![analysis, summary];
    if !suggestions.is_empty() {
        sections.push(suggestions);
    }
    sections.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n")
}

fn analyze_user_query(query: &str) -> String {
    let lower = query.to_lowercase();
    if lower.contains("prompt") && lower.contains("enhancer") {
        format!("关于「{query}」：这是一个提示词增强相关的问题，建议结合具体的输入输出示例来优化提示词结构。")
    } else if lower.contains("api") || query.contains("调用") || query.contains("错误") || query.contains("400") || query.contains("超时") {
        format!("关于「{query}」：这看起来与接口调用相关，建议检查请求参数、认证信息以及网络超时配置。")
    } else if query.contains("代码") || query.contains("实现") || query.contains("功能") || query.contains("开发") {
        format!("关于「{query}」：这是一个代码实现相关的问题，建议参考已有的相关历史记忆来保持实现风格一致。")
    } else {
        format!("关于「{query}」：根据现有的历史记忆内容进行了分析，以下是相关的背景信息。")
    }
}

fn generate_context_summary(context_lines: &[&str]) -> String {
    if context_lines.is_empty() {
        return String::new();
    }
    let mut out = String::from("相关历史背景：\n");
    for line in context_lines.iter().take(5) {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn generate_technical_suggestions(query: &str) -> String {
    let mut suggestions = Vec::new();
    if query.contains("错误") || query.contains("异常") {
        suggestions.push("检查日志中的完整错误堆栈，定位具体的失败点。");
    }
    if query.contains("性能") || query.contains("慢") {
        suggestions.push("考虑对热点路径增加缓存或批处理，减少重复计算。");
    }
    if query.contains("测试") {
        suggestions.push("为该场景补充单元测试，覆盖正常路径和边界条件。");
    }
    if suggestions.is_empty() {
        return String::new();
    }
    let mut out = String::from("建议：\n");
    for (i, s) in suggestions.into_iter().take(3).enumerate() {
        out.push_str(&format!("{}. {s}\n", i + 1));
    }
    out
}

fn minimal_fallback(query: &str) -> String {
    format!("未能生成完整的总结，原始问题是：{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_never_panics_on_empty_messages() {
        let out = fallback_generation(&[]);
        assert!(!out.is_empty());
    }

    #[test]
    fn fallback_extracts_context_lines_from_system_prompt() {
        let messages = vec![
            ChatMessage { role: "system".into(), content: "intro\n- 历史记忆条目一\n- 历史记忆条目二".into() },
            ChatMessage { role: "user".into(), content: "如何实现这个功能".into() },
        ];
        let out = fallback_generation(&messages);
        assert!(out.contains("历史记忆条目一"));
        assert!(out.contains("实现"));
    }

    #[test]
    fn fusion_fragments_are_numbered_and_labeled() {
        let passages = vec![
            Passage { role: PassageRole::User, content: "What is a B-tree?".into() },
            Passage { role: PassageRole::Assistant, content: "A self-balancing search tree".into() },
        ];
        let fragments = passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("<fragment_{:02}>\n[{}] {}\n</fragment_{:02}>", i + 1, p.role.label(), p.content, i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(fragments.contains("<fragment_01>"));
        assert!(fragments.contains("[用户] What is a B-tree?"));
        assert!(fragments.contains("[助手] A self-balancing search tree"));
    }

    #[test]
    fn analyze_user_query_branches_on_keywords() {
        assert!(analyze_user_query("API调用超时").contains("接口调用"));
        assert!(analyze_user_query("随便问问").contains("历史记忆"));
    }
}
