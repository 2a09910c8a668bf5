//! Tool Kernel
//!
//! A per-invocation handle bundling the LLM connection, a filesystem-
//! scoped tool set, the prompt renderer, and a function-call interceptor
//! that records every tool invocation for diagnostics. Tool calls are
//! auto-invoked until the model answers with plain text.

pub mod chat;
pub mod compression;
pub mod extract;
pub mod tools;

pub use chat::{ChatBackend, ChatCompletion, ChatMessage, HttpChatBackend, ToolCallRequest, ToolSpec};
pub use tools::{DocumentContext, ToolSet};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::analyzer::DependencyAnalyzer;
use crate::config::Config;
use crate::constants::tools::MAX_TOOL_ROUNDS;
use crate::prompts::PromptLibrary;
use crate::types::{Result, ScribeError};

/// One intercepted tool invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub result_preview: String,
}

pub struct Kernel {
    backend: Arc<dyn ChatBackend>,
    tools: ToolSet,
    context: Arc<DocumentContext>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl Kernel {
    /// Build a kernel against the configured provider. Fails with
    /// `UnsupportedProvider` for unknown provider names.
    pub fn new(
        config: &Config,
        work_dir: &Path,
        model: &str,
        code_analysis_plugin_enabled: bool,
    ) -> Result<Self> {
        let provider = config.openai.provider()?;
        let backend = Arc::new(HttpChatBackend::new(
            provider,
            config.openai.endpoint.clone(),
            config.openai.chat_api_key.clone(),
            model,
        )?);
        Ok(Self::with_backend(backend, config, work_dir, code_analysis_plugin_enabled))
    }

    /// Build a kernel around an existing backend (tests use this with a
    /// scripted backend).
    pub fn with_backend(
        backend: Arc<dyn ChatBackend>,
        config: &Config,
        work_dir: &Path,
        code_analysis_plugin_enabled: bool,
    ) -> Self {
        let context = Arc::new(DocumentContext::default());
        // dependency tools need both the per-kernel plugin switch and the
        // global flag
        let analyzer = if code_analysis_plugin_enabled
            && config.document.enable_code_dependency_analysis
        {
            Some(Arc::new(DependencyAnalyzer::new(work_dir)))
        } else {
            None
        };
        let tools = ToolSet::new(
            work_dir,
            config.document.enable_code_compression,
            analyzer,
            context.clone(),
        );
        Self {
            backend,
            tools,
            context,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Files the model read during invocations on this kernel.
    pub fn take_accessed_files(&self) -> Vec<String> {
        self.context.take()
    }

    /// Intercepted tool calls, for diagnostics.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn record(&self, name: &str, result: &str) {
        let preview: String = result.chars().take(200).collect();
        debug!(tool = name, preview = %preview, "tool invoked");
        self.invocations.lock().unwrap().push(ToolInvocation {
            name: name.to_string(),
            result_preview: preview,
        });
    }

    /// Run a rendered template against the model, auto-invoking any tool
    /// calls, and return the final assistant text.
    pub async fn invoke_prompt(&self, template: &str, vars: &HashMap<&str, String>) -> Result<String> {
        let rendered = PromptLibrary::render(template, vars);
        let mut sink = |_: &str| {};
        self.run(rendered, false, &mut sink).await
    }

    /// Run a plugin function template (`plugin.function`).
    pub async fn invoke_plugin(
        &self,
        plugin: &str,
        function: &str,
        vars: &HashMap<&str, String>,
    ) -> Result<String> {
        let template = PromptLibrary::plugin(plugin, function).ok_or_else(|| {
            ScribeError::Config(format!("unknown plugin function {}.{}", plugin, function))
        })?;
        self.invoke_prompt(template, vars).await
    }

    /// Streaming variant of `invoke_plugin`: text deltas of every round
    /// are forwarded to the sink; the returned buffer holds only the
    /// final assistant text.
    pub async fn invoke_streaming(
        &self,
        plugin: &str,
        function: &str,
        vars: &HashMap<&str, String>,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let template = PromptLibrary::plugin(plugin, function).ok_or_else(|| {
            ScribeError::Config(format!("unknown plugin function {}.{}", plugin, function))
        })?;
        let rendered = PromptLibrary::render(template, vars);
        self.run(rendered, true, sink).await
    }

    /// Streaming invocation of a flat-namespace template.
    pub async fn invoke_template_streaming(
        &self,
        template: &str,
        vars: &HashMap<&str, String>,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let rendered = PromptLibrary::render(template, vars);
        self.run(rendered, true, sink).await
    }

    async fn run(
        &self,
        prompt: String,
        streaming: bool,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let specs = self.tools.specs();
        let mut messages = vec![ChatMessage::user(prompt)];

        for round in 0..MAX_TOOL_ROUNDS {
            let completion = if streaming {
                self.backend.stream(&messages, &specs, &mut *sink).await?
            } else {
                self.backend.complete(&messages, &specs).await?
            };

            if completion.tool_calls.is_empty() {
                return Ok(completion.content);
            }

            debug!(round, calls = completion.tool_calls.len(), "auto-invoking tools");
            messages.push(ChatMessage::assistant(
                completion.content,
                completion.tool_calls.clone(),
            ));
            for call in completion.tool_calls {
                let result = self.tools.invoke(&call.name, call.arguments).await;
                self.record(&call.name, &result);
                messages.push(ChatMessage::tool_result(call.id, result));
            }
        }

        warn!("tool round limit reached without a final answer");
        Err(ScribeError::llm("tool round limit reached"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend for pipeline tests.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed sequence of completions; `Err` entries simulate
    /// transient transport failures.
    pub struct ScriptedBackend {
        responses: Mutex<Vec<Result<ChatCompletion>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new(responses: Vec<Result<ChatCompletion>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn text(content: &str) -> Result<ChatCompletion> {
            Ok(ChatCompletion {
                content: content.to_string(),
                tool_calls: Vec::new(),
            })
        }

        fn next(&self) -> Result<ChatCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ScribeError::llm("scripted backend exhausted"));
            }
            responses.remove(0)
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, _: &[ChatMessage], _: &[ToolSpec]) -> Result<ChatCompletion> {
            self.next()
        }

        async fn stream(
            &self,
            _: &[ChatMessage],
            _: &[ToolSpec],
            sink: chat::ChunkSink<'_>,
        ) -> Result<ChatCompletion> {
            let completion = self.next()?;
            sink(&completion.content);
            Ok(completion)
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use serde_json::json;

    fn kernel_with(responses: Vec<Result<ChatCompletion>>, dir: &Path) -> Kernel {
        let config = Config::default();
        Kernel::with_backend(Arc::new(ScriptedBackend::new(responses)), &config, dir, false)
    }

    #[tokio::test]
    async fn test_invoke_prompt_plain_answer() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel_with(vec![ScriptedBackend::text("<readme>Hi</readme>")], dir.path());
        let vars = HashMap::new();
        let out = kernel.invoke_prompt("say hi", &vars).await.unwrap();
        assert_eq!(out, "<readme>Hi</readme>");
    }

    #[tokio::test]
    async fn test_tool_calls_auto_invoked_and_intercepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn f() {}\n").unwrap();

        let with_call = Ok(ChatCompletion {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "c1".into(),
                name: "ReadFile".into(),
                arguments: json!({"filePath": "lib.rs"}),
            }],
        });
        let kernel = kernel_with(vec![with_call, ScriptedBackend::text("done")], dir.path());
        let out = kernel.invoke_prompt("read it", &HashMap::new()).await.unwrap();
        assert_eq!(out, "done");

        let invocations = kernel.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "ReadFile");
        assert_eq!(kernel.take_accessed_files(), vec!["lib.rs".to_string()]);
    }

    #[tokio::test]
    async fn test_streaming_returns_final_round_only() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel_with(vec![ScriptedBackend::text("<blog>body</blog>")], dir.path());
        let mut chunks = String::new();
        let mut sink = |s: &str| chunks.push_str(s);
        let out = kernel
            .invoke_streaming("CodeAnalysis", "GenerateReadme", &HashMap::new(), &mut sink)
            .await
            .unwrap();
        assert_eq!(out, "<blog>body</blog>");
        assert_eq!(chunks, out);
    }

    #[tokio::test]
    async fn test_unknown_plugin_function() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel_with(vec![], dir.path());
        let err = kernel
            .invoke_plugin("CodeAnalysis", "DoesNotExist", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::Config(_)));
    }
}
