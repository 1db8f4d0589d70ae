//! Discovery surface: aggregated tools/resources/prompts across every
//! backing server, namespaced per `RuntimeConfig.tool_namespace_strategy`,
//! plus the `CallTool`/`ReadResource`/`GetPrompt` pass-through operations.
//!
//! No 1:1 teacher analog; the aggregation-then-watch shape follows the same
//! recompute-into-a-`Watchable` idiom as the rest of this crate.

use std::sync::Arc;

use mcpctl_catalog::CatalogEngine;
use mcpctl_domain::error::ControlError;
use mcpctl_domain::fingerprint::SpecKey;
use mcpctl_domain::runtime_config::ToolNamespaceStrategy;
use mcpctl_metadata_cache::MetadataCache;
use mcpctl_protocol::{McpPromptDef, McpResourceDef, McpToolDef};
use mcpctl_router::{RouteRequest, Router};
use serde::Serialize;
use serde_json::Value;

use crate::watchable::Watchable;

#[derive(Debug, Clone, Serialize)]
pub struct NamespacedTool {
    pub spec_key: SpecKey,
    pub exposed_name: String,
    pub tool: McpToolDef,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespacedResource {
    pub spec_key: SpecKey,
    pub resource: McpResourceDef,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespacedPrompt {
    pub spec_key: SpecKey,
    pub exposed_name: String,
    pub prompt: McpPromptDef,
}

pub struct Discovery {
    metadata: Arc<MetadataCache>,
    catalog: Arc<CatalogEngine>,
    router: Arc<Router>,
    tools: Watchable<Arc<Vec<NamespacedTool>>>,
    resources: Watchable<Arc<Vec<NamespacedResource>>>,
    prompts: Watchable<Arc<Vec<NamespacedPrompt>>>,
}

impl Discovery {
    pub fn new(metadata: Arc<MetadataCache>, catalog: Arc<CatalogEngine>, router: Arc<Router>) -> Self {
        Self {
            metadata,
            catalog,
            router,
            tools: Watchable::new(Arc::new(Vec::new())),
            resources: Watchable::new(Arc::new(Vec::new())),
            prompts: Watchable::new(Arc::new(Vec::new())),
        }
    }

    /// Recompute every aggregated view from the metadata cache. Cheap
    /// enough to run unconditionally on a timer rather than tracking a
    /// per-spec dirty bit; called after every catalog reload too.
    pub fn refresh(&self) {
        let snapshot = self.catalog.snapshot();
        let strategy = snapshot.summary.runtime.tool_namespace_strategy;

        let mut tools = Vec::new();
        for (spec_key, defs) in self.metadata.all_tools() {
            let Some(spec) = snapshot.summary.spec_registry.get(&spec_key) else {
                continue;
            };
            if !spec.expose_tools {
                continue;
            }
            for tool in defs {
                let exposed_name = exposed_name(strategy, &spec.name, &tool.name);
                tools.push(NamespacedTool {
                    spec_key: spec_key.clone(),
                    exposed_name,
                    tool,
                });
            }
        }
        self.tools.set(Arc::new(tools));

        let mut resources = Vec::new();
        for (spec_key, defs) in self.metadata.all_resources() {
            if !snapshot.summary.spec_registry.contains_key(&spec_key) {
                continue;
            }
            for resource in defs {
                resources.push(NamespacedResource {
                    spec_key: spec_key.clone(),
                    resource,
                });
            }
        }
        self.resources.set(Arc::new(resources));

        let mut prompts = Vec::new();
        for (spec_key, defs) in self.metadata.all_prompts() {
            let Some(spec) = snapshot.summary.spec_registry.get(&spec_key) else {
                continue;
            };
            for prompt in defs {
                let exposed_name = exposed_name(strategy, &spec.name, &prompt.name);
                prompts.push(NamespacedPrompt {
                    spec_key: spec_key.clone(),
                    exposed_name,
                    prompt,
                });
            }
        }
        self.prompts.set(Arc::new(prompts));
    }

    pub fn list_tools(&self) -> Arc<Vec<NamespacedTool>> {
        self.tools.get()
    }

    pub fn list_resources(&self) -> Arc<Vec<NamespacedResource>> {
        self.resources.get()
    }

    pub fn list_prompts(&self) -> Arc<Vec<NamespacedPrompt>> {
        self.prompts.get()
    }

    pub fn watch_tools(&self) -> impl futures_core::Stream<Item = Arc<Vec<NamespacedTool>>> {
        self.tools.watch()
    }

    pub fn watch_resources(&self) -> impl futures_core::Stream<Item = Arc<Vec<NamespacedResource>>> {
        self.resources.watch()
    }

    pub fn watch_prompts(&self) -> impl futures_core::Stream<Item = Arc<Vec<NamespacedPrompt>>> {
        self.prompts.watch()
    }

    pub async fn call_tool(
        &self,
        exposed_name: &str,
        arguments: Value,
        routing_key: Option<String>,
    ) -> Result<Value, ControlError> {
        let entry = self
            .tools
            .get()
            .iter()
            .find(|t| t.exposed_name == exposed_name)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("unknown tool {exposed_name}")))?;

        let params = serde_json::json!({ "name": entry.tool.name, "arguments": arguments });
        let req = RouteRequest {
            spec_key: entry.spec_key,
            method: "tools/call".to_string(),
            params: Some(params),
            routing_key,
            allow_start: true,
        };
        self.router.route(req).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value, ControlError> {
        let entry = self
            .resources
            .get()
            .iter()
            .find(|r| r.resource.uri == uri)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("unknown resource {uri}")))?;

        let req = RouteRequest {
            spec_key: entry.spec_key,
            method: "resources/read".to_string(),
            params: Some(serde_json::json!({ "uri": uri })),
            routing_key: None,
            allow_start: true,
        };
        self.router.route(req).await
    }

    pub async fn get_prompt(&self, exposed_name: &str, arguments: Option<Value>) -> Result<Value, ControlError> {
        let entry = self
            .prompts
            .get()
            .iter()
            .find(|p| p.exposed_name == exposed_name)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("unknown prompt {exposed_name}")))?;

        let params = serde_json::json!({ "name": entry.prompt.name, "arguments": arguments });
        let req = RouteRequest {
            spec_key: entry.spec_key,
            method: "prompts/get".to_string(),
            params: Some(params),
            routing_key: None,
            allow_start: true,
        };
        self.router.route(req).await
    }
}

fn exposed_name(strategy: ToolNamespaceStrategy, server_name: &str, bare_name: &str) -> String {
    match strategy {
        ToolNamespaceStrategy::Prefix => format!("{server_name}.{bare_name}"),
        ToolNamespaceStrategy::Flat => bare_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_strategy_joins_server_and_tool_name() {
        assert_eq!(exposed_name(ToolNamespaceStrategy::Prefix, "calc", "add"), "calc.add");
    }

    #[test]
    fn flat_strategy_drops_the_server_name() {
        assert_eq!(exposed_name(ToolNamespaceStrategy::Flat, "calc", "add"), "add");
    }
}
