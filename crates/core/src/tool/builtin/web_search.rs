//! `web_search`: query a web search provider and return a short digest.
//!
//! Brave is used when `BRAVE_API_KEY`/`SEARCH_API_KEY` is set, DuckDuckGo's
//! instant-answer API otherwise (no key required).

use async_trait::async_trait;
use anvil_foundation::{
    ConfirmationRequest, Error, Result, Tool, ToolContext, ToolMeta, ToolMetadata, ToolResult,
    ValidationOutcome,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchProvider {
    Brave,
    #[default]
    DuckDuckGo,
}

#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub provider: SearchProvider,
    pub api_key: Option<String>,
    pub max_results: usize,
    pub timeout: Duration,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        let api_key = std::env::var("BRAVE_API_KEY")
            .or_else(|_| std::env::var("SEARCH_API_KEY"))
            .ok();
        let provider = if api_key.is_some() {
            SearchProvider::Brave
        } else {
            SearchProvider::DuckDuckGo
        };
        Self {
            provider,
            api_key,
            max_results: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub provider: String,
}

pub struct WebSearchTool {
    config: WebSearchConfig,
    client: Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_config(WebSearchConfig::default())
    }

    pub fn with_config(config: WebSearchConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("anvil/1.0")
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        match self.config.provider {
            SearchProvider::Brave => self.search_brave(query, max_results).await,
            SearchProvider::DuckDuckGo => self.search_duckduckgo(query, max_results).await,
        }
    }

    async fn search_brave(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("BRAVE_API_KEY not set".to_string()))?;

        let url = format!(
            "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
            urlencoding::encode(query),
            max_results
        );

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!("Brave API error: {}", response.status())));
        }

        let data: Value = response.json().await.map_err(|e| Error::Provider(e.to_string()))?;
        let results = Self::parse_brave_response(&data);

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            provider: "Brave".to_string(),
        })
    }

    fn parse_brave_response(data: &Value) -> Vec<SearchResult> {
        let mut results = Vec::new();
        if let Some(web_results) = data["web"]["results"].as_array() {
            for item in web_results {
                let title = item["title"].as_str().unwrap_or_default().to_string();
                let url = item["url"].as_str().unwrap_or_default().to_string();
                let description = item["description"].as_str().unwrap_or_default().to_string();
                let source = url::Url::parse(&url)
                    .map(|u| u.host_str().unwrap_or_default().to_string())
                    .unwrap_or_default();

                if !title.is_empty() && !url.is_empty() {
                    results.push(SearchResult { title, url, description, source });
                }
            }
        }
        results
    }

    async fn search_duckduckgo(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await.map_err(|e| Error::Provider(e.to_string()))?;
        let data: Value = response.json().await.map_err(|e| Error::Provider(e.to_string()))?;

        let mut results = Vec::new();
        if let Some(abstract_text) = data["AbstractText"].as_str() {
            if !abstract_text.is_empty() {
                results.push(SearchResult {
                    title: data["Heading"].as_str().unwrap_or("Answer").to_string(),
                    url: data["AbstractURL"].as_str().unwrap_or_default().to_string(),
                    description: abstract_text.to_string(),
                    source: data["AbstractSource"].as_str().unwrap_or_default().to_string(),
                });
            }
        }

        if let Some(topics) = data["RelatedTopics"].as_array() {
            for topic in topics.iter().take(max_results.saturating_sub(results.len())) {
                if let Some(text) = topic["Text"].as_str() {
                    let url = topic["FirstURL"].as_str().unwrap_or_default();
                    results.push(SearchResult {
                        title: text.chars().take(100).collect(),
                        url: url.to_string(),
                        description: text.to_string(),
                        source: "DuckDuckGo".to_string(),
                    });
                }
            }
        }

        Ok(SearchResponse { query: query.to_string(), results, provider: "DuckDuckGo".to_string() })
    }

    fn format_results(&self, response: &SearchResponse) -> String {
        let mut output = format!("Search results for: \"{}\"\n", response.query);
        output.push_str(&format!("Provider: {}\n\n", response.provider));

        if response.results.is_empty() {
            output.push_str("No results found.\n");
        } else {
            for (i, result) in response.results.iter().enumerate() {
                output.push_str(&format!("{}. {}\n   {}\n", i + 1, result.title, result.url));
                if !result.description.is_empty() {
                    output.push_str(&format!("   {}\n", result.description));
                }
                output.push('\n');
            }
        }
        output
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new("web_search")
            .display_name("Web Search")
            .description("Search the web for information")
            .category("web")
            .requires_confirmation(true)
            .makes_network_requests(true)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 10)",
                    "default": 10
                }
            },
            "required": ["query"]
        })
    }

    fn validate(&self, args: &Value) -> ValidationOutcome {
        match args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => ValidationOutcome::ok(),
            _ => ValidationOutcome::error("query is required"),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(self.name())
    }

    async fn execute(&self, args: Value, context: &dyn ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return Ok(ToolResult::error("Missing required parameter: query", elapsed())),
        };
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.config.max_results);

        let confirmed = context
            .confirm(ConfirmationRequest::new("web_search", &query))
            .await?;
        if !confirmed {
            return Ok(ToolResult::denied(elapsed()));
        }

        info!(query = %query, max_results, "web_search");

        match self.search(&query, max_results).await {
            Ok(response) => Ok(ToolResult::success(self.format_results(&response), elapsed())),
            Err(e) => {
                warn!(error = %e, "web_search failed");
                Ok(ToolResult::error(e.to_string(), elapsed()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta() {
        let tool = WebSearchTool::new();
        let meta = tool.meta();
        assert_eq!(meta.name, "web_search");
        assert!(meta.makes_network_requests);
    }

    #[test]
    fn test_validate_requires_query() {
        let tool = WebSearchTool::new();
        assert!(!tool.validate(&json!({})).is_ok());
        assert!(tool.validate(&json!({"query": "rust async"})).is_ok());
    }

    #[test]
    fn format_results_handles_empty() {
        let tool = WebSearchTool::new();
        let response = SearchResponse {
            query: "x".to_string(),
            results: vec![],
            provider: "DuckDuckGo".to_string(),
        };
        assert!(tool.format_results(&response).contains("No results found"));
    }

    #[test]
    fn parse_brave_response_skips_incomplete_entries() {
        let data = json!({
            "web": {
                "results": [
                    {"title": "A", "url": "https://a.example", "description": "d"},
                    {"title": "", "url": "", "description": ""},
                ]
            }
        });
        let results = WebSearchTool::parse_brave_response(&data);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "a.example");
    }
}
