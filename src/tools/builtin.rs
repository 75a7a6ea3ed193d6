//! Built-in local tools.
//!
//! The explicit registration list is [`default_tools`]: `time_tool`,
//! `web_search`, `mcp_query_personal_info` and, with the `postgres` feature
//! and a configured database URL, `query_postgres_tool`. Each tool is built
//! with [`AgentTool::new`] and returned as `Arc<dyn Tool>`.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::LocalToolsConfig;
use crate::error::ParleyError;
use crate::provider::http::{bearer_headers, shared_client};
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::ToolParameters;

/// Every local tool enabled by `config`, in registration order.
pub fn default_tools(config: &LocalToolsConfig) -> Vec<Arc<dyn Tool>> {
    #[cfg_attr(not(feature = "postgres"), allow(unused_mut))]
    let mut tools = vec![
        time_tool(),
        web_search_tool(
            config.tavily_base_url.clone(),
            config.tavily_api_key_env.clone(),
            config.search_max_results,
        ),
        personal_info_tool(config.personal_info_url.clone()),
    ];

    #[cfg(feature = "postgres")]
    if let Some(url) = config.postgres_url.as_deref() {
        match postgres::query_postgres_tool(url) {
            Ok(tool) => tools.push(tool),
            Err(err) => tracing::warn!(error = %err, "query_postgres_tool disabled"),
        }
    }

    tools
}

/// `time_tool`: current server time.
pub fn time_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "time_tool",
        "Use this tool ONLY when the user asks for the current date or time.",
        ToolParameters::empty(),
        |_args, _ctx: ToolExecutionContext| async move {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            Ok(serde_json::Value::String(format!(
                "The current server time is {now}"
            )))
        },
    ))
}

/// `web_search`: Tavily search API.
pub fn web_search_tool(base_url: String, api_key_env: String, max_results: u32) -> Arc<dyn Tool> {
    let base_url = base_url.trim_end_matches('/').to_string();
    Arc::new(AgentTool::new(
        "web_search",
        "Search the web for up-to-date or general information.",
        ToolParameters::object()
            .string("query", "What to search for", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let url = format!("{base_url}/search");
            let api_key_env = api_key_env.clone();
            async move {
                let query = args.get_str("query")?;
                let api_key = std::env::var(&api_key_env).map_err(|_| {
                    ParleyError::tool("web_search", format!("{api_key_env} is not set"))
                })?;
                info!(query, "web search");

                let resp = shared_client()
                    .post(&url)
                    .headers(bearer_headers(&api_key))
                    .json(&serde_json::json!({
                        "query": query,
                        "max_results": max_results,
                    }))
                    .send()
                    .await
                    .map_err(|e| ParleyError::tool("web_search", e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ParleyError::tool(
                        "web_search",
                        format!("search API returned {status}: {body}"),
                    ));
                }
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| ParleyError::tool("web_search", e.to_string()))?;
                Ok(serde_json::json!({
                    "query": query,
                    "results": data.get("results").cloned().unwrap_or_default(),
                }))
            }
        },
    ))
}

#[derive(Debug, Deserialize)]
struct PersonalInfo {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    dob: Option<String>,
    street_address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

impl PersonalInfo {
    fn render(&self) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        format!(
            "Personal Information Found:\n\
             - Name: {} {}\n\
             - Email: {}\n\
             - Phone: {}\n\
             - DOB: {}\n\
             - Address: {}, {}, {} {}, {}",
            field(&self.first_name),
            field(&self.last_name),
            field(&self.email),
            field(&self.phone),
            field(&self.dob),
            field(&self.street_address),
            field(&self.city),
            field(&self.state),
            field(&self.postal_code),
            field(&self.country),
        )
    }
}

/// `mcp_query_personal_info`: GET `{base}/personal_info?email=`.
///
/// A 404 is a normal answer ("No user found ..."); other failures are tool errors.
pub fn personal_info_tool(base_url: String) -> Arc<dyn Tool> {
    let endpoint = format!("{}/personal_info", base_url.trim_end_matches('/'));
    Arc::new(AgentTool::new(
        "mcp_query_personal_info",
        "Look up a person's details by email address.",
        ToolParameters::object()
            .string("email", "Email address to look up", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let endpoint = endpoint.clone();
            async move {
                let email = args.get_str("email")?;
                debug!(endpoint = %endpoint, "personal info lookup");

                let resp = shared_client()
                    .get(&endpoint)
                    .query(&[("email", email)])
                    .send()
                    .await
                    .map_err(|e| ParleyError::tool("mcp_query_personal_info", e.to_string()))?;

                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(serde_json::Value::String(format!(
                        "No user found with email: {email}"
                    )));
                }
                if !status.is_success() {
                    return Err(ParleyError::tool(
                        "mcp_query_personal_info",
                        format!("HTTP error: {status}"),
                    ));
                }

                let info: PersonalInfo = resp
                    .json()
                    .await
                    .map_err(|e| ParleyError::tool("mcp_query_personal_info", e.to_string()))?;
                Ok(serde_json::Value::String(info.render()))
            }
        },
    ))
}

#[cfg(feature = "postgres")]
mod postgres {
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;

    use crate::error::ParleyError;
    use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
    use crate::tools::types::ToolParameters;

    /// Wrap a read query so the database returns every row as one JSON array.
    ///
    /// Only `SELECT` and `WITH` queries can sit in a subquery; anything else is
    /// refused here rather than failing inside the database.
    pub fn wrap_as_json_rows(query: &str) -> Result<String, ParleyError> {
        let query = query.trim().trim_end_matches(';').trim_end();
        let keyword = query
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if keyword != "select" && keyword != "with" {
            return Err(ParleyError::tool(
                "query_postgres_tool",
                "Only SELECT or WITH queries are supported",
            ));
        }
        Ok(format!(
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json)::text FROM ({query}) t"
        ))
    }

    /// `query_postgres_tool`: runs a read query and returns the rows as JSON text.
    ///
    /// The pool connects lazily, so a database that is down only fails the call.
    pub fn query_postgres_tool(url: &str) -> Result<Arc<dyn Tool>, ParleyError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(url)
            .map_err(|e| ParleyError::Configuration(format!("Invalid postgres URL: {e}")))?;

        Ok(Arc::new(AgentTool::new(
            "query_postgres_tool",
            "Run a read-only SQL query against the internal PostgreSQL database. \
             Only SELECT or WITH queries are accepted; rows come back as a JSON array. \
             Keep result sets small.",
            ToolParameters::object()
                .string("query", "SELECT or WITH query to run", true)
                .build(),
            move |args, _ctx: ToolExecutionContext| {
                let pool = pool.clone();
                async move {
                    let wrapped = wrap_as_json_rows(args.get_str("query")?)?;
                    let rows: String = sqlx::query_scalar(&wrapped)
                        .fetch_one(&pool)
                        .await
                        .map_err(|e| {
                            ParleyError::tool(
                                "query_postgres_tool",
                                format!("Error querying database: {e}"),
                            )
                        })?;
                    Ok(serde_json::Value::String(rows))
                }
            },
        )))
    }

}
