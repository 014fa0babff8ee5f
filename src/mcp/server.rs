//! MCP Server implementation
//!
//! Newline-delimited JSON-RPC over stdio. Each line is one request or
//! notification; each response is written as one line.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{GsuiteMcpError, McpError, Result};
use crate::mcp::prompts;
use crate::mcp::resources::ResourceHandler;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
pub const SERVER_NAME: &str = "gsuite-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Gmail, Calendar and People
pub struct McpServer {
    tool_handler: ToolHandler,
    resources: ResourceHandler,

    /// Set once the client confirms initialization
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(tool_handler: ToolHandler) -> Self {
        Self {
            resources: ResourceHandler::from_tools(&tool_handler),
            tool_handler,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio
    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve requests until the reader reaches end of input
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(&line).await {
                let mut encoded = serde_json::to_string(&response)?;
                encoded.push('\n');
                if let Err(e) = writer.write_all(encoded.as_bytes()).await {
                    tracing::error!("Failed to write response: {}", e);
                    return Err(e.into());
                }
                writer.flush().await?;
            }
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle one JSON-RPC message; notifications produce no response
    pub async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Unparsable message: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::PING => Ok(serde_json::json!({})),
            methods::LIST_TOOLS => self.handle_list_tools(),
            methods::CALL_TOOL => self.handle_call_tool(&request).await,
            methods::LIST_RESOURCES => to_result(&ListResourcesResult {
                resources: self.resources.list_resources(),
            }),
            methods::READ_RESOURCE => self.handle_read_resource(&request).await,
            methods::LIST_PROMPTS => to_result(&ListPromptsResult {
                prompts: prompts::list_prompts(),
            }),
            methods::GET_PROMPT => self.handle_get_prompt(&request),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                self.initialized = true;
                tracing::info!("Client initialized");
            }
            other => tracing::debug!("Ignoring notification {}", other),
        }
    }

    fn handle_initialize(&self) -> std::result::Result<Value, JsonRpcError> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(PromptsCapability::default()),
            },
        };

        to_result(&result)
    }

    fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        to_result(&ListToolsResult {
            tools: self.tool_handler.list_tools(),
        })
    }

    async fn handle_call_tool(
        &self,
        request: &JsonRpcRequest,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = request
            .params
            .clone()
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool parameters"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e))
                })
            })?;

        tracing::debug!("Calling tool {}", params.name);
        let result = self
            .tool_handler
            .call_tool(&params.name, params.arguments)
            .await;

        to_result(&result)
    }

    async fn handle_read_resource(
        &self,
        request: &JsonRpcRequest,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(request, "resource")?;

        tracing::debug!("Reading resource {}", params.uri);
        let result = self.resources.read(&params.uri).await.map_err(rpc_error)?;
        to_result(&result)
    }

    fn handle_get_prompt(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: GetPromptParams = parse_params(request, "prompt")?;

        tracing::debug!("Rendering prompt {}", params.name);
        let result = prompts::get_prompt(&params.name, &params.arguments).map_err(rpc_error)?;
        to_result(&result)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    request: &JsonRpcRequest,
    kind: &str,
) -> std::result::Result<T, JsonRpcError> {
    let params = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Missing {} parameters", kind)))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {} parameters: {}", kind, e)))
}

/// Map a resource or prompt failure to its JSON-RPC error
fn rpc_error(err: GsuiteMcpError) -> JsonRpcError {
    match &err {
        GsuiteMcpError::Mcp(McpError::UnknownResource { uri }) => {
            JsonRpcError::resource_not_found(uri)
        }
        GsuiteMcpError::Mcp(
            McpError::UnknownPrompt { .. } | McpError::MissingPromptArgument { .. },
        ) => JsonRpcError::invalid_params(err.to_string()),
        _ => {
            tracing::warn!("Request failed: {}", err);
            JsonRpcError::internal_error(err.to_string())
        }
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::invalid_request(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_server() -> McpServer {
        let config = Config::ish("http://127.0.0.1:9", "testuser");
        McpServer::new(ToolHandler::from_config(&config).unwrap())
    }

    #[tokio::test]
    async fn test_initialize_and_notification() {
        let mut server = test_server();

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "gsuite-mcp");
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["capabilities"]["resources"].is_object());
        assert!(result["capabilities"]["prompts"].is_object());

        let none = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(none.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let mut server = test_server();

        let parse = server.handle_message("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, JsonRpcError::PARSE_ERROR);
        assert!(parse.id.is_none());

        let unknown = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"resources/subscribe"}"#)
            .await
            .unwrap();
        assert_eq!(unknown.id, Some(RequestId::String("a".to_string())));
        assert_eq!(unknown.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);

        let missing = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(missing.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_response() {
        let mut server = test_server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );

        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let tools: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(tools["id"], 2);
        assert_eq!(tools["result"]["tools"].as_array().unwrap().len(), 26);
    }

    #[tokio::test]
    async fn test_resource_and_prompt_listing() {
        let mut server = test_server();

        let resources = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#)
            .await
            .unwrap();
        let resources = resources.result.unwrap();
        assert_eq!(resources["resources"].as_array().unwrap().len(), 8);
        assert_eq!(resources["resources"][0]["mimeType"], "application/json");

        let prompts = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"prompts/list"}"#)
            .await
            .unwrap();
        assert_eq!(prompts.result.unwrap()["prompts"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_resource_and_prompt_errors() {
        let mut server = test_server();

        let unknown = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"gsuite://nope"}}"#,
            )
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, JsonRpcError::RESOURCE_NOT_FOUND);

        let no_uri = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(no_uri.error.unwrap().code, JsonRpcError::INVALID_PARAMS);

        let missing_arg = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":3,"method":"prompts/get","params":{"name":"find_contact"}}"#,
            )
            .await
            .unwrap();
        let error = missing_arg.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert!(error.message.contains("search_term"));

        let unknown_prompt = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":4,"method":"prompts/get","params":{"name":"nope"}}"#,
            )
            .await
            .unwrap();
        assert_eq!(unknown_prompt.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_get_prompt() {
        let mut server = test_server();

        let response = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":1,"method":"prompts/get","params":{"name":"find_contact","arguments":{"search_term":"Ada"}}}"#,
            )
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["messages"][0]["role"], "user");
        assert_eq!(result["messages"][0]["content"]["type"], "text");
        assert!(result["messages"][0]["content"]["text"]
            .as_str()
            .unwrap()
            .contains("\"Ada\""));
    }
}
