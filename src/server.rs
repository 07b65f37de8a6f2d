//! HTTP API
//!
//! Minimal HTTP/1.1 handling on top of tokio: one request per connection,
//! JSON in and out, permissive CORS headers.

use crate::context::AppContext;
use crate::db::execute_query;
use crate::error::Result;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEAD_BYTES: usize = 64 * 1024;
/// How long a client gets to send a complete request.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "error": message }))
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_http(&self) -> String {
        create_response(self.status, status_text(self.status), &self.body)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateSqlRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlRequest {
    #[serde(default)]
    sql: Option<String>,
}

pub async fn serve(ctx: Arc<AppContext>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        tokio::spawn(handle_connection(ctx.clone(), stream));
    }
}

async fn handle_connection(ctx: Arc<AppContext>, mut stream: TcpStream) {
    let response = match read_request_within(&mut stream, READ_TIMEOUT).await {
        Ok(request) => handle_request(&ctx, &request).await,
        Err(response) => response,
    };

    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
}

/// `read_request` bounded by `timeout`; a stalled client gets a 408.
pub async fn read_request_within<R>(
    stream: &mut R,
    timeout: Duration,
) -> std::result::Result<HttpRequest, HttpResponse>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, read_request(stream)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Request not received within {:?}", timeout);
            Err(HttpResponse::error(408, "Request timeout"))
        }
    }
}

/// Read the request head and exactly `Content-Length` body bytes.
/// Errors come back as the response to send.
pub async fn read_request<R>(stream: &mut R) -> std::result::Result<HttpRequest, HttpResponse>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(HttpResponse::error(400, "Request headers too large"));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| HttpResponse::error(400, "Failed to read request"))?;
        if n == 0 {
            return Err(HttpResponse::error(400, "Incomplete request"));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();

    let request_line = lines.next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(HttpResponse::error(400, "Malformed request line"));
    }

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| HttpResponse::error(400, "Invalid Content-Length"))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(HttpResponse::error(413, "Request body too large"));
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| HttpResponse::error(400, "Failed to read request body"))?;
        if n == 0 {
            return Err(HttpResponse::error(400, "Incomplete request body"));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method: parts[0].to_uppercase(),
        path: normalize_path(parts[1]),
        headers,
        body,
    })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Drop the query string and any trailing slash.
fn normalize_path(raw: &str) -> String {
    let path = raw.split('?').next().unwrap_or("");
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

pub async fn handle_request(ctx: &AppContext, request: &HttpRequest) -> HttpResponse {
    info!("Request: {} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::json(200, json!({})),
        ("GET", "/health") => HttpResponse::json(200, json!({"status": "ok", "service": "querygpt"})),
        ("GET", "/tables") => HttpResponse::json(200, json!({ "tables": ctx.catalog.table_names() })),
        ("POST", "/generate_sql") => generate_sql(ctx, &request.body).await,
        ("POST", "/execute_sql") => execute_sql(ctx, &request.body).await,
        _ => HttpResponse::error(404, "Not found"),
    }
}

async fn generate_sql(ctx: &AppContext, body: &[u8]) -> HttpResponse {
    let request: GenerateSqlRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Invalid /generate_sql body: {}", e);
            return HttpResponse::error(400, "Invalid JSON body");
        }
    };

    let query = match request.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return HttpResponse::error(400, "Query is required"),
    };

    match ctx.pipeline.run(&query, request.debug).await {
        Ok(output) => match serde_json::to_value(&output) {
            Ok(value) => HttpResponse::json(200, value),
            Err(e) => HttpResponse::json(
                500,
                json!({"error": "Error generating SQL", "details": e.to_string()}),
            ),
        },
        Err(e) => {
            error!("Error generating SQL: {:?}", e);
            HttpResponse::json(
                500,
                json!({"error": "Error generating SQL", "details": e.to_string()}),
            )
        }
    }
}

async fn execute_sql(ctx: &AppContext, body: &[u8]) -> HttpResponse {
    let sql = match serde_json::from_slice::<ExecuteSqlRequest>(body) {
        Ok(ExecuteSqlRequest { sql: Some(sql) }) if !sql.trim().is_empty() => sql,
        _ => return HttpResponse::error(400, "SQL query is required"),
    };

    let pool = match &ctx.pool {
        Some(pool) => pool,
        None => return HttpResponse::error(503, "Database not configured"),
    };

    match execute_query(pool, &sql).await {
        Ok(rows) => HttpResponse::json(200, json!({ "results": rows })),
        Err(e) => {
            error!("Database error: {:?}", e);
            HttpResponse::json(500, json!({"error": "Database error", "details": e.to_string()}))
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_request_with_body() {
        let raw = b"POST /generate_sql/?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 17\r\n\r\n{\"query\": \"abc\"}\n";
        let mut stream = &raw[..];
        let request = read_request(&mut stream).await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/generate_sql");
        assert_eq!(request.headers["host"], "localhost");
        assert_eq!(request.body, b"{\"query\": \"abc\"}\n".to_vec());
    }

    #[tokio::test]
    async fn test_read_request_rejects_large_body() {
        let raw = format!("POST /generate_sql HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        let mut stream = raw.as_bytes();
        let response = read_request(&mut stream).await.unwrap_err();
        assert_eq!(response.status, 413);
    }

    #[tokio::test]
    async fn test_read_request_truncated_body() {
        let raw = b"POST /execute_sql HTTP/1.1\r\nContent-Length: 50\r\n\r\n{\"sql\"";
        let mut stream = &raw[..];
        assert_eq!(read_request(&mut stream).await.unwrap_err().status, 400);
    }

    #[tokio::test]
    async fn test_read_request_times_out_on_stalled_client() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"POST /generate_sql HTTP/1.1\r\nHost: loc").await.unwrap();

        let response = read_request_within(&mut server, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(response.status, 408);
        assert!(response.to_http().starts_with("HTTP/1.1 408 Request Timeout\r\n"));
        drop(client);
    }

    #[tokio::test]
    async fn test_read_request_within_passes_complete_request() {
        let raw = b"GET /health HTTP/1.1\r\n\r\n";
        let mut stream = &raw[..];
        let request = read_request_within(&mut stream, Duration::from_secs(1)).await.unwrap();
        assert_eq!(request.path, "/health");
    }

    #[test]
    fn test_connection_handler_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let _check = |ctx: Arc<AppContext>, stream: TcpStream| {
            let fut = handle_connection(ctx, stream);
            assert_send(&fut);
        };
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/tables/"), "/tables");
        assert_eq!(normalize_path("/health?verbose=1"), "/health");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_create_response_headers() {
        let http = HttpResponse::error(404, "Not found").to_http();
        assert!(http.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(http.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(http.ends_with("\r\n\r\n{\"error\":\"Not found\"}"));
    }
}
