use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::error::AuthFlowError;

/// Accept a single redirect on `listener` and return the full redirect URL.
pub async fn capture_redirect(
    listener: TcpListener,
    redirect_uri: &Url,
    timeout: Duration,
) -> Result<Url, AuthFlowError> {
    let accept = async {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let redirect = parse_request_target(&request)
            .and_then(|target| redirect_uri.join(target).ok());

        let (status, body) = match redirect {
            Some(_) => (
                "200 OK",
                "<!DOCTYPE html><html><body><h1>You can close this window.</h1>\
                 <p>Return to the application to continue.</p></body></html>",
            ),
            None => (
                "400 Bad Request",
                "<!DOCTYPE html><html><body><h1>Unexpected request.</h1></body></html>",
            ),
        };
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        redirect.ok_or(AuthFlowError::MissingCode)
    };

    tokio::time::timeout(timeout, accept)
        .await
        .map_err(|_| AuthFlowError::Timeout(timeout))?
}

/// Request target from a request line such as `GET /path?query HTTP/1.1`.
fn parse_request_target(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    if method != "GET" {
        return None;
    }
    parts.next().filter(|target| target.starts_with('/'))
}
