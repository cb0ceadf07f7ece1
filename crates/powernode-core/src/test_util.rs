// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Raw HTTP responders for transfers that end in ways mockito cannot serve.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accept one connection, write `response` verbatim and close the socket.
/// Returns the base URL of the listener.
pub(crate) async fn serve_once(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0_u8; 4096];
        let _ = socket.read(&mut request).await;
        socket.write_all(&response).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Status line and headers followed by a body that stops at `body`.
pub(crate) fn truncated_response(headers: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 200 OK\r\n{headers}Connection: close\r\n\r\n").into_bytes();
    response.extend_from_slice(body);
    response
}
