use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tether_core::config::RemoteConfig;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::remote::{ListQuery, RemoteService};

/// [`RemoteService`] over plain HTTP + JSON.
///
/// - `GET  {base}/items?q=&limit=` returns a JSON array of items
/// - `PUT  {base}/saved/{id}` saves
/// - `DELETE {base}/saved/{id}` removes
///
/// A 409 on save and a 404 on remove mean the server already holds the
/// requested state, and count as success.
pub struct HttpRemote<T> {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    _item: PhantomData<fn() -> T>,
}

impl<T> HttpRemote<T> {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout_ms: cfg.timeout_ms,
            _item: PhantomData,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn saved_url(&self, id: &str) -> String {
        format!("{}/saved/{}", self.base_url, urlencoding::encode(id))
    }

    fn map_send_error(&self, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout { ms: self.timeout_ms }
        } else if e.is_connect() {
            NetworkError::Unreachable(e.to_string())
        } else {
            NetworkError::Http(e)
        }
    }

    async fn send_ack(
        &self,
        req: reqwest::RequestBuilder,
        already_applied: StatusCode,
    ) -> Result<(), NetworkError> {
        let resp = req.send().await.map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if status.is_success() || status == already_applied {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %text, "remote rejected mutation");
        Err(NetworkError::Rejected {
            status: status.as_u16(),
            message: text,
        })
    }
}

#[async_trait]
impl<T> RemoteService for HttpRemote<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<T>, NetworkError> {
        let url = format!("{}/items", self.base_url);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = &query.filter {
            params.push(("q", filter.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        debug!(%url, ?query, "fetching list");
        let resp = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "list fetch failed");
            return Err(NetworkError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        resp.json::<Vec<T>>()
            .await
            .map_err(|e| NetworkError::Decode(e.to_string()))
    }

    async fn save(&self, id: &str) -> Result<(), NetworkError> {
        debug!(entity_id = %id, "remote save");
        self.send_ack(self.client.put(self.saved_url(id)), StatusCode::CONFLICT)
            .await
    }

    async fn remove(&self, id: &str) -> Result<(), NetworkError> {
        debug!(entity_id = %id, "remote remove");
        self.send_ack(self.client.delete(self.saved_url(id)), StatusCode::NOT_FOUND)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned response per connection and records request lines.
    async fn canned_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = sock.read(&mut buf).await.unwrap();
                let head = String::from_utf8_lossy(&buf[..n]);
                log.lock()
                    .unwrap()
                    .push(head.lines().next().unwrap_or_default().to_string());

                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn remote(base_url: String) -> HttpRemote<serde_json::Value> {
        HttpRemote::new(&RemoteConfig {
            base_url,
            timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_list_decodes_array() {
        let (base, seen) = canned_server(vec![(200, r#"[{"id":"a"},{"id":"b"}]"#)]).await;
        let items = remote(base)
            .fetch_list(&ListQuery::filtered("welder"))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(seen.lock().unwrap()[0], "GET /items?q=welder HTTP/1.1");
    }

    #[tokio::test]
    async fn idempotent_statuses_count_as_success() {
        let (base, seen) = canned_server(vec![(409, ""), (404, "")]).await;
        let remote = remote(base);

        remote.save("job 1/b").await.unwrap();
        remote.remove("job 1/b").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "PUT /saved/job%201%2Fb HTTP/1.1");
        assert_eq!(seen[1], "DELETE /saved/job%201%2Fb HTTP/1.1");
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let (base, _) = canned_server(vec![(500, "boom")]).await;
        let err = remote(base).save("a").await.unwrap_err();
        match err {
            NetworkError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let err = remote(format!("http://127.0.0.1:{port}"))
            .remove("a")
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Unreachable(_)), "{err}");
    }
}
