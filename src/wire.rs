use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::MAX_LINE_LEN;
use crate::model::Event;
use crate::service::{Service, ServiceError, channel_name, respond};
use crate::sql::{self, Command};

const NOTIFY_BUFFER: usize = 256;

/// LISTEN forwarders owned by one connection; aborted when it goes away.
#[derive(Default)]
struct Subscriptions {
    tasks: HashMap<Ulid, JoinHandle<()>>,
}

impl Subscriptions {
    fn listen(&mut self, venue_id: Ulid, rx: broadcast::Receiver<Event>, tx: mpsc::Sender<Value>) {
        if let Some(old) = self.tasks.insert(venue_id, tokio::spawn(forward(venue_id, rx, tx))) {
            old.abort();
        }
    }

    fn unlisten(&mut self, venue_id: Ulid) {
        if let Some(task) = self.tasks.remove(&venue_id) {
            task.abort();
        }
    }

    fn clear(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}

async fn forward(venue_id: Ulid, mut rx: broadcast::Receiver<Event>, tx: mpsc::Sender<Value>) {
    let channel = channel_name(venue_id);
    loop {
        match rx.recv().await {
            Ok(event) => {
                let msg = json!({ "notification": { "channel": channel, "payload": event } });
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("listener on {channel} lagged, {n} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Serve one client: a SQL statement per line in, a JSON document per line
/// out. Notifications for LISTENed venues are interleaved between replies.
pub async fn process_connection<S>(socket: S, service: Arc<Service>) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (notify_tx, mut notify_rx) = mpsc::channel::<Value>(NOTIFY_BUFFER);
    let mut subscriptions = Subscriptions::default();

    loop {
        tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        let err = ServiceError::Engine(EngineError::LimitExceeded("request line too long"));
                        framed.send(err.payload().to_string()).await?;
                        break;
                    }
                    Some(Err(e)) => return Err(e),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(&service, &line, &mut subscriptions, &notify_tx).await;
                framed.send(reply.to_string()).await?;
            }
            Some(notification) = notify_rx.recv() => {
                framed.send(notification.to_string()).await?;
            }
        }
    }

    Ok(())
}

enum ListenChange {
    Listen(Ulid),
    Unlisten(Ulid),
    Clear,
}

async fn handle_line(
    service: &Service,
    line: &str,
    subscriptions: &mut Subscriptions,
    notify_tx: &mpsc::Sender<Value>,
) -> Value {
    let cmd = match sql::parse_sql(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::debug!("rejected statement {line:?}: {e}");
            return ServiceError::from(e).payload();
        }
    };

    let change = match &cmd {
        Command::Listen { venue_id } => Some(ListenChange::Listen(*venue_id)),
        Command::Unlisten { venue_id } => Some(ListenChange::Unlisten(*venue_id)),
        Command::UnlistenAll => Some(ListenChange::Clear),
        _ => None,
    };

    let result = service.execute(cmd).await;
    if result.is_ok() {
        match change {
            Some(ListenChange::Listen(venue_id)) => {
                let rx = service.engine().notify.subscribe(venue_id);
                subscriptions.listen(venue_id, rx, notify_tx.clone());
            }
            Some(ListenChange::Unlisten(venue_id)) => subscriptions.unlisten(venue_id),
            Some(ListenChange::Clear) => subscriptions.clear(),
            None => {}
        }
    }
    respond(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AvailabilityCache;
    use crate::engine::Engine;
    use crate::notify::NotifyHub;
    use crate::timeslot::DEFAULT_BUSINESS_HOURS;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn service(name: &str) -> Arc<Service> {
        let dir = std::env::temp_dir().join("venuebook_test_wire");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        let engine = Engine::new(path, Arc::new(NotifyHub::new()), DEFAULT_BUSINESS_HOURS).unwrap();
        Arc::new(Service::new(Arc::new(engine), AvailabilityCache::new(Duration::from_secs(30), 64)))
    }

    #[tokio::test]
    async fn replies_one_line_per_statement() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let conn = tokio::spawn(process_connection(server, service("lines.wal").await));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"SELECT * FROM venues\n\nSELECT * FROM nowhere\n").await.unwrap();

        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first, json!({"ok": true, "data": []}));
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["error"]["kind"], "ParseError");

        drop(write);
        drop(lines);
        conn.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_line_rejected_and_closed() {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let conn = tokio::spawn(process_connection(server, service("oversized.wal").await));

        let (read, mut write) = tokio::io::split(client);
        let huge = format!("SELECT * FROM venues WHERE id = '{}'\n", "x".repeat(MAX_LINE_LEN + 16));
        write.write_all(huge.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["kind"], "LimitExceeded");
        assert!(lines.next_line().await.unwrap().is_none());
        conn.await.unwrap().unwrap();
    }
}
