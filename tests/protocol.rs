use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use venuebook::cache::AvailabilityCache;
use venuebook::engine::Engine;
use venuebook::notify::NotifyHub;
use venuebook::service::Service;
use venuebook::timeslot::DEFAULT_BUSINESS_HOURS;
use venuebook::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("venuebook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Engine::new(dir.join("venuebook.wal"), Arc::new(NotifyHub::new()), DEFAULT_BUSINESS_HOURS).unwrap();
    let service = Arc::new(
        Service::new(Arc::new(engine), AvailabilityCache::new(Duration::from_secs(30), 1024))
            .with_today(|| NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
    );

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let service = service.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, service).await;
            });
        }
    });

    addr
}

/// Line-protocol client that sets notifications aside while waiting for replies.
struct Client {
    framed: Framed<TcpStream, LinesCodec>,
    notifications: VecDeque<Value>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
            notifications: VecDeque::new(),
        }
    }

    async fn read_line(&mut self) -> Option<Value> {
        let line = tokio::time::timeout(Duration::from_secs(5), self.framed.next())
            .await
            .ok()??
            .ok()?;
        Some(serde_json::from_str(&line).unwrap())
    }

    async fn query(&mut self, sql: &str) -> Value {
        self.framed.send(sql.to_string()).await.unwrap();
        loop {
            let msg = self.read_line().await.expect("reply");
            if msg.get("notification").is_some() {
                self.notifications.push_back(msg);
            } else {
                return msg;
            }
        }
    }

    /// Next notification, waiting up to `timeout`.
    async fn notification(&mut self, timeout: Duration) -> Option<Value> {
        if let Some(n) = self.notifications.pop_front() {
            return Some(n);
        }
        let line = tokio::time::timeout(timeout, self.framed.next()).await.ok()??.ok()?;
        Some(serde_json::from_str(&line).unwrap())
    }
}

async fn register_venue(client: &mut Client) -> Ulid {
    let vid = Ulid::new();
    let reply = client
        .query(&format!("INSERT INTO venues (id, name, price) VALUES ('{vid}', 'Harbour Room', 250.00)"))
        .await;
    assert_eq!(reply["ok"], true, "{reply}");
    vid
}

fn booking_sql(vid: Ulid, date: &str, start: &str, end: &str) -> String {
    format!(
        "INSERT INTO bookings (venue_id, organizer_id, event_name, event_date, start_time, end_time) \
         VALUES ('{vid}', '{}', 'Team offsite', '{date}', '{start}', '{end}')",
        Ulid::new()
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_and_check_availability() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let vid = register_venue(&mut client).await;

    let created = client.query(&booking_sql(vid, "2025-06-01", "14:00", "16:00")).await;
    assert_eq!(created["ok"], true);
    assert_eq!(created["data"]["status"], "pending");
    assert_eq!(created["data"]["totalCost"], "250.00");

    let slot = client
        .query(&format!(
            "SELECT * FROM availability WHERE venue_id = '{vid}' AND event_date = '2025-06-01' \
             AND start_time = '12:00' AND end_time = '14:00'"
        ))
        .await;
    assert_eq!(slot["data"]["available"], true);
    assert_eq!(slot["data"]["status"], "Pending");

    let slots = client
        .query(&format!("SELECT * FROM free_slots WHERE venue_id = '{vid}' AND event_date = '2025-06-01'"))
        .await;
    assert_eq!(slots["data"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn conflict_reply_lists_overlaps() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let vid = register_venue(&mut client).await;

    client.query(&booking_sql(vid, "2025-06-01", "10:00", "12:00")).await;
    let reply = client.query(&booking_sql(vid, "2025-06-01", "11:30", "13:00")).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "BookingConflict");
    assert_eq!(reply["error"]["conflicts"][0]["eventName"], "Team offsite");
    assert_eq!(reply["error"]["conflicts"][0]["endTime"], "12:00");
}

#[tokio::test]
async fn bad_statement_keeps_connection_open() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let reply = client.query("UPDATE bookings SET status = 'confirmed'").await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "ParseError");

    let reply = client.query("SELECT * FROM venues").await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"], serde_json::json!([]));
}

#[tokio::test]
async fn lifecycle_over_the_wire() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let vid = register_venue(&mut client).await;

    let created = client.query(&booking_sql(vid, "2025-07-04", "18:00", "22:00")).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    for status in ["approved", "confirmed"] {
        let reply = client
            .query(&format!("INSERT INTO booking_transitions (id, status) VALUES ('{id}', '{status}')"))
            .await;
        assert_eq!(reply["data"]["status"], status);
    }

    let reply = client.query(&format!("DELETE FROM bookings WHERE id = '{id}'")).await;
    assert_eq!(reply["error"]["kind"], "InvalidState");

    let reply = client
        .query(&format!("INSERT INTO booking_transitions (id, status) VALUES ('{id}', 'pending')"))
        .await;
    assert_eq!(reply["error"]["kind"], "InvalidTransition");
}

#[tokio::test]
async fn payment_over_the_wire() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let vid = register_venue(&mut client).await;

    let created = client.query(&booking_sql(vid, "2025-07-04", "18:00", "22:00")).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let record = format!("INSERT INTO booking_payments (id, payment_method) VALUES ('{id}', 'cash')");

    let early = client.query(&record).await;
    assert_eq!(early["error"]["kind"], "InvalidState");

    client
        .query(&format!("INSERT INTO booking_transitions (id, status) VALUES ('{id}', 'approved')"))
        .await;
    let paid = client.query(&record).await;
    assert_eq!(paid["data"]["status"], "confirmed");
    assert_eq!(paid["data"]["paymentMethod"], "cash");

    let summary = client
        .query(&format!("SELECT * FROM booking_payments WHERE id = '{id}'"))
        .await;
    assert_eq!(summary["data"]["status"], "paid");
    assert_eq!(summary["data"]["amount"], "250.00");
}

#[tokio::test]
async fn malformed_time_is_validation_error() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let vid = register_venue(&mut client).await;

    let reply = client.query(&booking_sql(vid, "2025-06-01", "25:00", "26:00")).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "ValidationError");
}

#[tokio::test]
async fn listen_receives_notification() {
    let addr = start_test_server().await;

    // Connection 1: subscriber
    let mut listener = Client::connect(addr).await;
    let vid = register_venue(&mut listener).await;
    let ack = listener.query(&format!("LISTEN venue_{vid}")).await;
    assert_eq!(ack["ok"], true);

    // Connection 2: mutator
    let mut writer = Client::connect(addr).await;
    writer.query(&booking_sql(vid, "2025-06-01", "09:00", "10:00")).await;

    let notif = listener
        .notification(Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(notif["notification"]["channel"], format!("venue_{vid}"));
    assert!(notif["notification"]["payload"]["BookingCreated"]["booking"].is_object());
}

#[tokio::test]
async fn notification_only_on_subscribed_venue() {
    let addr = start_test_server().await;
    let mut listener = Client::connect(addr).await;
    let vid_a = register_venue(&mut listener).await;
    let vid_b = register_venue(&mut listener).await;
    listener.query(&format!("LISTEN venue_{vid_a}")).await;

    let mut writer = Client::connect(addr).await;
    writer.query(&booking_sql(vid_b, "2025-06-01", "09:00", "10:00")).await;
    assert!(listener.notification(Duration::from_millis(200)).await.is_none());

    writer.query(&booking_sql(vid_a, "2025-06-01", "09:00", "10:00")).await;
    assert!(listener.notification(Duration::from_secs(5)).await.is_some());
}

#[tokio::test]
async fn unlisten_stops_notifications() {
    let addr = start_test_server().await;
    let mut listener = Client::connect(addr).await;
    let vid = register_venue(&mut listener).await;
    listener.query(&format!("LISTEN venue_{vid}")).await;
    listener.query("UNLISTEN *").await;

    let mut writer = Client::connect(addr).await;
    writer.query(&booking_sql(vid, "2025-06-01", "09:00", "10:00")).await;
    assert!(listener.notification(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn listen_unknown_venue_is_not_found() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let reply = client.query(&format!("LISTEN venue_{}", Ulid::new())).await;
    assert_eq!(reply["error"]["kind"], "NotFound");
}

#[tokio::test]
async fn concurrent_connections_one_winner() {
    let addr = start_test_server().await;
    let mut setup = Client::connect(addr).await;
    let vid = register_venue(&mut setup).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client.query(&booking_sql(vid, "2025-08-01", "12:00", "15:00")).await
        }));
    }

    let mut wins = 0;
    for h in handles {
        let reply = h.await.unwrap();
        if reply["ok"] == true {
            wins += 1;
        } else {
            assert_eq!(reply["error"]["kind"], "BookingConflict");
        }
    }
    assert_eq!(wins, 1);
}
