use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::cache::{AvailabilityCache, CacheKey, CacheStats};
use crate::engine::{BookingEdit, Engine, EngineError};
use crate::observability;
use crate::sql::{Command, SqlError};

/// Source of "today" for past-date checks and booking statistics.
pub type Today = Box<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug)]
pub enum ServiceError {
    Sql(SqlError),
    Engine(EngineError),
    Encode(serde_json::Error),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Sql(SqlError::Invalid(_)) => "ValidationError",
            ServiceError::Sql(_) => "ParseError",
            ServiceError::Engine(e) => e.kind(),
            ServiceError::Encode(_) => "InternalError",
        }
    }

    /// Failures that are not the client's fault.
    pub fn is_internal(&self) -> bool {
        match self {
            ServiceError::Sql(_) => false,
            ServiceError::Engine(e) => !e.is_domain(),
            ServiceError::Encode(_) => true,
        }
    }

    /// `{"ok": false, "error": {...}}`; conflicts are listed for `BookingConflict`.
    pub fn payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let ServiceError::Engine(EngineError::BookingConflict(conflicts)) = self {
            error["conflicts"] = json!(conflicts);
        }
        json!({ "ok": false, "error": error })
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Sql(e) => write!(f, "{e}"),
            ServiceError::Engine(e) => write!(f, "{e}"),
            ServiceError::Encode(e) => write!(f, "failed to encode response: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<SqlError> for ServiceError {
    fn from(e: SqlError) -> Self {
        ServiceError::Sql(e)
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        ServiceError::Engine(e)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Encode(e)
    }
}

pub fn ok_payload(data: Value) -> Value {
    json!({ "ok": true, "data": data })
}

pub fn respond(result: Result<Value, ServiceError>) -> Value {
    match result {
        Ok(data) => ok_payload(data),
        Err(e) => e.payload(),
    }
}

pub fn channel_name(venue_id: Ulid) -> String {
    format!("venue_{venue_id}")
}

/// Request layer between the wire and the engine: runs commands, applies the
/// calendar checks that depend on today's date and owns the availability cache.
pub struct Service {
    engine: Arc<Engine>,
    cache: AvailabilityCache,
    today: Today,
}

impl Service {
    pub fn new(engine: Arc<Engine>, cache: AvailabilityCache) -> Self {
        Self {
            engine,
            cache,
            today: Box::new(|| chrono::Local::now().date_naive()),
        }
    }

    pub fn with_today(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run one command, recording query metrics.
    pub async fn execute(&self, cmd: Command) -> Result<Value, ServiceError> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.dispatch(cmd).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => {
                if e.is_internal() {
                    tracing::error!("{label} failed: {e}");
                } else {
                    tracing::debug!("{label} rejected: {e}");
                }
                "error"
            }
        };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, cmd: Command) -> Result<Value, ServiceError> {
        let engine = &self.engine;
        match cmd {
            // ── Writes ──────────────────────────────────────────
            Command::RegisterVenue { venue } => {
                let id = venue.id;
                engine.register_venue(venue).await?;
                self.cache.invalidate_venue(id);
                encode(engine.get_venue(id)?)
            }
            Command::UpdateVenue { id, changes } => {
                let venue = engine.update_venue(id, changes).await?;
                self.cache.invalidate_venue(id);
                encode(venue)
            }
            Command::CreateBooking { request } => {
                self.reject_past(request.event_date)?;
                let booking = engine.create_booking(request).await?;
                self.cache.invalidate(booking.venue_id, booking.event_date);
                encode(booking)
            }
            Command::UpdateBooking { id, changes } => {
                let current = engine.get_booking(id).await?;
                if let Some(date) = changes.event_date
                    && date != current.event_date
                {
                    self.reject_past(date)?;
                }
                let BookingEdit { booking, previous_date } = engine.edit_booking(id, changes).await?;
                self.cache.invalidate(booking.venue_id, previous_date);
                if booking.event_date != previous_date {
                    self.cache.invalidate(booking.venue_id, booking.event_date);
                }
                encode(booking)
            }
            Command::ChangeStatus { id, status } => {
                let booking = engine.change_status(id, status).await?;
                self.cache.invalidate(booking.venue_id, booking.event_date);
                encode(booking)
            }
            Command::DeleteBooking { id } => {
                let booking = engine.delete_booking(id).await?;
                self.cache.invalidate(booking.venue_id, booking.event_date);
                encode(booking)
            }
            Command::RecordPayment {
                id,
                method,
                transaction_id,
            } => {
                let booking = engine.record_payment(id, method, transaction_id).await?;
                self.cache.invalidate(booking.venue_id, booking.event_date);
                encode(booking)
            }
            Command::RefundPayment { id } => {
                let booking = engine.refund_payment(id).await?;
                self.cache.invalidate(booking.venue_id, booking.event_date);
                encode(booking)
            }

            // ── Directory and booking reads ─────────────────────
            Command::SelectVenues { id: Some(id) } => encode(engine.get_venue(id)?),
            Command::SelectVenues { id: None } => encode(engine.list_venues()),
            Command::SelectBooking { id } => encode(engine.get_booking(id).await?),
            Command::SelectBookings { filter } => encode(engine.list_bookings(&filter).await?),
            Command::SelectBookingStats { id } => encode(engine.booking_stats(id, (self.today)()).await?),
            Command::SelectPayment { id } => encode(engine.payment_summary(id).await?),

            // ── Availability (cached) ───────────────────────────
            Command::SelectDateAvailability { venue_id, date } => {
                self.cached(
                    CacheKey::day(venue_id, date, "date"),
                    engine.check_date_availability(venue_id, date),
                )
                .await
            }
            Command::SelectTimeSlot { venue_id, date, start, end } => {
                self.cached(
                    CacheKey::day(venue_id, date, format!("slot:{start}-{end}")),
                    engine.check_time_slot_availability(venue_id, date, start, end),
                )
                .await
            }
            Command::SelectFreeSlots {
                venue_id,
                date,
                slot_minutes,
            } => {
                self.cached(
                    CacheKey::day(venue_id, date, format!("slots:{slot_minutes}")),
                    engine.get_available_time_slots(venue_id, date, slot_minutes),
                )
                .await
            }
            Command::SelectMonthly { venue_id, year, month } => {
                self.cached(
                    CacheKey::month(venue_id, year, month, "month"),
                    engine.get_monthly_availability(venue_id, year, month),
                )
                .await
            }
            Command::SelectConflicts { venue_id, date, start, end } => {
                self.cached(
                    CacheKey::day(venue_id, date, format!("conflicts:{start}-{end}")),
                    engine.get_conflict_details(venue_id, date, start, end),
                )
                .await
            }

            // ── Notifications: subscriptions live on the connection ──
            Command::Listen { venue_id } => {
                engine.get_venue(venue_id)?;
                Ok(json!({ "channel": channel_name(venue_id) }))
            }
            Command::Unlisten { venue_id } => Ok(json!({ "channel": channel_name(venue_id) })),
            Command::UnlistenAll => Ok(json!({ "channel": "*" })),
        }
    }

    fn reject_past(&self, date: NaiveDate) -> Result<(), EngineError> {
        let today = (self.today)();
        if date < today {
            return Err(EngineError::Validation(format!(
                "event date {date} is in the past (today is {today})"
            )));
        }
        Ok(())
    }

    /// Serve from cache, or compute and cache unless a write raced the read.
    async fn cached<T: Serialize>(
        &self,
        key: CacheKey,
        compute: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<Value, ServiceError> {
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }
        let generation = self.cache.generation(key.venue_id);
        let value = serde_json::to_value(compute.await?)?;
        self.cache.insert(key, value.clone(), generation);
        Ok(value)
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use crate::sql::parse_sql;
    use crate::timeslot::DEFAULT_BUSINESS_HOURS;
    use std::path::PathBuf;
    use std::time::Duration;

    const VID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OID: &str = "01BX5ZZKBKACTAV9WEVGEMMVRY";

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("venuebook_test_service");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn service(name: &str) -> Service {
        let engine = Engine::new(test_wal_path(name), Arc::new(NotifyHub::new()), DEFAULT_BUSINESS_HOURS).unwrap();
        let svc = Service::new(Arc::new(engine), AvailabilityCache::new(Duration::from_secs(60), 128))
            .with_today(|| NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        run(&svc, &format!("INSERT INTO venues (id, name, price) VALUES ('{VID}', 'Hall', 300)"))
            .await
            .unwrap();
        svc
    }

    async fn run(svc: &Service, sql: &str) -> Result<Value, ServiceError> {
        svc.execute(parse_sql(sql)?).await
    }

    fn book(date: &str, start: &str, end: &str) -> String {
        format!(
            "INSERT INTO bookings (venue_id, organizer_id, event_name, event_date, start_time, end_time) \
             VALUES ('{VID}', '{OID}', 'Launch party', '{date}', '{start}', '{end}')"
        )
    }

    fn date_query(date: &str) -> String {
        format!("SELECT * FROM date_availability WHERE venue_id = '{VID}' AND event_date = '{date}'")
    }

    #[tokio::test]
    async fn create_returns_booking_record() {
        let svc = service("create.wal").await;
        let booking = run(&svc, &book("2025-06-01", "10:00", "12:00")).await.unwrap();
        assert_eq!(booking["status"], "pending");
        assert_eq!(booking["totalCost"], "300");
        assert_eq!(booking["startTime"], "10:00");
    }

    #[tokio::test]
    async fn past_dates_rejected() {
        let svc = service("past.wal").await;
        let err = run(&svc, &book("2025-04-30", "10:00", "12:00")).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        // Today is still bookable.
        let booking = run(&svc, &book("2025-05-01", "10:00", "12:00")).await.unwrap();
        let id = booking["id"].as_str().unwrap();
        let err = run(
            &svc,
            &format!("INSERT INTO booking_changes (id, event_date) VALUES ('{id}', '2025-04-01')"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn conflict_payload_lists_overlaps() {
        let svc = service("conflict.wal").await;
        run(&svc, &book("2025-06-01", "10:00", "12:00")).await.unwrap();
        let err = run(&svc, &book("2025-06-01", "11:00", "13:00")).await.unwrap_err();
        let payload = err.payload();
        assert_eq!(payload["ok"], false);
        assert_eq!(payload["error"]["kind"], "BookingConflict");
        assert_eq!(payload["error"]["conflicts"][0]["startTime"], "10:00");
        assert_eq!(payload["error"]["conflicts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn syntax_errors_have_their_own_kind() {
        let svc = service("parse.wal").await;
        let err = run(&svc, "SELECT * FROM nowhere").await.unwrap_err();
        let payload = err.payload();
        assert_eq!(payload["error"]["kind"], "ParseError");
        assert!(payload["error"].get("conflicts").is_none());
    }

    #[tokio::test]
    async fn malformed_field_values_are_validation_errors() {
        let svc = service("malformed.wal").await;
        let err = run(&svc, &book("2025-06-01", "25:00", "26:00")).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = run(&svc, &book("2025-13-01", "10:00", "11:00")).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.payload()["error"]["kind"], "ValidationError");
        // Nothing reached the store.
        let listed = run(&svc, &format!("SELECT * FROM bookings WHERE venue_id = '{VID}'")).await.unwrap();
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn payment_confirms_and_refund_frees_the_day() {
        let svc = service("payment.wal").await;
        let booking = run(&svc, &book("2025-06-01", "10:00", "12:00")).await.unwrap();
        let id = booking["id"].as_str().unwrap();
        run(
            &svc,
            &format!("INSERT INTO booking_transitions (id, status) VALUES ('{id}', 'approved')"),
        )
        .await
        .unwrap();
        assert_eq!(run(&svc, &date_query("2025-06-01")).await.unwrap()["status"], "Pending");

        let paid = run(
            &svc,
            &format!("INSERT INTO booking_payments (id, payment_method, transaction_id) VALUES ('{id}', 'card', 'TX-77')"),
        )
        .await
        .unwrap();
        assert_eq!(paid["status"], "confirmed");
        assert_eq!(paid["paymentStatus"], "paid");
        assert_eq!(run(&svc, &date_query("2025-06-01")).await.unwrap()["status"], "Confirmed");

        let summary = run(&svc, &format!("SELECT * FROM booking_payments WHERE id = '{id}'")).await.unwrap();
        assert_eq!(summary["method"], "card");
        assert_eq!(summary["transactionId"], "TX-77");
        assert_eq!(summary["amount"], "300");

        run(&svc, &format!("INSERT INTO booking_refunds (id) VALUES ('{id}')")).await.unwrap();
        let day = run(&svc, &date_query("2025-06-01")).await.unwrap();
        assert_eq!(day["available"], true);
        assert_eq!(day["status"], "Available");
    }

    #[tokio::test]
    async fn writes_invalidate_cached_availability() {
        let svc = service("cache.wal").await;
        let before = run(&svc, &date_query("2025-06-01")).await.unwrap();
        assert_eq!(before["available"], true);
        run(&svc, &date_query("2025-06-01")).await.unwrap();
        assert_eq!(svc.cache_stats().hits, 1);

        let booking = run(&svc, &book("2025-06-01", "10:00", "12:00")).await.unwrap();
        let after = run(&svc, &date_query("2025-06-01")).await.unwrap();
        assert_eq!(after["available"], false);
        assert_eq!(after["bookingCount"], 1);

        // Moving the booking frees the old day and fills the new one.
        let id = booking["id"].as_str().unwrap();
        run(&svc, &date_query("2025-06-02")).await.unwrap();
        run(
            &svc,
            &format!("INSERT INTO booking_changes (id, event_date) VALUES ('{id}', '2025-06-02')"),
        )
        .await
        .unwrap();
        assert_eq!(run(&svc, &date_query("2025-06-01")).await.unwrap()["available"], true);
        assert_eq!(run(&svc, &date_query("2025-06-02")).await.unwrap()["available"], false);
    }

    #[tokio::test]
    async fn venue_update_invalidates_free_slots() {
        let svc = service("venue_hours.wal").await;
        let query = format!("SELECT * FROM free_slots WHERE venue_id = '{VID}' AND event_date = '2025-06-01'");
        let slots = run(&svc, &query).await.unwrap();
        assert_eq!(slots.as_array().unwrap().len(), 14);

        run(
            &svc,
            &format!("INSERT INTO venue_changes (venue_id, open_time, close_time) VALUES ('{VID}', '10:00', '14:00')"),
        )
        .await
        .unwrap();
        let slots = run(&svc, &query).await.unwrap();
        assert_eq!(slots, json!(["10:00-11:00", "11:00-12:00", "12:00-13:00", "13:00-14:00"]));
    }

    #[tokio::test]
    async fn stats_use_injected_today() {
        let svc = service("stats.wal").await;
        let booking = run(&svc, &book("2025-05-11", "18:00", "20:30")).await.unwrap();
        let id = booking["id"].as_str().unwrap();
        let stats = run(&svc, &format!("SELECT * FROM booking_stats WHERE id = '{id}'")).await.unwrap();
        assert_eq!(stats["daysUntilEvent"], 10);
        assert_eq!(stats["isUpcoming"], true);
        assert_eq!(stats["duration"]["display"], "2h 30m");
    }

    #[tokio::test]
    async fn listen_requires_known_venue() {
        let svc = service("listen.wal").await;
        let ok = run(&svc, &format!("LISTEN venue_{VID}")).await.unwrap();
        assert_eq!(ok["channel"], format!("venue_{VID}"));
        let err = run(&svc, &format!("LISTEN venue_{OID}")).await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn respond_wraps_data() {
        assert_eq!(respond(Ok(json!([1, 2]))), json!({"ok": true, "data": [1, 2]}));
        let payload = respond(Err(ServiceError::Engine(EngineError::LimitExceeded("too many venues"))));
        assert_eq!(payload["error"]["kind"], "LimitExceeded");
    }

    #[test]
    fn execute_from_sync_context() {
        let result = tokio_test::block_on(async {
            let svc = service("blocking.wal").await;
            run(&svc, "SELECT * FROM venues").await
        });
        assert_eq!(result.unwrap()[0]["name"], "Hall");
    }
}
