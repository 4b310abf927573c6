use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{BookingChanges, BookingFilter, BookingOrder, NewBooking, VenueChanges};
use crate::limits::DEFAULT_SLOT_MINUTES;
use crate::model::*;
use crate::timeslot::{TimeOfDay, TimeRange};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    RegisterVenue {
        venue: Venue,
    },
    UpdateVenue {
        id: Ulid,
        changes: VenueChanges,
    },
    CreateBooking {
        request: NewBooking,
    },
    UpdateBooking {
        id: Ulid,
        changes: BookingChanges,
    },
    ChangeStatus {
        id: Ulid,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    RecordPayment {
        id: Ulid,
        method: PaymentMethod,
        transaction_id: Option<String>,
    },
    RefundPayment {
        id: Ulid,
    },
    SelectVenues {
        id: Option<Ulid>,
    },
    SelectBooking {
        id: Ulid,
    },
    SelectBookings {
        filter: BookingFilter,
    },
    SelectBookingStats {
        id: Ulid,
    },
    SelectPayment {
        id: Ulid,
    },
    SelectDateAvailability {
        venue_id: Ulid,
        date: NaiveDate,
    },
    SelectTimeSlot {
        venue_id: Ulid,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    },
    SelectFreeSlots {
        venue_id: Ulid,
        date: NaiveDate,
        slot_minutes: u16,
    },
    SelectMonthly {
        venue_id: Ulid,
        year: i32,
        month: u32,
    },
    SelectConflicts {
        venue_id: Ulid,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    },
    Listen {
        venue_id: Ulid,
    },
    Unlisten {
        venue_id: Ulid,
    },
    UnlistenAll,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(rest) = strip_keyword(trimmed, "UNLISTEN") {
        return match rest {
            "*" => Ok(Command::UnlistenAll),
            channel => Ok(Command::Unlisten {
                venue_id: parse_channel(channel)?,
            }),
        };
    }
    if let Some(rest) = strip_keyword(trimmed, "LISTEN") {
        return Ok(Command::Listen {
            venue_id: parse_channel(rest)?,
        });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("one statement per line".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// `KEYWORD rest`, keyword matched case-insensitively.
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    let rest = &input[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then(|| rest.trim())
}

/// Channels are named `venue_<ulid>`.
fn parse_channel(channel: &str) -> Result<Ulid, SqlError> {
    let name = channel.trim().trim_matches(|c| c == '"' || c == '\'');
    let id = strip_prefix_ignore_case(name, "venue_").ok_or_else(|| SqlError::BadChannel(name.to_string()))?;
    Ulid::from_string(id).map_err(|_| SqlError::BadChannel(name.to_string()))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

// ── INSERT ────────────────────────────────────────────────────

const VENUE_COLUMNS: &[&str] = &["id", "name", "price", "is_active", "venue_status", "open_time", "close_time"];
const VENUE_CHANGE_COLUMNS: &[&str] = &["venue_id", "name", "price", "is_active", "venue_status", "open_time", "close_time"];
const BOOKING_COLUMNS: &[&str] = &["venue_id", "organizer_id", "event_name", "event_date", "start_time", "end_time", "notes"];
const BOOKING_CHANGE_COLUMNS: &[&str] = &["id", "event_name", "event_date", "start_time", "end_time", "notes"];
const TRANSITION_COLUMNS: &[&str] = &["id", "status"];
const PAYMENT_COLUMNS: &[&str] = &["id", "payment_method", "transaction_id"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    if insert.columns.is_empty() {
        return Err(SqlError::Parse(format!("INSERT INTO {table} needs an explicit column list")));
    }
    if insert.columns.len() != values.len() {
        return Err(SqlError::WrongArity(insert.columns.len(), values.len()));
    }
    let fields = Fields(
        insert
            .columns
            .iter()
            .map(|c| c.value.to_lowercase())
            .zip(values.iter())
            .collect(),
    );

    match table.as_str() {
        "venues" => {
            fields.only(VENUE_COLUMNS)?;
            let venue = Venue {
                id: parse_ulid_expr(fields.required("id")?)?,
                name: parse_string_expr(fields.required("name")?)?,
                price: fields.opt("price", parse_decimal_expr)?.unwrap_or(Decimal::ZERO),
                is_active: fields.opt("is_active", parse_bool)?.unwrap_or(true),
                venue_status: fields.opt("venue_status", parse_venue_status)?.unwrap_or(VenueStatus::Active),
                business_hours: parse_hours(&fields)?.flatten(),
            };
            Ok(Command::RegisterVenue { venue })
        }
        "venue_changes" => {
            fields.only(VENUE_CHANGE_COLUMNS)?;
            Ok(Command::UpdateVenue {
                id: parse_ulid_expr(fields.required("venue_id")?)?,
                changes: VenueChanges {
                    name: fields.opt("name", parse_string_expr)?,
                    price: fields.opt("price", parse_decimal_expr)?,
                    is_active: fields.opt("is_active", parse_bool)?,
                    venue_status: fields.opt("venue_status", parse_venue_status)?,
                    business_hours: parse_hours(&fields)?,
                },
            })
        }
        "bookings" => {
            fields.only(BOOKING_COLUMNS)?;
            Ok(Command::CreateBooking {
                request: NewBooking {
                    venue_id: parse_ulid_expr(fields.required("venue_id")?)?,
                    organizer_id: parse_ulid_expr(fields.required("organizer_id")?)?,
                    event_name: parse_string_expr(fields.required("event_name")?)?,
                    event_date: parse_date_expr(fields.required("event_date")?)?,
                    start_time: parse_time_expr(fields.required("start_time")?)?,
                    end_time: parse_time_expr(fields.required("end_time")?)?,
                    notes: fields.opt("notes", parse_string_expr)?,
                },
            })
        }
        "booking_changes" => {
            fields.only(BOOKING_CHANGE_COLUMNS)?;
            Ok(Command::UpdateBooking {
                id: parse_ulid_expr(fields.required("id")?)?,
                changes: BookingChanges {
                    event_name: fields.opt("event_name", parse_string_expr)?,
                    event_date: fields.opt("event_date", parse_date_expr)?,
                    start_time: fields.opt("start_time", parse_time_expr)?,
                    end_time: fields.opt("end_time", parse_time_expr)?,
                    // NULL notes clear them, same as blank.
                    notes: match fields.get("notes") {
                        Some(e) if is_null(e) => Some(String::new()),
                        Some(e) => Some(parse_string_expr(e)?),
                        None => None,
                    },
                },
            })
        }
        "booking_transitions" => {
            fields.only(TRANSITION_COLUMNS)?;
            Ok(Command::ChangeStatus {
                id: parse_ulid_expr(fields.required("id")?)?,
                status: parse_booking_status(fields.required("status")?)?,
            })
        }
        "booking_payments" => {
            fields.only(PAYMENT_COLUMNS)?;
            Ok(Command::RecordPayment {
                id: parse_ulid_expr(fields.required("id")?)?,
                method: parse_payment_method(fields.required("payment_method")?)?,
                transaction_id: fields.opt("transaction_id", parse_string_expr)?,
            })
        }
        "booking_refunds" => {
            fields.only(&["id"])?;
            Ok(Command::RefundPayment {
                id: parse_ulid_expr(fields.required("id")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `open_time`/`close_time` pair: absent → `None`, NULL → `Some(None)`.
fn parse_hours(fields: &Fields<'_>) -> Result<Option<Option<TimeRange>>, SqlError> {
    match (fields.get("open_time"), fields.get("close_time")) {
        (None, None) => Ok(None),
        (Some(open), Some(close)) if is_null(open) && is_null(close) => Ok(Some(None)),
        (Some(open), Some(close)) => {
            let (open, close) = (parse_time_expr(open)?, parse_time_expr(close)?);
            TimeRange::new(open, close)
                .map(|r| Some(Some(r)))
                .ok_or_else(|| SqlError::Invalid(format!("close_time {close} must be after open_time {open}")))
        }
        _ => Err(SqlError::Invalid("open_time and close_time must be given together".into())),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "bookings" => Ok(Command::DeleteBooking { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut pairs = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut pairs)?;
    }
    let filters = Fields(pairs);
    let venue_day = |f: &Fields<'_>| -> Result<(Ulid, NaiveDate), SqlError> {
        Ok((
            parse_ulid_expr(f.filter("venue_id")?)?,
            parse_date_expr(f.filter("event_date")?)?,
        ))
    };
    let window = |f: &Fields<'_>| -> Result<(TimeOfDay, TimeOfDay), SqlError> {
        Ok((
            parse_time_expr(f.filter("start_time")?)?,
            parse_time_expr(f.filter("end_time")?)?,
        ))
    };

    match table.as_str() {
        "venues" => {
            filters.only(&["id"])?;
            Ok(Command::SelectVenues {
                id: filters.opt("id", parse_ulid_expr)?,
            })
        }
        "bookings" => {
            filters.only(&["id", "venue_id", "organizer_id", "status", "event_date", "page_size", "page_offset"])?;
            if let Some(id) = filters.opt("id", parse_ulid_expr)? {
                return Ok(Command::SelectBooking { id });
            }
            let venue_id = filters.opt("venue_id", parse_ulid_expr)?;
            Ok(Command::SelectBookings {
                filter: BookingFilter {
                    venue_id,
                    organizer_id: filters.opt("organizer_id", parse_ulid_expr)?,
                    status: filters.opt("status", parse_booking_status)?,
                    event_date: filters.opt("event_date", parse_date_expr)?,
                    order: if venue_id.is_some() {
                        BookingOrder::Chronological
                    } else {
                        BookingOrder::NewestFirst
                    },
                    limit: filters.opt("page_size", parse_usize)?,
                    offset: filters.opt("page_offset", parse_usize)?.unwrap_or(0),
                },
            })
        }
        "booking_stats" => {
            filters.only(&["id"])?;
            Ok(Command::SelectBookingStats {
                id: parse_ulid_expr(filters.filter("id")?)?,
            })
        }
        "booking_payments" => {
            filters.only(&["id"])?;
            Ok(Command::SelectPayment {
                id: parse_ulid_expr(filters.filter("id")?)?,
            })
        }
        "date_availability" => {
            filters.only(&["venue_id", "event_date"])?;
            let (venue_id, date) = venue_day(&filters)?;
            Ok(Command::SelectDateAvailability { venue_id, date })
        }
        "availability" => {
            filters.only(&["venue_id", "event_date", "start_time", "end_time"])?;
            let (venue_id, date) = venue_day(&filters)?;
            let (start, end) = window(&filters)?;
            Ok(Command::SelectTimeSlot { venue_id, date, start, end })
        }
        "conflicts" => {
            filters.only(&["venue_id", "event_date", "start_time", "end_time"])?;
            let (venue_id, date) = venue_day(&filters)?;
            let (start, end) = window(&filters)?;
            Ok(Command::SelectConflicts { venue_id, date, start, end })
        }
        "free_slots" => {
            filters.only(&["venue_id", "event_date", "slot_minutes"])?;
            let (venue_id, date) = venue_day(&filters)?;
            Ok(Command::SelectFreeSlots {
                venue_id,
                date,
                slot_minutes: filters.opt("slot_minutes", parse_u16)?.unwrap_or(DEFAULT_SLOT_MINUTES),
            })
        }
        "monthly_availability" => {
            filters.only(&["venue_id", "event_month"])?;
            let (year, month) = parse_month_expr(filters.filter("event_month")?)?;
            Ok(Command::SelectMonthly {
                venue_id: parse_ulid_expr(filters.filter("venue_id")?)?,
                year,
                month,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND b = 2 ...` into column/value pairs.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.push((col, right.as_ref()));
            Ok(())
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}; only col = value joined by AND"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Column name → expression, from an INSERT row or a WHERE clause.
struct Fields<'a>(Vec<(String, &'a Expr)>);

impl<'a> Fields<'a> {
    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.0.iter().find(|(c, _)| c == col).map(|(_, e)| *e)
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(col))
    }

    fn filter(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingFilter(col))
    }

    /// Parse `col` if present and not NULL.
    fn opt<T>(&self, col: &str, parse: impl Fn(&Expr) -> Result<T, SqlError>) -> Result<Option<T>, SqlError> {
        match self.get(col) {
            Some(e) if !is_null(e) => parse(e).map(Some),
            _ => Ok(None),
        }
    }

    fn only(&self, allowed: &[&str]) -> Result<(), SqlError> {
        match self.0.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
            Some((c, _)) => Err(SqlError::UnknownColumn(c.clone())),
            None => Ok(()),
        }
    }
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("one row per INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Invalid(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Invalid(format!("bad ULID {s:?}: {e}")))
            }
            _ => Err(SqlError::Invalid(format!("expected string, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Invalid(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Invalid(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u16(expr: &Expr) -> Result<u16, SqlError> {
    let v = parse_i64_expr(expr)?;
    u16::try_from(v).map_err(|_| SqlError::Invalid(format!("{v} out of range")))
}

fn parse_usize(expr: &Expr) -> Result<usize, SqlError> {
    let v = parse_i64_expr(expr)?;
    usize::try_from(v).map_err(|_| SqlError::Invalid(format!("{v} must not be negative")))
}

fn parse_decimal_expr(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                Decimal::from_str(s).map_err(|e| SqlError::Invalid(format!("bad decimal {s}: {e}")))
            }
            _ => Err(SqlError::Invalid(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_decimal_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Invalid(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Invalid(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string_expr(expr)?;
    s.trim()
        .parse()
        .map_err(|_| SqlError::Invalid(format!("bad date {s:?}: expected YYYY-MM-DD")))
}

fn parse_time_expr(expr: &Expr) -> Result<TimeOfDay, SqlError> {
    parse_string_expr(expr)?
        .parse()
        .map_err(|e: crate::timeslot::TimeParseError| SqlError::Invalid(e.to_string()))
}

/// `'YYYY-MM'`.
fn parse_month_expr(expr: &Expr) -> Result<(i32, u32), SqlError> {
    let s = parse_string_expr(expr)?;
    let bad = || SqlError::Invalid(format!("bad month {s:?}: expected YYYY-MM"));
    let (y, m) = s.trim().split_once('-').ok_or_else(bad)?;
    Ok((y.parse().map_err(|_| bad())?, m.parse().map_err(|_| bad())?))
}

fn parse_booking_status(expr: &Expr) -> Result<BookingStatus, SqlError> {
    parse_string_expr(expr)?.parse().map_err(SqlError::Invalid)
}

fn parse_venue_status(expr: &Expr) -> Result<VenueStatus, SqlError> {
    parse_string_expr(expr)?.parse().map_err(SqlError::Invalid)
}

fn parse_payment_method(expr: &Expr) -> Result<PaymentMethod, SqlError> {
    parse_string_expr(expr)?.parse().map_err(SqlError::Invalid)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    /// A well-formed statement carrying a malformed field value.
    Invalid(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    BadChannel(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Invalid(s) => write!(f, "invalid value: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(expected, got) => {
                write!(f, "expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::BadChannel(c) => write!(f, "bad channel {c:?}: expected venue_<id>"),
        }
    }
}

impl std::error::Error for SqlError {}
