//! SQLite persistence layer.
//!
//! Only this module talks to the database. The connection sits behind a
//! mutex; every method takes the lock for the duration of one statement
//! (or one transaction) and releases it before returning.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::core::notifications::format_amount;
use crate::core::settlement::LedgerUpdate;
use crate::models::{
    AppError, AppResult, ErrorCode, Attendance, LiquidationRequest, LiquidationStatus, Payment,
    PaymentStatus, PayoutMethod, Registrant, Registration, RegistrationCategory,
    RegistrationRecord, RegistrationStatus, Role,
};

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

const REGISTRATION_COLUMNS: &str = "r.id, r.registrant_id, r.category, r.attendance, \
     r.organization, r.job_title, r.country, r.amount_paid, r.balance, r.payment_status, \
     r.registration_status, r.created_at, r.updated_at";

const PAYMENT_COLUMNS: &str = "id, registration_id, amount, transaction_reference, \
     customer_reference, method, created_at";

const LIQUIDATION_COLUMNS: &str = "id, requester_email, amount, payment_method, account_name, \
     account_number, bank_name, purpose, status, reviewed_by, review_note, created_at, \
     reviewed_at, processed_at";

/// Registration form data after validation
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub registrant_id: i64,
    pub category: RegistrationCategory,
    pub attendance: Attendance,
    pub organization: String,
    pub job_title: String,
    pub country: String,
    pub fee: Decimal,
}

/// A settled gateway transaction about to be recorded
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub registration_id: i64,
    pub amount: Decimal,
    pub transaction_reference: String,
    pub customer_reference: Option<String>,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct NewLiquidation {
    pub requester_email: String,
    pub amount: Decimal,
    pub payment_method: PayoutMethod,
    pub account_name: String,
    pub account_number: String,
    pub bank_name: Option<String>,
    pub purpose: String,
}

/// What to do when a transaction reference is already recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Record it again; the caller flags it
    Allow,
    /// Fail with DUPLICATE_SETTLEMENT and leave the ledger untouched
    Reject,
}

/// Result of appending a payment to a registration
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub payment: Payment,
    pub before: Registration,
    pub after: Registration,
    /// Payments already carrying this reference before this one
    pub previous_settlements: i64,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &str) -> AppResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        info!("🗄️  Database ready at {}", path);
        Ok(store)
    }

    /// In-memory database (tests, offline tooling)
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> AppResult<()> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::server("Database lock poisoned"))
    }

    // ── Registrants ────────────────────────────────────────────

    /// Create the registrant on first login, refresh the role on later ones.
    pub fn upsert_registrant(&self, email: &str, role: Role) -> AppResult<Registrant> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO registrants (email, role, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(email) DO UPDATE SET role = excluded.role",
            params![email, role.as_str(), now()],
        )?;
        let registrant = conn.query_row(
            "SELECT id, email, full_name, phone, role, created_at FROM registrants WHERE email = ?1",
            params![email],
            map_registrant,
        )?;
        Ok(registrant)
    }

    pub fn registrant(&self, id: i64) -> AppResult<Registrant> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, email, full_name, phone, role, created_at FROM registrants WHERE id = ?1",
            params![id],
            map_registrant,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Registrant {} not found", id)))
    }

    /// Update name and/or phone; `None` keeps the stored value.
    pub fn update_profile(
        &self,
        id: i64,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> AppResult<Registrant> {
        {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE registrants SET full_name = COALESCE(?2, full_name),
                                        phone = COALESCE(?3, phone)
                 WHERE id = ?1",
                params![id, full_name, phone],
            )?;
        }
        self.registrant(id)
    }

    // ── Registrations ──────────────────────────────────────────

    pub fn insert_registration(&self, new: &NewRegistration) -> AppResult<Registration> {
        let id = {
            let conn = self.lock()?;
            let ts = now();
            conn.execute(
                "INSERT INTO registrations (registrant_id, category, attendance, organization,
                     job_title, country, amount_paid, balance, payment_status,
                     registration_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    new.registrant_id,
                    new.category.as_str(),
                    new.attendance.as_str(),
                    new.organization,
                    new.job_title,
                    new.country,
                    Decimal::ZERO.to_string(),
                    new.fee.to_string(),
                    PaymentStatus::compute(Decimal::ZERO, new.fee).as_str(),
                    RegistrationStatus::Registered.as_str(),
                    ts,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.registration(id)
    }

    pub fn registration(&self, id: i64) -> AppResult<Registration> {
        let conn = self.lock()?;
        query_registration(&conn, id)
    }

    pub fn registrations_for(&self, registrant_id: i64) -> AppResult<Vec<Registration>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations r
             WHERE r.registrant_id = ?1 ORDER BY r.id ASC"
        ))?;
        let rows = stmt
            .query_map(params![registrant_id], map_registration)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Registrations joined with registrant identity, optionally filtered by
    /// payment status.
    pub fn registration_records(
        &self,
        payment_status: Option<PaymentStatus>,
    ) -> AppResult<Vec<RegistrationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REGISTRATION_COLUMNS}, g.email, g.full_name, g.phone
             FROM registrations r JOIN registrants g ON g.id = r.registrant_id
             WHERE (?1 IS NULL OR r.payment_status = ?1)
             ORDER BY r.id ASC"
        ))?;
        let rows = stmt
            .query_map(params![payment_status.map(|s| s.as_str())], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn registration_record(&self, id: i64) -> AppResult<RegistrationRecord> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {REGISTRATION_COLUMNS}, g.email, g.full_name, g.phone
                 FROM registrations r JOIN registrants g ON g.id = r.registrant_id
                 WHERE r.id = ?1"
            ),
            params![id],
            map_record,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Registration {} not found", id)))
    }

    /// Cancel a registration that has no money against it.
    pub fn cancel_registration(&self, id: i64) -> AppResult<Registration> {
        let conn = self.lock()?;
        let current = query_registration(&conn, id)?;
        if current.registration_status == RegistrationStatus::Cancelled {
            return Err(AppError::invalid_transition("Registration is already cancelled"));
        }
        if current.amount_paid > Decimal::ZERO {
            return Err(AppError::invalid_transition(
                "Registration has payments recorded and cannot be cancelled",
            ));
        }
        conn.execute(
            "UPDATE registrations SET registration_status = ?2, updated_at = ?3
             WHERE id = ?1 AND registration_status = ?4",
            params![
                id,
                RegistrationStatus::Cancelled.as_str(),
                now(),
                RegistrationStatus::Registered.as_str()
            ],
        )?;
        query_registration(&conn, id)
    }

    // ── Payments ───────────────────────────────────────────────

    pub fn count_payments_with_reference(&self, reference: &str) -> AppResult<i64> {
        let conn = self.lock()?;
        count_reference(&conn, reference)
    }

    /// Append a payment and move the registration ledger in one transaction.
    /// The duplicate check runs inside the same transaction, so two callers
    /// settling one reference cannot both see it as new.
    pub fn record_settlement(
        &self,
        new: &NewPayment,
        duplicates: DuplicatePolicy,
    ) -> AppResult<SettlementRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let before = query_registration(&tx, new.registration_id)?;
        let previous_settlements = count_reference(&tx, &new.transaction_reference)?;
        if previous_settlements > 0 && duplicates == DuplicatePolicy::Reject {
            return Err(AppError::new(
                ErrorCode::DuplicateSettlement,
                format!(
                    "Transaction {} has already been settled",
                    new.transaction_reference
                ),
            ));
        }
        let ledger = LedgerUpdate::apply(before.amount_paid, before.balance, new.amount);
        let ts = now();

        tx.execute(
            "INSERT INTO payments (registration_id, amount, transaction_reference,
                 customer_reference, method, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.registration_id,
                new.amount.to_string(),
                new.transaction_reference,
                new.customer_reference,
                new.method,
                ts,
            ],
        )?;
        let payment_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE registrations SET amount_paid = ?2, balance = ?3, payment_status = ?4,
                 updated_at = ?5
             WHERE id = ?1",
            params![
                new.registration_id,
                ledger.amount_paid.to_string(),
                ledger.balance.to_string(),
                ledger.payment_status.as_str(),
                ts,
            ],
        )?;

        let payment = tx.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![payment_id],
            map_payment,
        )?;
        let after = query_registration(&tx, new.registration_id)?;
        tx.commit()?;

        Ok(SettlementRecord {
            payment,
            before,
            after,
            previous_settlements,
        })
    }

    pub fn payment(&self, id: i64) -> AppResult<Payment> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            map_payment,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Payment {} not found", id)))
    }

    pub fn payments_for_registration(&self, registration_id: i64) -> AppResult<Vec<Payment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE registration_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![registration_id], map_payment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn payments(&self) -> AppResult<Vec<Payment>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], map_payment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Liquidations ───────────────────────────────────────────

    pub fn insert_liquidation(&self, new: &NewLiquidation) -> AppResult<LiquidationRequest> {
        let id = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO liquidation_requests (requester_email, amount, payment_method,
                     account_name, account_number, bank_name, purpose, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    new.requester_email,
                    new.amount.to_string(),
                    new.payment_method.as_str(),
                    new.account_name,
                    new.account_number,
                    new.bank_name,
                    new.purpose,
                    LiquidationStatus::Pending.as_str(),
                    now(),
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.liquidation(id)
    }

    pub fn liquidation(&self, id: i64) -> AppResult<LiquidationRequest> {
        let conn = self.lock()?;
        query_liquidation(&conn, id)
    }

    /// All requests, or only those filed by `requester`
    pub fn liquidations(&self, requester: Option<&str>) -> AppResult<Vec<LiquidationRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LIQUIDATION_COLUMNS} FROM liquidation_requests
             WHERE (?1 IS NULL OR requester_email = ?1) ORDER BY id DESC"
        ))?;
        let rows = stmt
            .query_map(params![requester], map_liquidation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Move a request from `from` to `to` with a single conditional update.
    /// Zero affected rows means someone else moved it first (or it never was
    /// in `from`).
    pub fn transition_liquidation(
        &self,
        id: i64,
        from: LiquidationStatus,
        to: LiquidationStatus,
        reviewer: &str,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let conn = self.lock()?;
        transition(&conn, id, from, to, reviewer, note)
    }

    /// Approve a pending request only if collected money still covers it.
    /// Funds are read and the request moved in one transaction, so
    /// concurrent approvals cannot commit more than has been collected.
    pub fn approve_liquidation_within_funds(
        &self,
        id: i64,
        reviewer: &str,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = query_liquidation(&tx, id)?;
        let available = collected(&tx)? - committed(&tx)?;
        if current.amount > available {
            return Err(AppError::new(
                ErrorCode::InsufficientFunds,
                format!(
                    "Requested {} exceeds available funds of {}",
                    format_amount(current.amount),
                    format_amount(available)
                ),
            ));
        }

        let approved = transition(
            &tx,
            id,
            LiquidationStatus::Pending,
            LiquidationStatus::Approved,
            reviewer,
            note,
        )?;
        tx.commit()?;
        Ok(approved)
    }

    // ── Totals ─────────────────────────────────────────────────

    /// Sum of every recorded payment
    pub fn total_collected(&self) -> AppResult<Decimal> {
        collected(&*self.lock()?)
    }

    /// Sum of approved and processed liquidation requests
    pub fn total_committed(&self) -> AppResult<Decimal> {
        committed(&*self.lock()?)
    }

    /// Collected and committed totals read under one lock
    pub fn fund_totals(&self) -> AppResult<(Decimal, Decimal)> {
        let conn = self.lock()?;
        Ok((collected(&conn)?, committed(&conn)?))
    }
}

fn count_reference(conn: &Connection, reference: &str) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE transaction_reference = ?1",
        params![reference],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn transition(
    conn: &Connection,
    id: i64,
    from: LiquidationStatus,
    to: LiquidationStatus,
    reviewer: &str,
    note: Option<&str>,
) -> AppResult<LiquidationRequest> {
    let ts = now();
    let changed = conn.execute(
        "UPDATE liquidation_requests
         SET status = ?3,
             reviewed_by = CASE WHEN ?3 IN ('approved', 'rejected') THEN ?4 ELSE reviewed_by END,
             review_note = COALESCE(?5, review_note),
             reviewed_at = CASE WHEN ?3 IN ('approved', 'rejected') THEN ?6 ELSE reviewed_at END,
             processed_at = CASE WHEN ?3 = 'processed' THEN ?6 ELSE processed_at END
         WHERE id = ?1 AND status = ?2",
        params![id, from.as_str(), to.as_str(), reviewer, note, ts],
    )?;

    let current = query_liquidation(conn, id)?;
    if changed == 0 {
        return Err(AppError::invalid_transition(format!(
            "Liquidation {} is {}, cannot move to {}",
            id, current.status, to
        )));
    }
    Ok(current)
}

/// Amounts are stored as decimal text; sum them exactly in Rust
fn sum_amounts(conn: &Connection, sql: &str) -> AppResult<Decimal> {
    let mut stmt = conn.prepare(sql)?;
    let amounts = stmt
        .query_map([], |row| parsed::<Decimal>(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(amounts.into_iter().sum())
}

fn collected(conn: &Connection) -> AppResult<Decimal> {
    sum_amounts(conn, "SELECT amount FROM payments")
}

fn committed(conn: &Connection) -> AppResult<Decimal> {
    sum_amounts(
        conn,
        "SELECT amount FROM liquidation_requests WHERE status IN ('approved', 'processed')",
    )
}

// ============================================
// Row mapping
// ============================================

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

fn parsed_opt<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
        })
    })
    .transpose()
}

fn map_registrant(row: &Row<'_>) -> rusqlite::Result<Registrant> {
    Ok(Registrant {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        phone: row.get(3)?,
        role: parsed(row, 4)?,
        created_at: parsed::<DateTime<Utc>>(row, 5)?,
    })
}

fn map_registration(row: &Row<'_>) -> rusqlite::Result<Registration> {
    Ok(Registration {
        id: row.get(0)?,
        registrant_id: row.get(1)?,
        category: parsed(row, 2)?,
        attendance: parsed(row, 3)?,
        organization: row.get(4)?,
        job_title: row.get(5)?,
        country: row.get(6)?,
        amount_paid: parsed(row, 7)?,
        balance: parsed(row, 8)?,
        payment_status: parsed(row, 9)?,
        registration_status: parsed(row, 10)?,
        created_at: parsed(row, 11)?,
        updated_at: parsed(row, 12)?,
    })
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<RegistrationRecord> {
    Ok(RegistrationRecord {
        registration: map_registration(row)?,
        email: row.get(13)?,
        full_name: row.get(14)?,
        phone: row.get(15)?,
    })
}

fn map_payment(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        registration_id: row.get(1)?,
        amount: parsed(row, 2)?,
        transaction_reference: row.get(3)?,
        customer_reference: row.get(4)?,
        method: row.get(5)?,
        created_at: parsed(row, 6)?,
    })
}

fn map_liquidation(row: &Row<'_>) -> rusqlite::Result<LiquidationRequest> {
    Ok(LiquidationRequest {
        id: row.get(0)?,
        requester_email: row.get(1)?,
        amount: parsed(row, 2)?,
        payment_method: parsed(row, 3)?,
        account_name: row.get(4)?,
        account_number: row.get(5)?,
        bank_name: row.get(6)?,
        purpose: row.get(7)?,
        status: parsed(row, 8)?,
        reviewed_by: row.get(9)?,
        review_note: row.get(10)?,
        created_at: parsed(row, 11)?,
        reviewed_at: parsed_opt(row, 12)?,
        processed_at: parsed_opt(row, 13)?,
    })
}

fn query_registration(conn: &Connection, id: i64) -> AppResult<Registration> {
    conn.query_row(
        &format!("SELECT {REGISTRATION_COLUMNS} FROM registrations r WHERE r.id = ?1"),
        params![id],
        map_registration,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found(format!("Registration {} not found", id)))
}

fn query_liquidation(conn: &Connection, id: i64) -> AppResult<LiquidationRequest> {
    conn.query_row(
        &format!("SELECT {LIQUIDATION_COLUMNS} FROM liquidation_requests WHERE id = ?1"),
        params![id],
        map_liquidation,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found(format!("Liquidation request {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Store, Registration) {
        let store = Store::in_memory().unwrap();
        let registrant = store.upsert_registrant("jane@rei.ug", Role::Member).unwrap();
        let registration = store
            .insert_registration(&NewRegistration {
                registrant_id: registrant.id,
                category: RegistrationCategory::Member,
                attendance: Attendance::InPerson,
                organization: "UNRA".to_string(),
                job_title: "Engineer".to_string(),
                country: "Uganda".to_string(),
                fee: Decimal::from(150_000),
            })
            .unwrap();
        (store, registration)
    }

    fn payment(registration_id: i64, amount: i64, reference: &str) -> NewPayment {
        NewPayment {
            registration_id,
            amount: Decimal::from(amount),
            transaction_reference: reference.to_string(),
            customer_reference: None,
            method: "mobile_money".to_string(),
        }
    }

    #[test]
    fn test_new_registration_owes_full_fee() {
        let (_, reg) = seeded();
        assert_eq!(reg.amount_paid, Decimal::ZERO);
        assert_eq!(reg.balance, Decimal::from(150_000));
        assert_eq!(reg.payment_status, PaymentStatus::Pending);
        assert_eq!(reg.registration_status, RegistrationStatus::Registered);
    }

    #[test]
    fn test_upsert_registrant_refreshes_role() {
        let store = Store::in_memory().unwrap();
        let first = store.upsert_registrant("a@rei.ug", Role::Member).unwrap();
        let second = store.upsert_registrant("a@rei.ug", Role::Admin).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Admin);
    }

    #[test]
    fn test_settlement_moves_ledger() {
        let (store, reg) = seeded();
        let record = store
            .record_settlement(&payment(reg.id, 50_000, "REF-1"), DuplicatePolicy::Allow)
            .unwrap();

        assert_eq!(record.before.amount_paid, Decimal::ZERO);
        assert_eq!(record.after.amount_paid, Decimal::from(50_000));
        assert_eq!(record.after.balance, Decimal::from(100_000));
        assert_eq!(record.after.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(record.payment.transaction_reference, "REF-1");
        assert_eq!(store.payments_for_registration(reg.id).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_reference_is_stored_twice() {
        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 150_000, "REF-X"), DuplicatePolicy::Allow)
            .unwrap();
        let second = store
            .record_settlement(&payment(reg.id, 150_000, "REF-X"), DuplicatePolicy::Allow)
            .unwrap();

        assert_eq!(second.previous_settlements, 1);
        assert_eq!(store.count_payments_with_reference("REF-X").unwrap(), 2);
        assert_eq!(second.after.balance, Decimal::from(-150_000));
        assert_eq!(store.total_collected().unwrap(), Decimal::from(300_000));
    }

    #[test]
    fn test_settlement_unknown_registration_is_not_found() {
        let (store, _) = seeded();
        let err = store
            .record_settlement(&payment(999, 10, "REF"), DuplicatePolicy::Allow)
            .unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::NotFound);
        assert_eq!(store.count_payments_with_reference("REF").unwrap(), 0);
    }

    #[test]
    fn test_registration_records_filter() {
        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 150_000, "REF-1"), DuplicatePolicy::Allow)
            .unwrap();

        let paid = store.registration_records(Some(PaymentStatus::FullyPaid)).unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].email, "jane@rei.ug");
        assert!(store.registration_records(Some(PaymentStatus::Pending)).unwrap().is_empty());
        assert_eq!(store.registration_records(None).unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_only_unpaid() {
        let (store, reg) = seeded();
        let cancelled = store.cancel_registration(reg.id).unwrap();
        assert_eq!(cancelled.registration_status, RegistrationStatus::Cancelled);
        assert!(store.cancel_registration(reg.id).is_err());

        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 10_000, "REF-1"), DuplicatePolicy::Allow)
            .unwrap();
        let err = store.cancel_registration(reg.id).unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::InvalidTransition);
    }

    #[test]
    fn test_reject_policy_leaves_ledger_untouched() {
        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 50_000, "REF-1"), DuplicatePolicy::Reject)
            .unwrap();
        let err = store
            .record_settlement(&payment(reg.id, 50_000, "REF-1"), DuplicatePolicy::Reject)
            .unwrap_err();

        assert_eq!(err.code, crate::models::ErrorCode::DuplicateSettlement);
        assert_eq!(store.count_payments_with_reference("REF-1").unwrap(), 1);
        assert_eq!(store.registration(reg.id).unwrap().amount_paid, Decimal::from(50_000));
    }

    #[test]
    fn test_concurrent_rejecting_settlements_record_once() {
        let (store, reg) = seeded();
        let store = std::sync::Arc::new(store);

        for round in 0..20 {
            let reference = format!("REF-{}", round);
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let (store, barrier) = (store.clone(), barrier.clone());
                    let new = payment(reg.id, 1_000, &reference);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.record_settlement(&new, DuplicatePolicy::Reject)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {}", round);
            assert_eq!(store.count_payments_with_reference(&reference).unwrap(), 1);
        }
        assert_eq!(store.total_collected().unwrap(), Decimal::from(20_000));
    }

    fn pending_liquidation(store: &Store, amount: i64) -> LiquidationRequest {
        store
            .insert_liquidation(&NewLiquidation {
                requester_email: "org@rei.ug".to_string(),
                amount: Decimal::from(amount),
                payment_method: PayoutMethod::MobileMoney,
                account_name: "Org".to_string(),
                account_number: "256772123456".to_string(),
                bank_name: None,
                purpose: "Venue deposit".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_approval_within_funds() {
        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 50_000, "REF-1"), DuplicatePolicy::Allow)
            .unwrap();
        let small = pending_liquidation(&store, 30_000);
        let large = pending_liquidation(&store, 30_000);

        let approved = store
            .approve_liquidation_within_funds(small.id, "boss@rei.ug", None)
            .unwrap();
        assert_eq!(approved.status, LiquidationStatus::Approved);

        let err = store
            .approve_liquidation_within_funds(large.id, "boss@rei.ug", None)
            .unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::InsufficientFunds);
        assert_eq!(store.liquidation(large.id).unwrap().status, LiquidationStatus::Pending);
        assert_eq!(
            store.fund_totals().unwrap(),
            (Decimal::from(50_000), Decimal::from(30_000))
        );
    }

    #[test]
    fn test_concurrent_approvals_never_overcommit() {
        let (store, reg) = seeded();
        store
            .record_settlement(&payment(reg.id, 50_000, "REF-1"), DuplicatePolicy::Allow)
            .unwrap();
        let store = std::sync::Arc::new(store);
        let ids: Vec<i64> = (0..4).map(|_| pending_liquidation(&store, 40_000).id).collect();

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(ids.len()));
        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let (store, barrier) = (store.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    store.approve_liquidation_within_funds(id, "boss@rei.ug", None)
                })
            })
            .collect();
        let approved = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(approved, 1);
        let (collected, committed) = store.fund_totals().unwrap();
        assert!(committed <= collected, "{} committed of {}", committed, collected);
    }

    #[test]
    fn test_liquidation_conditional_transition() {
        let store = Store::in_memory().unwrap();
        let req = store
            .insert_liquidation(&NewLiquidation {
                requester_email: "org@rei.ug".to_string(),
                amount: Decimal::from(20_000),
                payment_method: PayoutMethod::MobileMoney,
                account_name: "Org".to_string(),
                account_number: "256772123456".to_string(),
                bank_name: None,
                purpose: "Venue deposit".to_string(),
            })
            .unwrap();
        assert_eq!(req.status, LiquidationStatus::Pending);

        let approved = store
            .transition_liquidation(
                req.id,
                LiquidationStatus::Pending,
                LiquidationStatus::Approved,
                "boss@rei.ug",
                None,
            )
            .unwrap();
        assert_eq!(approved.status, LiquidationStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("boss@rei.ug"));
        assert!(approved.reviewed_at.is_some());
        assert_eq!(store.total_committed().unwrap(), Decimal::from(20_000));

        // Stale `from` is rejected
        let err = store
            .transition_liquidation(
                req.id,
                LiquidationStatus::Pending,
                LiquidationStatus::Rejected,
                "boss@rei.ug",
                Some("late"),
            )
            .unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::InvalidTransition);

        let processed = store
            .transition_liquidation(
                req.id,
                LiquidationStatus::Approved,
                LiquidationStatus::Processed,
                "boss@rei.ug",
                None,
            )
            .unwrap();
        assert!(processed.processed_at.is_some());
        assert_eq!(processed.reviewed_by.as_deref(), Some("boss@rei.ug"));
    }
}
