//! Admin Reporting
//!
//! Dashboard totals plus CSV and PDF exports of the registration list.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::core::notifications::format_amount;
use crate::models::{AppError, AppResult, PaymentStatus, RegistrationRecord, RegistrationStatus};
use crate::store::Store;
use crate::utils::constants::APP_NAME;
use crate::utils::pdf::{render_text_pdf, MAX_LINE_CHARS};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub total_registrations: usize,
    pub cancelled: usize,
    pub pending: usize,
    pub partially_paid: usize,
    pub fully_paid: usize,
    pub payments: usize,
    pub total_collected: Decimal,
    /// Sum of balances of non-cancelled registrations
    pub outstanding: Decimal,
    /// Approved and processed liquidations
    pub committed: Decimal,
    pub available: Decimal,
    pub generated_at: DateTime<Utc>,
}

pub fn summarize(store: &Store) -> AppResult<AdminSummary> {
    let records = store.registration_records(None)?;
    let payments = store.payments()?;
    let total_collected: Decimal = payments.iter().map(|p| p.amount).sum();
    let committed = store.total_committed()?;

    let active = || {
        records
            .iter()
            .map(|r| &r.registration)
            .filter(|r| r.registration_status == RegistrationStatus::Registered)
    };
    let count = |status: PaymentStatus| active().filter(|r| r.payment_status == status).count();

    Ok(AdminSummary {
        total_registrations: records.len(),
        cancelled: records.len() - active().count(),
        pending: count(PaymentStatus::Pending),
        partially_paid: count(PaymentStatus::PartiallyPaid),
        fully_paid: count(PaymentStatus::FullyPaid),
        payments: payments.len(),
        total_collected,
        outstanding: active().map(|r| r.balance).sum(),
        committed,
        available: total_collected - committed,
        generated_at: Utc::now(),
    })
}

// ============================================
// CSV
// ============================================

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Registration ID")]
    id: i64,
    #[serde(rename = "Full Name")]
    full_name: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Organization")]
    organization: &'a str,
    #[serde(rename = "Job Title")]
    job_title: &'a str,
    #[serde(rename = "Country")]
    country: &'a str,
    #[serde(rename = "Category")]
    category: &'a str,
    #[serde(rename = "Attendance")]
    attendance: &'a str,
    #[serde(rename = "Amount Paid")]
    amount_paid: String,
    #[serde(rename = "Balance")]
    balance: String,
    #[serde(rename = "Payment Status")]
    payment_status: &'a str,
    #[serde(rename = "Registration Status")]
    registration_status: &'a str,
    #[serde(rename = "Registered At")]
    created_at: String,
}

pub fn registrations_csv(records: &[RegistrationRecord]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        let reg = &record.registration;
        writer.serialize(CsvRow {
            id: reg.id,
            full_name: record.full_name.as_deref().unwrap_or(""),
            email: &record.email,
            phone: record.phone.as_deref().unwrap_or(""),
            organization: &reg.organization,
            job_title: &reg.job_title,
            country: &reg.country,
            category: reg.category.as_str(),
            attendance: reg.attendance.as_str(),
            amount_paid: reg.amount_paid.normalize().to_string(),
            balance: reg.balance.normalize().to_string(),
            payment_status: reg.payment_status.as_str(),
            registration_status: reg.registration_status.as_str(),
            created_at: reg.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })?;
    }
    // serialize() only writes headers with the first row
    if records.is_empty() {
        writer.write_record([
            "Registration ID",
            "Full Name",
            "Email",
            "Phone",
            "Organization",
            "Job Title",
            "Country",
            "Category",
            "Attendance",
            "Amount Paid",
            "Balance",
            "Payment Status",
            "Registration Status",
            "Registered At",
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::from(e.into_error()))
}

// ============================================
// PDF
// ============================================

/// Cut to `width` chars and pad, so columns line up in a monospace font
fn cell(value: &str, width: usize) -> String {
    let clipped: String = value.chars().take(width).collect();
    format!("{:<width$}", clipped, width = width)
}

fn table_line(cols: &[(&str, usize)]) -> String {
    let line = cols
        .iter()
        .map(|(v, w)| cell(v, *w))
        .collect::<Vec<_>>()
        .join(" ");
    line.trim_end().chars().take(MAX_LINE_CHARS).collect()
}

const COLUMNS: [(&str, usize); 10] = [
    ("ID", 5),
    ("Name", 24),
    ("Email", 30),
    ("Phone", 13),
    ("Category", 14),
    ("Attend.", 10),
    ("Paid", 12),
    ("Balance", 12),
    ("Payment", 15),
    ("Status", 10),
];

/// Body lines of the registrations report (without the title)
pub fn registration_report_lines(
    records: &[RegistrationRecord],
    generated_at: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = vec![
        format!("Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC")),
        String::new(),
        table_line(&COLUMNS),
        "-".repeat(COLUMNS.iter().map(|(_, w)| w + 1).sum::<usize>() - 1),
    ];

    for record in records {
        let reg = &record.registration;
        let id = reg.id.to_string();
        let paid = reg.amount_paid.normalize().to_string();
        let balance = reg.balance.normalize().to_string();
        let values = [
            id.as_str(),
            record.full_name.as_deref().unwrap_or("-"),
            record.email.as_str(),
            record.phone.as_deref().unwrap_or("-"),
            reg.category.as_str(),
            reg.attendance.as_str(),
            paid.as_str(),
            balance.as_str(),
            reg.payment_status.as_str(),
            reg.registration_status.as_str(),
        ];
        let cols: Vec<(&str, usize)> = values
            .iter()
            .zip(COLUMNS.iter())
            .map(|(v, (_, w))| (*v, *w))
            .collect();
        lines.push(table_line(&cols));
    }

    let paid: Decimal = records.iter().map(|r| r.registration.amount_paid).sum();
    lines.push(String::new());
    lines.push(format!(
        "{} registrations, {} collected",
        records.len(),
        format_amount(paid)
    ));
    lines
}

pub fn registrations_pdf(records: &[RegistrationRecord], generated_at: DateTime<Utc>) -> Vec<u8> {
    let title = format!("{} - Registrations", APP_NAME);
    render_text_pdf(&title, &registration_report_lines(records, generated_at))
}

// ============================================
// Offline export
// ============================================

/// Files written by `export_to_dir`
#[derive(Debug, Clone)]
pub struct ExportFiles {
    pub csv: PathBuf,
    pub pdf: PathBuf,
    pub rows: usize,
}

/// Write the CSV and PDF registration reports into `dir`, creating it if
/// needed. File names carry the generation minute.
pub fn export_to_dir(
    store: &Store,
    dir: &Path,
    status: Option<PaymentStatus>,
    generated_at: DateTime<Utc>,
) -> AppResult<ExportFiles> {
    let records = store.registration_records(status)?;
    std::fs::create_dir_all(dir)?;

    let stamp = generated_at.format("%Y%m%d-%H%M");
    let csv = dir.join(format!("rei25-registrations-{}.csv", stamp));
    let pdf = dir.join(format!("rei25-registrations-{}.pdf", stamp));

    std::fs::write(&csv, registrations_csv(&records)?)?;
    std::fs::write(&pdf, registrations_pdf(&records, generated_at))?;

    Ok(ExportFiles {
        csv,
        pdf,
        rows: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attendance, RegistrationCategory, Role};
    use crate::store::{DuplicatePolicy, NewPayment, NewRegistration};
    use rust_decimal_macros::dec;

    fn seeded() -> Store {
        let store = Store::in_memory().unwrap();
        for (email, category, paid) in [
            ("a@rei.ug", RegistrationCategory::Member, dec!(150000)),
            ("b@rei.ug", RegistrationCategory::Student, dec!(20000)),
            ("c@rei.ug", RegistrationCategory::NonMember, dec!(0)),
        ] {
            let registrant = store.upsert_registrant(email, Role::Member).unwrap();
            store.update_profile(registrant.id, Some("Okello, \"Jr\""), None).unwrap();
            let reg = store
                .insert_registration(&NewRegistration {
                    registrant_id: registrant.id,
                    category,
                    attendance: Attendance::InPerson,
                    organization: "MoWT".to_string(),
                    job_title: "Engineer".to_string(),
                    country: "Uganda".to_string(),
                    fee: category.fee(Attendance::InPerson),
                })
                .unwrap();
            if paid > Decimal::ZERO {
                store
                    .record_settlement(
                        &NewPayment {
                            registration_id: reg.id,
                            amount: paid,
                            transaction_reference: format!("REF-{}", reg.id),
                            customer_reference: None,
                            method: "mobile_money".to_string(),
                        },
                        DuplicatePolicy::Allow,
                    )
                    .unwrap();
            }
        }
        store
    }

    #[test]
    fn test_summary_totals() {
        let store = seeded();
        let extra = store.upsert_registrant("d@rei.ug", Role::Member).unwrap();
        let cancelled = store
            .insert_registration(&NewRegistration {
                registrant_id: extra.id,
                category: RegistrationCategory::Member,
                attendance: Attendance::Virtual,
                organization: "x".to_string(),
                job_title: "x".to_string(),
                country: "x".to_string(),
                fee: dec!(75000),
            })
            .unwrap();
        store.cancel_registration(cancelled.id).unwrap();

        let summary = summarize(&store).unwrap();
        assert_eq!(summary.total_registrations, 4);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.fully_paid, 1);
        assert_eq!(summary.partially_paid, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total_collected, dec!(170000));
        // 0 + 30000 + 250000; the cancelled one is excluded
        assert_eq!(summary.outstanding, dec!(280000));
        assert_eq!(summary.available, dec!(170000));
    }

    #[test]
    fn test_csv_has_header_and_quotes() {
        let store = seeded();
        let csv = registrations_csv(&store.registration_records(None).unwrap()).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("Registration ID,Full Name,Email"));
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains("\"Okello, \"\"Jr\"\"\""));
        assert!(text.contains("fully_paid"));
    }

    #[test]
    fn test_csv_empty_still_has_header() {
        let csv = registrations_csv(&[]).unwrap();
        let text = String::from_utf8(csv).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Registration ID"));
    }

    #[test]
    fn test_report_lines_fit_page() {
        let store = seeded();
        let records = store.registration_records(None).unwrap();
        let lines = registration_report_lines(&records, Utc::now());

        assert!(lines.iter().all(|l| l.chars().count() <= MAX_LINE_CHARS));
        assert!(lines.last().unwrap().starts_with("3 registrations, UGX 170,000"));

        let pdf = registrations_pdf(&records, Utc::now());
        assert!(pdf.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn test_export_to_dir_writes_both_reports() {
        let store = seeded();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("exports");
        let now = Utc::now();

        let files = export_to_dir(&store, &out, Some(PaymentStatus::FullyPaid), now).unwrap();
        let all = store.registration_records(Some(PaymentStatus::FullyPaid)).unwrap();
        assert_eq!(files.rows, all.len());
        assert!(files.rows > 0);

        let csv = std::fs::read_to_string(&files.csv).unwrap();
        assert!(csv.starts_with("Registration ID,"));
        assert_eq!(csv.lines().count(), files.rows + 1);

        let pdf = std::fs::read(&files.pdf).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
        assert!(files.pdf.file_name().unwrap().to_string_lossy().ends_with(".pdf"));
    }
}
