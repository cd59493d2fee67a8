//! Email templates
//!
//! Every message has a plain-text and an HTML body built from the same
//! fields. User-supplied values are HTML-escaped in the HTML body.

use rust_decimal::Decimal;

use crate::models::{LiquidationRequest, LiquidationStatus, Payment, RegistrationRecord};
use crate::providers::Email;
use crate::utils::constants::{APP_NAME, CURRENCY};

/// `UGX 1,250,000` (fractional part kept only when non-zero)
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2).normalize();
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = rounded.abs().to_string();
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!(
        "{} {}{}{}",
        CURRENCY,
        if negative { "-" } else { "" },
        grouped,
        frac.map(|f| format!(".{}", f)).unwrap_or_default()
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn greeting(name: Option<&str>) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => format!("Dear {},", n.trim()),
        _ => "Hello,".to_string(),
    }
}

/// Wrap paragraphs in a minimal HTML shell
fn html_body(paragraphs: &[String]) -> String {
    let inner: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect();
    format!(
        "<!doctype html><html><body style=\"font-family:Arial,sans-serif\">{}\
         <p style=\"color:#777\">{}</p></body></html>",
        inner, APP_NAME
    )
}

fn build(to: &str, subject: String, paragraphs: Vec<String>) -> Email {
    Email {
        to: to.to_string(),
        subject,
        text: format!("{}\n\n-- \n{}\n", paragraphs.join("\n\n"), APP_NAME),
        html: html_body(&paragraphs),
    }
}

pub fn otp_email(to: &str, code: &str, ttl_minutes: u64) -> Email {
    build(
        to,
        format!("Your {} login code", APP_NAME),
        vec![
            "Hello,".to_string(),
            format!("Your one-time login code is {}.", code),
            format!(
                "It expires in {} minutes. If you did not ask for it you can ignore this email.",
                ttl_minutes
            ),
        ],
    )
}

pub fn registration_email(record: &RegistrationRecord) -> Email {
    let reg = &record.registration;
    build(
        &record.email,
        format!("{}: registration #{} received", APP_NAME, reg.id),
        vec![
            greeting(record.full_name.as_deref()),
            format!(
                "Thank you for registering for {} as {} ({} attendance).",
                APP_NAME,
                reg.category.as_str().replace('_', " "),
                reg.attendance.as_str().replace('_', " ")
            ),
            format!(
                "Your registration fee is {}. You can pay by mobile money from your dashboard.",
                format_amount(reg.total_fee())
            ),
        ],
    )
}

pub fn payment_email(record: &RegistrationRecord, payment: &Payment) -> Email {
    let reg = &record.registration;
    build(
        &record.email,
        format!("{}: payment of {} received", APP_NAME, format_amount(payment.amount)),
        vec![
            greeting(record.full_name.as_deref()),
            format!(
                "We have received your payment of {} (reference {}) for registration #{}.",
                format_amount(payment.amount),
                payment.transaction_reference,
                reg.id
            ),
            format!(
                "Total paid: {}. Outstanding balance: {}. Payment status: {}.",
                format_amount(reg.amount_paid),
                format_amount(reg.balance),
                reg.payment_status.as_str().replace('_', " ")
            ),
        ],
    )
}

pub fn liquidation_email(request: &LiquidationRequest) -> Email {
    let mut paragraphs = vec![
        "Hello,".to_string(),
        format!(
            "Your liquidation request #{} for {} ({}) is now {}.",
            request.id,
            format_amount(request.amount),
            request.purpose,
            request.status
        ),
    ];
    match request.status {
        LiquidationStatus::Approved => paragraphs
            .push("Funds will be disbursed to the account you provided shortly.".to_string()),
        LiquidationStatus::Processed => paragraphs.push(format!(
            "Funds have been sent to {} ({}).",
            request.account_name, request.account_number
        )),
        _ => {}
    }
    if let Some(note) = &request.review_note {
        paragraphs.push(format!("Reviewer note: {}", note));
    }

    build(
        &request.requester_email,
        format!(
            "{}: liquidation request #{} {}",
            APP_NAME, request.id, request.status
        ),
        paragraphs,
    )
}
