//! Constants Module - Single Source of Truth
//!
//! Fees, defaults and phone-number rules used across the application.
//! Runtime-tunable values get their defaults from here and are overridden
//! through environment variables in `models::config`.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "REI 25 Portal";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = "REI25-Portal/0.1";

/// Currency all amounts are denominated in
pub const CURRENCY: &str = "UGX";

// ============================================
// REGISTRATION FEES (UGX, in-person)
// ============================================

pub const FEE_MEMBER_UGX: i64 = 150_000;
pub const FEE_NON_MEMBER_UGX: i64 = 250_000;
pub const FEE_STUDENT_UGX: i64 = 50_000;
pub const FEE_INTERNATIONAL_UGX: i64 = 400_000;

// ============================================
// GATEWAY / POLLING
// ============================================

/// Default timeout for gateway requests (seconds)
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Default interval between status checks (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Payment method recorded for gateway settlements
pub const METHOD_MOBILE_MONEY: &str = "mobile_money";

// ============================================
// AUTH
// ============================================

/// OTP length in digits
pub const OTP_LENGTH: usize = 6;

/// Default OTP lifetime (seconds)
pub const DEFAULT_OTP_TTL_SECS: u64 = 600;

/// Wrong guesses allowed before an OTP is revoked
pub const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 5;

/// Default session lifetime (seconds)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// OTP requests allowed per email per window
pub const DEFAULT_OTP_RATE_LIMIT: u32 = 5;

/// OTP rate-limit window (seconds)
pub const OTP_RATE_WINDOW_SECS: u64 = 900;

/// Interval of the background sweep over expiring in-memory entries
pub const CLEANUP_INTERVAL_SECS: u64 = 60;

/// How long a finished payment stays visible on the track endpoint
pub const TRACKER_RETENTION_SECS: u64 = 3600;

// ============================================
// PHONE NUMBERS
// ============================================

/// East-African country calling codes accepted for mobile money
pub const EAST_AFRICA_DIAL_CODES: [&str; 6] = ["256", "254", "255", "250", "257", "211"];

/// Dial code assumed for local numbers written as 0XXXXXXXXX
pub const DEFAULT_DIAL_CODE: &str = "256";

/// Subscriber digits after the dial code
pub const SUBSCRIBER_DIGITS: usize = 9;

/// Normalise an East-African mobile number to international digits
/// (`2567XXXXXXXX`). Accepts `+256…`, `256…`, `0…` and tolerates spaces and
/// dashes. Returns `None` when the number does not fit.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    if let Some(local) = digits.strip_prefix('0') {
        if local.len() == SUBSCRIBER_DIGITS && !local.starts_with('0') {
            return Some(format!("{}{}", DEFAULT_DIAL_CODE, local));
        }
        return None;
    }

    EAST_AFRICA_DIAL_CODES
        .iter()
        .find(|code| digits.starts_with(*code))
        .filter(|code| digits.len() == code.len() + SUBSCRIBER_DIGITS)
        .map(|_| digits)
}

/// Basic `local@domain.tld` shape check on an already-trimmed email
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}
