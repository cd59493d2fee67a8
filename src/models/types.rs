//! Domain types: registrants, registrations, payments, liquidation requests
//!
//! Enum values are stored in SQLite as the same snake_case strings they
//! serialize to in JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::constants::{
    FEE_INTERNATIONAL_UGX, FEE_MEMBER_UGX, FEE_NON_MEMBER_UGX, FEE_STUDENT_UGX,
};

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// wire form is a fixed lowercase string.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub const ALL: &'static [$name] = &[$(Self::$variant),+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

// ============================================
// Enums
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Organizer,
    Admin,
}

string_enum!(Role {
    Member => "member",
    Organizer => "organizer",
    Admin => "admin",
});

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Organizers and admins may request liquidations
    pub fn can_request_liquidation(&self) -> bool {
        matches!(self, Self::Organizer | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PartiallyPaid,
    FullyPaid,
}

string_enum!(PaymentStatus {
    Pending => "pending",
    PartiallyPaid => "partially_paid",
    FullyPaid => "fully_paid",
});

impl PaymentStatus {
    /// Derive status from cumulative paid amount against the total owed
    /// (`amount_paid + balance`).
    pub fn compute(amount_paid: Decimal, balance: Decimal) -> Self {
        let total = amount_paid + balance;
        if total > Decimal::ZERO && amount_paid >= total {
            Self::FullyPaid
        } else if amount_paid > Decimal::ZERO {
            Self::PartiallyPaid
        } else {
            Self::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    Cancelled,
}

string_enum!(RegistrationStatus {
    Registered => "registered",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationCategory {
    Member,
    NonMember,
    Student,
    International,
}

string_enum!(RegistrationCategory {
    Member => "member",
    NonMember => "non_member",
    Student => "student",
    International => "international",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attendance {
    InPerson,
    Virtual,
}

string_enum!(Attendance {
    InPerson => "in_person",
    Virtual => "virtual",
});

impl RegistrationCategory {
    /// Conference fee in UGX for this category and attendance mode.
    /// Virtual attendance is billed at half the in-person fee.
    pub fn fee(&self, attendance: Attendance) -> Decimal {
        let in_person = match self {
            Self::Member => FEE_MEMBER_UGX,
            Self::NonMember => FEE_NON_MEMBER_UGX,
            Self::Student => FEE_STUDENT_UGX,
            Self::International => FEE_INTERNATIONAL_UGX,
        };
        match attendance {
            Attendance::InPerson => Decimal::from(in_person),
            Attendance::Virtual => Decimal::from(in_person / 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
}

string_enum!(LiquidationStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Processed => "processed",
});

impl LiquidationStatus {
    /// pending → approved | rejected, approved → processed. Nothing else.
    pub fn can_transition_to(&self, next: LiquidationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Processed)
        )
    }

    /// Approved and processed requests count against available funds
    pub fn commits_funds(&self) -> bool {
        matches!(self, Self::Approved | Self::Processed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    MobileMoney,
    BankTransfer,
}

string_enum!(PayoutMethod {
    MobileMoney => "mobile_money",
    BankTransfer => "bank_transfer",
});

// ============================================
// Records
// ============================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registrant {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: i64,
    pub registrant_id: i64,
    pub category: RegistrationCategory,
    pub attendance: Attendance,
    pub organization: String,
    pub job_title: String,
    pub country: String,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub payment_status: PaymentStatus,
    pub registration_status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Fee owed when the registration was created
    pub fn total_fee(&self) -> Decimal {
        self.amount_paid + self.balance
    }
}

/// Registration joined with its registrant's identity (admin views, exports)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    #[serde(flatten)]
    pub registration: Registration,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub registration_id: i64,
    pub amount: Decimal,
    pub transaction_reference: String,
    pub customer_reference: Option<String>,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationRequest {
    pub id: i64,
    pub requester_email: String,
    pub amount: Decimal,
    pub payment_method: PayoutMethod,
    pub account_name: String,
    pub account_number: String,
    pub bank_name: Option<String>,
    pub purpose: String,
    pub status: LiquidationStatus,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}
