//! Registration Form
//!
//! Validates the conference registration form, prices it and creates the
//! registration with its full fee outstanding.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::notifications;
use crate::models::{AppError, AppResult, Attendance, Registrant, Registration, RegistrationCategory};
use crate::providers::Mailer;
use crate::store::{NewRegistration, Store};
use crate::utils::constants::normalize_phone;

/// Registration form as submitted by the browser
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub country: Option<String>,
    pub category: Option<String>,
    pub attendance: Option<String>,
}

/// Form after validation; phone in international form
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub full_name: String,
    pub phone: String,
    pub organization: String,
    pub job_title: String,
    pub country: String,
    pub category: RegistrationCategory,
    pub attendance: Attendance,
}

/// `PUT /api/me` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

fn required(value: &Option<String>, field: &str) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!("{} is required", field))),
    }
}

fn valid_phone(raw: &str) -> AppResult<String> {
    normalize_phone(raw).ok_or_else(|| {
        AppError::validation(format!("phone '{}' is not a valid East African mobile number", raw))
    })
}

fn parse_choice<T: std::str::FromStr>(raw: &str, field: &str, allowed: &[&str]) -> AppResult<T> {
    raw.parse::<T>().map_err(|_| {
        AppError::validation(format!("{} must be one of: {}", field, allowed.join(", ")))
    })
}

impl RegistrationForm {
    pub fn validate(&self) -> AppResult<ValidRegistration> {
        let full_name = required(&self.full_name, "fullName")?;
        let phone = valid_phone(&required(&self.phone, "phone")?)?;
        let organization = required(&self.organization, "organization")?;
        let job_title = required(&self.job_title, "jobTitle")?;
        let country = required(&self.country, "country")?;

        let categories: Vec<&str> = RegistrationCategory::ALL.iter().map(|c| c.as_str()).collect();
        let category = parse_choice(&required(&self.category, "category")?, "category", &categories)?;

        let modes: Vec<&str> = Attendance::ALL.iter().map(|a| a.as_str()).collect();
        let attendance =
            parse_choice(&required(&self.attendance, "attendance")?, "attendance", &modes)?;

        Ok(ValidRegistration {
            full_name,
            phone,
            organization,
            job_title,
            country,
            category,
            attendance,
        })
    }
}

impl ProfileUpdate {
    /// Blank fields are left unchanged; a given phone must normalise
    pub fn validate(&self) -> AppResult<(Option<String>, Option<String>)> {
        let full_name = self
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let phone = match self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(valid_phone(p)?),
            None => None,
        };
        if full_name.is_none() && phone.is_none() {
            return Err(AppError::validation("Nothing to update: send fullName and/or phone"));
        }
        Ok((full_name, phone))
    }
}

pub struct RegistrationService {
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
}

impl RegistrationService {
    pub fn new(store: Arc<Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Validate, price and store a registration, then send the
    /// acknowledgement email. The registrant's name and phone follow the
    /// latest form.
    pub async fn register(
        &self,
        registrant_id: i64,
        form: &RegistrationForm,
    ) -> AppResult<Registration> {
        let valid = form.validate()?;
        let fee = valid.category.fee(valid.attendance);

        self.store
            .update_profile(registrant_id, Some(&valid.full_name), Some(&valid.phone))?;
        let registration = self.store.insert_registration(&NewRegistration {
            registrant_id,
            category: valid.category,
            attendance: valid.attendance,
            organization: valid.organization,
            job_title: valid.job_title,
            country: valid.country,
            fee,
        })?;

        info!(
            registration_id = registration.id,
            registrant_id,
            category = %registration.category,
            attendance = %registration.attendance,
            fee = %fee,
            "📝 Registration created"
        );

        let record = self.store.registration_record(registration.id)?;
        if let Err(e) = self.mailer.send(notifications::registration_email(&record)).await {
            warn!(registration_id = registration.id, "📧 Registration email failed: {}", e);
        }

        Ok(registration)
    }

    pub fn update_profile(&self, registrant_id: i64, update: &ProfileUpdate) -> AppResult<Registrant> {
        let (full_name, phone) = update.validate()?;
        self.store
            .update_profile(registrant_id, full_name.as_deref(), phone.as_deref())
    }
}
