use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::mailer::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub mailer: Mailer,
}

/* -------------------------
   Roles
--------------------------*/

/// Stored as smallint: 0 student, 1 admin, 2 doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum Role {
    Student = 0,
    Admin = 1,
    Doctor = 2,
}

/* -------------------------
   Appointment status
--------------------------*/

/// Stored as smallint: 0 pending, 1 confirmed, 2 completed, 3 cancelled.
/// COMPLETED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
}

impl AppointmentStatus {
    /// Prescription issuance (which flips to COMPLETED) is allowed from
    /// PENDING or CONFIRMED.
    pub fn completable(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Decide whether `current` may move to `requested`, ignoring who asks.
/// Role and ownership checks live in the handlers; this is only the state
/// machine itself.
pub fn status_change_allowed(
    current: AppointmentStatus,
    requested: AppointmentStatus,
) -> Result<(), String> {
    use AppointmentStatus::*;
    match (current, requested) {
        (Pending, Confirmed) => Ok(()),
        (Pending | Confirmed, Cancelled) => Ok(()),
        (Pending | Confirmed, Completed) => Ok(()),
        (Cancelled, Cancelled) => Err("Appointment is already cancelled".into()),
        (Completed, _) => Err("Cannot modify a completed appointment".into()),
        (Cancelled, _) => Err("Cannot modify a cancelled appointment".into()),
        (from, to) => Err(format!("Cannot move appointment from {} to {}", from.as_str(), to.as_str())),
    }
}

/// The single day source for every "today" comparison, validation and SQL
/// alike. Queries bind this value instead of CURRENT_DATE so the database's
/// local timezone never disagrees with the handlers.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/* -------------------------
   Bookable slots
--------------------------*/

/// The fixed half-hour windows the infirmary offers. time_slot columns hold
/// exactly one of these labels.
pub const TIME_SLOTS: [&str; 12] = [
    "9:00 AM - 9:30 AM",
    "9:30 AM - 10:00 AM",
    "10:00 AM - 10:30 AM",
    "10:30 AM - 11:00 AM",
    "11:00 AM - 11:30 AM",
    "11:30 AM - 12:00 PM",
    "2:00 PM - 2:30 PM",
    "2:30 PM - 3:00 PM",
    "3:00 PM - 3:30 PM",
    "3:30 PM - 4:00 PM",
    "4:00 PM - 4:30 PM",
    "4:30 PM - 5:00 PM",
];

pub fn is_valid_time_slot(slot: &str) -> bool {
    TIME_SLOTS.contains(&slot)
}

pub const BLOOD_GROUPS: [&str; 9] =
    ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-", "unknown"];

pub fn is_valid_blood_group(bg: &str) -> bool {
    BLOOD_GROUPS.contains(&bg)
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MedicineRow {
    pub medicine_id: Uuid,
    pub name: String,
    pub category: String,
    pub quantity: i32,
    pub threshold: i32,
    pub dosage: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicineRow {
    /// Low stock is derived, never stored.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.threshold
    }
}

/* -------------------------
   Shared API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/// Minimal person payload embedded in appointment/prescription views.
#[derive(Debug, Serialize, FromRow)]
pub struct PersonBrief {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub student_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn pending_can_confirm_cancel_complete() {
        assert!(status_change_allowed(Pending, Confirmed).is_ok());
        assert!(status_change_allowed(Pending, Cancelled).is_ok());
        assert!(status_change_allowed(Pending, Completed).is_ok());
    }

    #[test]
    fn confirmed_can_cancel_and_complete_but_not_reconfirm() {
        assert!(status_change_allowed(Confirmed, Cancelled).is_ok());
        assert!(status_change_allowed(Confirmed, Completed).is_ok());
        assert!(status_change_allowed(Confirmed, Confirmed).is_err());
        assert!(status_change_allowed(Confirmed, Pending).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for to in [Pending, Confirmed, Completed, Cancelled] {
            assert!(status_change_allowed(Completed, to).is_err());
            assert!(status_change_allowed(Cancelled, to).is_err());
        }
    }

    #[test]
    fn today_tracks_the_utc_calendar() {
        let before = Utc::now().date_naive();
        let t = today();
        let after = Utc::now().date_naive();
        assert!(t == before || t == after);
    }

    #[test]
    fn slot_labels_are_the_fixed_set() {
        assert!(is_valid_time_slot("9:00 AM - 9:30 AM"));
        assert!(is_valid_time_slot("4:30 PM - 5:00 PM"));
        assert!(!is_valid_time_slot("12:00 PM - 12:30 PM"));
        assert!(!is_valid_time_slot("09:00"));
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Cancelled).unwrap(), "\"CANCELLED\"");
        let parsed: AppointmentStatus = serde_json::from_str("\"CONFIRMED\"").unwrap();
        assert_eq!(parsed, Confirmed);
    }

    #[test]
    fn role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Doctor).unwrap(), "\"DOCTOR\"");
        let parsed: Role = serde_json::from_str("\"STUDENT\"").unwrap();
        assert_eq!(parsed, Role::Student);
    }

    #[test]
    fn low_stock_is_quantity_at_or_below_threshold() {
        let mut m = MedicineRow {
            medicine_id: Uuid::new_v4(),
            name: "Paracetamol".into(),
            category: "Analgesic".into(),
            quantity: 20,
            threshold: 20,
            dosage: "500mg".into(),
            price: 5.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(m.is_low_stock());
        m.quantity = 21;
        assert!(!m.is_low_stock());
    }
}
