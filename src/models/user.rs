use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

impl User {
    pub fn new(email: String, name: String) -> Self {
        Self {
            id: None,
            email,
            name,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Per-user notification settings. A user without a row gets no email at all
/// and falls back to the configured alert thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPreference {
    pub user_id: i64,
    pub email_alerts: bool,
    pub weekly_digest: bool,
    pub warning_pct: Decimal,
    pub critical_pct: Decimal,
}

impl NotificationPreference {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            email_alerts: true,
            weekly_digest: true,
            warning_pct: Decimal::from(75),
            critical_pct: Decimal::from(90),
        }
    }
}
