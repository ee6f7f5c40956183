use std::collections::HashSet;

use actix_web::{HttpRequest, HttpResponse};

pub use crate::api::USER_EMAIL_HEADER;

/// Admin allow-list, read once at startup from ADMIN_EMAILS.
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    emails: HashSet<String>,
}

impl AdminList {
    pub fn from_comma_separated(raw: &str) -> Self {
        Self {
            emails: raw
                .split(',')
                .map(|email| email.trim().to_ascii_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&email.to_ascii_lowercase())
    }
}

pub fn session_user(req: &HttpRequest) -> Result<String, HttpResponse> {
    req.headers()
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HttpResponse::Unauthorized().finish())
}

pub fn require_admin(req: &HttpRequest, admins: &AdminList) -> Result<String, HttpResponse> {
    let email = session_user(req)?;
    if admins.contains(&email) {
        Ok(email)
    } else {
        Err(HttpResponse::Forbidden().finish())
    }
}
