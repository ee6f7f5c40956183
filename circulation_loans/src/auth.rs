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

#[cfg(test)]
mod auth_tests {
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn missing_or_blank_header_is_unauthorized() {
        let request = TestRequest::default().to_http_request();
        let response = session_user(&request).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = TestRequest::default()
            .insert_header((USER_EMAIL_HEADER, "  "))
            .to_http_request();
        let response = session_user(&request).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn header_value_is_trimmed() {
        let request = TestRequest::default()
            .insert_header((USER_EMAIL_HEADER, " alice@example.com "))
            .to_http_request();
        assert_eq!(session_user(&request).unwrap(), "alice@example.com");
    }

    #[test]
    fn non_admins_are_forbidden() {
        let admins = AdminList::from_comma_separated("root@example.com, chief@example.com");
        let request = TestRequest::default()
            .insert_header((USER_EMAIL_HEADER, "alice@example.com"))
            .to_http_request();
        let response = require_admin(&request, &admins).unwrap_err();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = TestRequest::default()
            .insert_header((USER_EMAIL_HEADER, "Root@Example.com"))
            .to_http_request();
        assert_eq!(
            require_admin(&request, &admins).unwrap(),
            "Root@Example.com"
        );
    }
}
