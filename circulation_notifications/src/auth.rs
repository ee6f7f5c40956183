use actix_web::{HttpRequest, HttpResponse};

pub use crate::api::USER_EMAIL_HEADER;

/// Header checked by the sweep endpoint in addition to a bearer token.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

pub fn session_user(req: &HttpRequest) -> Result<String, HttpResponse> {
    req.headers()
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HttpResponse::Unauthorized().finish())
}

/// Shared secret gating the sweep trigger. An unset secret leaves the
/// endpoint open, which is how single-tenant deployments run it behind a
/// private scheduler.
#[derive(Debug, Clone, Default)]
pub struct CronSecret {
    secret: Option<String>,
}

impl CronSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|value| !value.is_empty()),
        }
    }

    pub fn authorizes(&self, req: &HttpRequest) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true;
        };

        let header_secret = req
            .headers()
            .get(CRON_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if header_secret == Some(secret) {
            return true;
        }

        req.headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token == secret)
    }
}

#[cfg(test)]
mod auth_tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn unset_secret_authorizes_everyone() {
        let secret = CronSecret::new(None);
        assert!(secret.authorizes(&TestRequest::default().to_http_request()));
        let secret = CronSecret::new(Some(String::new()));
        assert!(secret.authorizes(&TestRequest::default().to_http_request()));
    }

    #[test]
    fn secret_accepts_header_or_bearer() {
        let secret = CronSecret::new(Some("tok".to_string()));

        assert!(!secret.authorizes(&TestRequest::default().to_http_request()));
        assert!(secret.authorizes(
            &TestRequest::default()
                .insert_header((CRON_SECRET_HEADER, "tok"))
                .to_http_request()
        ));
        assert!(secret.authorizes(
            &TestRequest::default()
                .insert_header(("authorization", "Bearer tok"))
                .to_http_request()
        ));
        assert!(!secret.authorizes(
            &TestRequest::default()
                .insert_header(("authorization", "Bearer wrong"))
                .to_http_request()
        ));
        assert!(!secret.authorizes(
            &TestRequest::default()
                .insert_header(("authorization", "tok"))
                .to_http_request()
        ));
    }
}
