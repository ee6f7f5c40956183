use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpRequest, HttpResponse};
use chrono::Utc;
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{OkResponse, SubscribeRequest, SweepResponse, UnsubscribeRequest};
use crate::auth::{self, CronSecret};
use crate::push_gateway::PushTransport;
use crate::subscriptions_repository::SubscriptionsRepository;
use crate::sweep::{self, DueLoanSource};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn subscribe(
    req: HttpRequest,
    subscriptions_repository: Data<Arc<dyn SubscriptionsRepository>>,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    if body.endpoint.is_empty() || body.keys.p256dh.is_empty() || body.keys.auth.is_empty() {
        return Ok(HttpResponse::BadRequest().body("Invalid subscription"));
    }

    Ok(match subscriptions_repository
        .upsert_subscription(&user_email, &body.endpoint, &body.keys.p256dh, &body.keys.auth)
        .await
    {
        Ok(_) => HttpResponse::Ok().json(OkResponse { ok: true }),
        Err(err) => {
            tracing::error!("Subscribe failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn unsubscribe(
    req: HttpRequest,
    subscriptions_repository: Data<Arc<dyn SubscriptionsRepository>>,
    body: web::Json<UnsubscribeRequest>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    if body.endpoint.is_empty() {
        return Ok(HttpResponse::BadRequest().body("Invalid endpoint"));
    }

    Ok(match subscriptions_repository
        .delete_subscription(&user_email, &body.endpoint)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(OkResponse { ok: true }),
        Err(err) => {
            tracing::error!("Unsubscribe failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn run_sweep(
    req: HttpRequest,
    cron_secret: Data<CronSecret>,
    due_loans: Data<Arc<dyn DueLoanSource>>,
    subscriptions_repository: Data<Arc<dyn SubscriptionsRepository>>,
    transport: Data<Arc<dyn PushTransport>>,
) -> Result<HttpResponse, Error> {
    if !cron_secret.authorizes(&req) {
        return Ok(HttpResponse::Unauthorized().finish());
    }

    Ok(match sweep::run_sweep(
        Utc::now(),
        due_loans.get_ref().as_ref(),
        subscriptions_repository.get_ref().as_ref(),
        transport.get_ref().as_ref(),
    )
    .await
    {
        Ok(summary) => HttpResponse::Ok().json(SweepResponse::from_summary(summary)),
        Err(err) => {
            tracing::error!("Notification sweep failed {:#}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}
