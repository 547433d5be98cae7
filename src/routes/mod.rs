mod health_check;
mod inbound_webhook;
mod send_weekly;
mod signup;

pub use health_check::*;
pub use inbound_webhook::*;
pub use send_weekly::*;
pub use signup::*;

use actix_web::http::header;
use actix_web::HttpResponse;

/// Fallback for a matched resource hit with the wrong HTTP verb.
pub fn method_not_allowed(allow: &str) -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .insert_header((header::ALLOW, allow))
        .json(serde_json::json!({ "error": "Method not allowed" }))
}
