mod health_check;
mod helpers;
mod inbound_webhook;
