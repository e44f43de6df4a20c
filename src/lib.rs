//! Lead Automations Library
//!
//! Webhook-driven glue between inbound email, a team chat channel, a
//! scheduling platform, a template marketplace, a structured records store,
//! a CRM and a transactional email sender.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker for upstream APIs.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: Shared state and informational endpoints.
//! - `integrations`: Clients for the records store, chat, email, CRM and Gmail.
//! - `models`: Lead, company and contact models.
//! - `monitoring`: Error reporting sink.
//! - `parsing`: Lead email parsing.
//! - `retry`: Bounded exponential backoff.
//! - `routes`: Router and automation registry.
//! - `signature`: Webhook signature verification.
//! - `webhook_handler`: Webhook endpoints.
//! - `webhook_models`: Webhook payload models.
//! - `workflows`: Intake, decision, booking and marketplace workflows.

pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod integrations;
pub mod models;
pub mod monitoring;
pub mod parsing;
pub mod retry;
pub mod routes;
pub mod signature;
pub mod webhook_handler;
pub mod webhook_models;
pub mod workflows;
