//! Multi-step lead workflows. Each one takes the shared [`AppState`] and
//! fans out to the configured integrations.
//!
//! [`AppState`]: crate::handlers::AppState

pub mod booking;
pub mod decision;
pub mod intake;
pub mod marketplace;

pub use booking::{handle_booking_event, BookingOutcome};
pub use decision::{decide_lead, DecisionOutcome};
pub use intake::{process_inbound_email, sync_mailbox, InboundEmail, IntakeOutcome};
pub use marketplace::{handle_purchase, MarketplaceOutcome, Purchase};
