//! Booking orchestration: ties the session lifecycle, the credit
//! ledger, meeting-link provisioning and notifications together behind
//! one service.

pub mod config;
pub mod meet;
pub mod notify;
pub mod service;

pub use config::BookingConfig;
pub use meet::{HttpMeetProvisioner, MeetingProvisioner, ProvisionError};
pub use notify::{Notifier, NotifyError, TracingNotifier};
pub use service::{BookingService, DisputeOutcome, RequestSessionInput};
