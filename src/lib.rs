//! Autofill engine for web forms: classifies the fields a page script
//! reports, tracks what the user types, offers stored logins and cards, and
//! decides when to ask about saving.

pub mod builder;
pub mod classifier;
pub mod cli;
pub mod error;
pub mod frames;
pub mod protocol;
pub mod report;
pub mod scenario;
pub mod session;
pub mod store;
pub mod trace;

/// Log target for verbose session internals.
pub const LOG_INTERNAL: &str = "form_autofill::internal";

/// Log target for user-relevant store and fill events.
pub const LOG_PASSWORDS: &str = "form_autofill::passwords";
