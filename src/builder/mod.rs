pub mod credentials;
pub mod credit_card;
pub mod host;
