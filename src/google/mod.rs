//! Google API integration
//!
//! OAuth authentication, the retried JSON transport and the Gmail,
//! Calendar and People services built on it.

pub mod api;
pub mod auth;
pub mod calendar;
pub mod gmail;
pub mod mime;
pub mod people;

pub use api::{ApiClient, Credentials};
pub use auth::Authenticator;
pub use calendar::CalendarService;
pub use gmail::GmailService;
pub use people::PeopleService;
