//! Contact matching service: uploads a user's contact list, matches phone
//! numbers against registered users and records the resulting relations.

pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod ports;
pub mod schema;
pub mod service;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
pub use service::{ContactService, ContactsPort, SaveReport};
