//! Device-management server: credentials, OAuth, and classic XML resources.

mod client;
mod errors;
mod prefs;
pub mod xml;

pub use client::{JamfClient, Resource};
pub use errors::{PrefsError, ServerError};
pub use prefs::{PrefsUpdate, ServerPrefs, prefs_report, read_prefs, write_prefs};

#[cfg(test)]
pub(crate) mod test_support;
