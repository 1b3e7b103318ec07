pub mod api;
pub mod cleanup;
pub mod config;
pub mod ea;
pub mod logging;
pub mod nightly;
pub mod probe;
pub mod runner;
pub mod server;
pub mod settings;
pub mod status;
pub mod sync;
pub mod template;
pub mod timestamp;
pub mod version;
