//! NIBE Uplink heat-pump telemetry poller
//!
//! Maintains an OAuth2 authorization-code/refresh-token session against
//! the vendor API, polls service-info categories and their parameter
//! readings on a schedule, and republishes normalized readings as
//! broadcast events.
//!
//! ```no_run
//! use nibe_poller::{Options, Poller, Event};
//!
//! # async fn run() -> Result<(), nibe_poller::Error> {
//! let mut options = Options::new("<32-char client id>", "<secret>", 12345);
//! options.auto_start = false;
//!
//! let poller = Poller::new(options)?;
//! let mut events = poller.subscribe();
//! poller.start();
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         Event::Data(readings) => println!("{} readings", readings.len()),
//!         Event::Error(e) => eprintln!("cycle failed: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod poller;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::{
    AuthFlow, AuthorizationPrompt, CredentialStore, Credentials, FileStore, MemoryStore,
    TerminalPrompt,
};
pub use config::{Options, Schedule};
pub use error::Error;
pub use models::{Category, RawParameter, Reading};
pub use poller::{Event, Poller};
