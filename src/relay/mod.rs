//! Relay sessions and the accept loop
//!
//! - [`Relay`]: runs one session (resolve, dial, copy both ways, close)
//! - [`Redirector`] / [`RedirectorHandle`]: listener lifecycle
//! - [`RelayStats`]: counters shared by all of the above

mod server;
mod session;
mod stats;

pub use server::{Redirector, RedirectorHandle, ACCEPT_BACKOFF};
pub use session::{
    Relay, RelayOptions, SessionEnd, SessionReport, SessionState, DEFAULT_KEEPALIVE,
};
pub use stats::{RelayStats, RelayStatsSnapshot};
