//! BFD - single-hop sessions, authentication keys and the echo function.
//!
//! # Dependencies
//!
//! ```text
//! interface (carrying the source address) ──┐
//!                                           ├──> bfd_session
//! bfd_auth_key (when authenticated) ────────┘
//! interface ──> bfd_echo_function
//! ```
//!
//! A session whose interface is missing, or does not (yet) carry the
//! session's source address, waits in the pending cache and is created as
//! soon as the interface gains the address. Recreating or deleting a key
//! takes down the sessions using it; they come back when the key does.
//!
//! The device does not keep tags on BFD objects: resync matches sessions on
//! interface + source + destination, keys on their id and the echo
//! function on its source interface.

#[cfg(feature = "mod-bfd")]
mod orch;
mod types;

#[cfg(feature = "mod-bfd")]
pub use orch::{BfdAuthKeyRegistry, BfdAuthKeySpec, BfdEchoRegistry, BfdEchoSpec, BfdSessionSpec};
pub use types::{
    BfdAuthKeyConfig, BfdAuthKeyMeta, BfdAuthType, BfdAuthentication, BfdEchoConfig, BfdEchoMeta,
    BfdSessionConfig, BfdSessionMeta, BfdSessionResolved, BFD_AUTH_SECRET_MAX,
    BFD_DEFAULT_DETECT_MULTIPLIER, BFD_DEFAULT_RX_INTERVAL, BFD_DEFAULT_TX_INTERVAL,
};
