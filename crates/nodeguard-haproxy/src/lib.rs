//! nodeguard-haproxy — HAProxy stats-socket control client.
//!
//! Inspects and mutates load-balancer rotation over HAProxy's
//! line-oriented text protocol:
//!
//! | Command | Used by |
//! |---|---|
//! | `show servers state <backend>` | [`HaproxyClient::query_state`], status and count queries |
//! | `disable server <backend>/<server>` | [`HaproxyClient::disable_server`], [`HaproxyClient::rotate_out`] |
//! | `enable server <backend>/<server>` | [`HaproxyClient::enable_server`], [`HaproxyClient::rotate_in`] |
//!
//! Rows are parsed against a fixed column schema (`srv_op_state` at
//! column 5, `2` meaning UP). The paired rotation helpers refuse to act
//! unless both servers of a pair are UP, so a backend is never emptied.

pub mod client;
pub mod error;
pub mod state;

pub use client::HaproxyClient;
pub use error::{HaproxyError, HaproxyResult};
pub use state::{parse_server_state, ServerStateLine, SRV_STATE_RUNNING};
