//! Parsing of `show servers state` dumps.
//!
//! HAProxy answers `show servers state <backend>` with a format-version
//! line, a `#`-prefixed column header, and one space-delimited row per
//! server:
//!
//! ```text
//! 1
//! # be_id be_name srv_id srv_name srv_addr srv_op_state srv_admin_state ...
//! 3 ethmainnet 1 eth1 10.0.0.10 2 0 1 1 4132 6 3 4 6 0 0 0 - 8545 - ...
//! ```
//!
//! Rows are parsed against a fixed schema. A shifted or truncated row is
//! a [`HaproxyError::Parse`], never a silently wrong status.

use serde::Serialize;

use crate::error::{HaproxyError, HaproxyResult};

/// `srv_op_state` value meaning the server is serving traffic.
pub const SRV_STATE_RUNNING: u8 = 2;

/// Substring flagging a backup server in a state row.
pub const BACKUP_MARKER: &str = "backup";

const COL_BACKEND: usize = 1;
const COL_SERVER: usize = 3;
const COL_OP_STATE: usize = 5;

/// One server row from a state dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStateLine {
    pub backend: String,
    pub server: String,
    pub status_code: u8,
    /// `status_code == SRV_STATE_RUNNING`.
    pub up: bool,
    /// The row carries the backup marker.
    pub backup: bool,
}

/// Parse a full `show servers state` response into rows, in order.
pub fn parse_server_state(response: &str) -> HaproxyResult<Vec<ServerStateLine>> {
    let mut rows = Vec::new();
    for raw in response.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut columns = line.split_whitespace();
        let first = columns.next().unwrap_or_default();
        // Lone integer: the dump's format version.
        if columns.next().is_none() && first.parse::<u32>().is_ok() {
            continue;
        }
        if first.parse::<u32>().is_err() {
            // Not a row at all: HAProxy reports errors as plain text.
            return Err(HaproxyError::Command {
                command: "show servers state".to_string(),
                message: line.to_string(),
            });
        }
        rows.push(parse_row(line)?);
    }
    Ok(rows)
}

/// Parse a single data row.
pub fn parse_row(line: &str) -> HaproxyResult<ServerStateLine> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() <= COL_OP_STATE {
        return Err(HaproxyError::Parse {
            line: line.to_string(),
            reason: format!(
                "expected at least {} columns, found {}",
                COL_OP_STATE + 1,
                columns.len()
            ),
        });
    }

    let status_code = columns[COL_OP_STATE]
        .parse::<u8>()
        .map_err(|e| HaproxyError::Parse {
            line: line.to_string(),
            reason: format!("srv_op_state {:?} is not numeric: {e}", columns[COL_OP_STATE]),
        })?;

    Ok(ServerStateLine {
        backend: columns[COL_BACKEND].to_string(),
        server: columns[COL_SERVER].to_string(),
        status_code,
        up: status_code == SRV_STATE_RUNNING,
        backup: line.contains(BACKUP_MARKER),
    })
}
