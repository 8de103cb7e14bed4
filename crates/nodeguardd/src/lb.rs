//! HAProxy rotation from the command line (`nodeguardd lb`).

use std::time::Duration;

use clap::Subcommand;

use nodeguard_haproxy::{HaproxyClient, ServerStateLine};

const CLI_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Subcommand)]
pub enum LbAction {
    /// List the server rows of a backend.
    Servers {
        backend: String,
        /// Print raw JSON rows.
        #[arg(long)]
        json: bool,
    },
    /// Print UP or DOWN for one server.
    Status { backend: String, server: String },
    /// Count UP servers in a backend.
    Count {
        backend: String,
        #[arg(long)]
        exclude_backup: bool,
        /// Skip rows whose backend name contains this tag.
        #[arg(long)]
        exclude_tag: Option<String>,
    },
    /// Put a server back into rotation.
    Enable {
        backend: String,
        server: String,
        /// Verify this peer is UP too after enabling.
        #[arg(long)]
        peer: Option<String>,
    },
    /// Take a server out of rotation.
    Disable {
        backend: String,
        server: String,
        /// Refuse unless this peer is UP as well.
        #[arg(long)]
        peer: Option<String>,
    },
}

pub async fn run(address: &str, action: LbAction) -> anyhow::Result<()> {
    let client = HaproxyClient::new(address, CLI_TIMEOUT);

    match action {
        LbAction::Servers { backend, json } => {
            let rows = client.query_state(&backend).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", render_rows(&rows));
            }
        }
        LbAction::Status { backend, server } => {
            match client.get_server_status(&backend, &server).await? {
                Some(up) => println!("{backend}/{server}: {}", if up { "UP" } else { "DOWN" }),
                None => anyhow::bail!("server {backend}/{server} not found"),
            }
        }
        LbAction::Count {
            backend,
            exclude_backup,
            exclude_tag,
        } => {
            let count = client
                .get_server_count(&backend, exclude_backup, exclude_tag.as_deref())
                .await?;
            println!("{count}");
        }
        LbAction::Enable { backend, server, peer } => {
            match peer {
                Some(peer) => client.rotate_in(&backend, &server, &peer).await?,
                None => client.enable_server(&backend, &server).await?,
            }
            println!("{backend}/{server} enabled");
        }
        LbAction::Disable { backend, server, peer } => {
            match peer {
                Some(peer) => client.rotate_out(&backend, &server, &peer).await?,
                None => client.disable_server(&backend, &server).await?,
            }
            println!("{backend}/{server} disabled");
        }
    }
    Ok(())
}

fn render_rows(rows: &[ServerStateLine]) -> String {
    let mut out = format!("{:<24} {:<24} {:<6} {}\n", "BACKEND", "SERVER", "STATE", "BACKUP");
    for row in rows {
        out.push_str(&format!(
            "{:<24} {:<24} {:<6} {}\n",
            row.backend,
            row.server,
            if row.up { "UP" } else { "DOWN" },
            if row.backup { "yes" } else { "" },
        ));
    }
    out
}
