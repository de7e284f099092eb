//! Administrative client for a running Authguard server.
//!
//! ## Commands
//!
//! - `check`: Ask whether a login attempt may proceed
//! - `reset`: Reset the ip and login buckets of a client
//! - `white-add`, `white-delete`: Manage the white list
//! - `black-add`, `black-delete`: Manage the black list

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use authguard::grpc::proto::{
    BlackListAddRequest, BlackListDeleteRequest, BucketResetRequest, LimitCheckRequest,
    WhiteListAddRequest, WhiteListDeleteRequest,
};
use authguard::grpc::AuthLimiterClient;

#[derive(Parser)]
#[command(name = "authguard-cli", version, about = "Authguard admin CLI")]
struct Cli {
    /// Server endpoint
    #[arg(long, env = "AUTHGUARD_ADDR", default_value = "http://127.0.0.1:50051")]
    addr: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a login attempt is allowed
    Check {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },

    /// Reset the ip and login buckets
    Reset {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        login: String,
    },

    /// Add an address or network (e.g. 10.0.0.0/24) to the white list
    WhiteAdd { ip_net: String },

    /// Remove an entry from the white list
    WhiteDelete { ip_net: String },

    /// Add an address or network to the black list
    BlackAdd { ip_net: String },

    /// Remove an entry from the black list
    BlackDelete { ip_net: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = AuthLimiterClient::connect(cli.addr.clone())
        .await
        .with_context(|| format!("failed to connect to {}", cli.addr))?;

    match cli.cmd {
        Commands::Check { ip, login, password } => {
            let response = client
                .limit_check(LimitCheckRequest { ip, login, password })
                .await?
                .into_inner();
            println!("{}", if response.allowed { "allowed" } else { "denied" });
        }
        Commands::Reset { ip, login } => {
            client.bucket_reset(BucketResetRequest { ip, login }).await?;
            println!("ok");
        }
        Commands::WhiteAdd { ip_net } => {
            client.white_list_add(WhiteListAddRequest { ip_net }).await?;
            println!("ok");
        }
        Commands::WhiteDelete { ip_net } => {
            client.white_list_delete(WhiteListDeleteRequest { ip_net }).await?;
            println!("ok");
        }
        Commands::BlackAdd { ip_net } => {
            client.black_list_add(BlackListAddRequest { ip_net }).await?;
            println!("ok");
        }
        Commands::BlackDelete { ip_net } => {
            client.black_list_delete(BlackListDeleteRequest { ip_net }).await?;
            println!("ok");
        }
    }

    Ok(())
}
