use clap::Parser;
use server_core::ServerConfig;

const DEFAULT_PORT: u16 = 2222;

#[derive(Debug, Parser)]
#[command(
    name = "gatehouse",
    about = "SSH bastion that brokers, audits, and relays access to backend hosts"
)]
pub struct Args {
    /// Address to bind the bastion endpoint to
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0")]
    pub bind: String,
    /// Port to listen on
    #[arg(short, long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind: args.bind,
            port: args.port,
        }
    }
}
