use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::TreeDb;

/// Hosts the rally data tree over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "rally-server", version)]
pub struct Config {
    /// Port to listen on.
    #[arg(env = "RALLY_PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "RALLY_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// Directory of the sled database.
    #[arg(long, env = "RALLY_DB", default_value = "rally-db")]
    pub db: PathBuf,

    /// Keep everything in a throwaway database instead of `--db`.
    #[arg(long, env = "RALLY_TEMPORARY")]
    pub temporary: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn open_db(&self) -> anyhow::Result<TreeDb> {
        if self.temporary {
            TreeDb::temporary()
        } else {
            TreeDb::open(&self.db)
        }
    }
}
