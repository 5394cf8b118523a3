use std::net::TcpListener;

use eyre::{Result, WrapErr};

use crate::DEFAULT_DEBUG_HOST;

/// Ask the OS for a currently unused loopback port
pub fn get_random_tcp_port() -> Result<u16> {
    for _ in 0..50 {
        match TcpListener::bind((DEFAULT_DEBUG_HOST, 0)) {
            Ok(listener) => {
                let addr = listener
                    .local_addr()
                    .wrap_err("reading bound listener address")?;
                return Ok(addr.port());
            }
            Err(e) => {
                tracing::warn!(%e, "binding");
            }
        }
    }

    eyre::bail!("could not get free port");
}
