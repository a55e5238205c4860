//! Outbound address lookup.

use std::net::{SocketAddr, UdpSocket};

use fleetgrid_engine::{EngineError, EngineResult, NetworkInfo};

/// Finds the address of the interface the OS would use to reach `target`.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
#[derive(Debug, Clone, Copy)]
pub struct OutboundIp {
    target: SocketAddr,
}

impl OutboundIp {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for OutboundIp {
    fn default() -> Self {
        Self::new(SocketAddr::from(([8, 8, 8, 8], 53)))
    }
}

impl NetworkInfo for OutboundIp {
    fn my_ip(&self) -> EngineResult<String> {
        let lookup = || -> std::io::Result<String> {
            let socket = UdpSocket::bind(("0.0.0.0", 0))?;
            socket.connect(self.target)?;
            Ok(socket.local_addr()?.ip().to_string())
        };
        lookup().map_err(|e| EngineError::Network(format!("route to {}: {e}", self.target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_target_resolves_to_loopback() {
        let ip = OutboundIp::new(SocketAddr::from(([127, 0, 0, 1], 9)))
            .my_ip()
            .unwrap();
        assert_eq!(ip, "127.0.0.1");
    }
}
