use std::os::fd::AsFd;

use nix::sys::socket::{self, sockopt};
// Re-export the socket types used throughout the daemon.
pub use {socket2::Socket, tokio::io::unix::AsyncFd};

// Useful type definition.
type Result<T> = std::io::Result<T>;

// Extension methods for raw IP sockets.
pub trait SocketExt: Sized + AsFd {
    // Sets the value of the IP_PKTINFO option for this socket.
    fn set_ipv4_pktinfo(&self, enabled: bool) -> Result<()> {
        socket::setsockopt(self, sockopt::Ipv4PacketInfo, &enabled)
            .map_err(std::io::Error::from)
    }
}

impl SocketExt for Socket {}
