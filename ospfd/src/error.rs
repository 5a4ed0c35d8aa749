use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{error, warn, warn_span};

use crate::collections::{InterfaceId, LsaEntryId, NeighborId};
use crate::interface::ism;
use crate::neighbor::nsm;
use crate::network::MulticastAddr;
use crate::packet::PacketType;
use crate::packet::error::DecodeError;
use crate::packet::lsa::LsaKey;
use crate::spf;

// Errors raised while the instance task processes events. None of them are
// fatal: the offending event or packet is logged and dropped.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] IoError),
    // A timer or channel message outlived the object it refers to.
    #[error("interface {0} is gone, dropping stale event")]
    InterfaceGone(InterfaceId),
    #[error("neighbor {0} is gone, dropping stale event")]
    NeighborGone(NeighborId),
    #[error("LSA entry {0} is gone, dropping stale event")]
    LsaEntryGone(LsaEntryId),
    #[error("no LSDB entry matches {0:?}")]
    LsaMissing(LsaKey),
    // Received packets dropped before reaching a handler.
    #[error("dropping packet with unusable source address {0}")]
    BadSrcAddr(Ipv4Addr),
    #[error("dropping packet sent to unexpected destination {0}")]
    BadDstAddr(Ipv4Addr),
    #[error("dropping undecodable packet")]
    PacketDecode(#[source] DecodeError),
    #[error("no active neighbor {1} at {0} for this packet")]
    UnknownNeighbor(Ipv4Addr, Ipv4Addr),
    #[error(
        "{pkt_type:?} packet from {src} on {ifname} advertises {mismatch}"
    )]
    PacketMismatch {
        ifname: String,
        src: Ipv4Addr,
        pkt_type: PacketType,
        mismatch: CfgMismatch,
    },
    #[error("database description from {0} not allowed in state {1:?}")]
    DbDescNotAllowed(Ipv4Addr, nsm::State),
    // Routing computation.
    #[error("own Router-LSA is missing from area {0}, skipping SPF")]
    SpfRootMissing(Ipv4Addr),
    #[error("no usable nexthop towards {0:?}")]
    NexthopUnresolved(spf::VertexId),
    // State machines.
    #[error("interface FSM has no transition for {1:?} in state {0:?}")]
    IsmEventRejected(ism::State, ism::Event),
    #[error("neighbor {0} FSM has no transition for {2:?} in state {1:?}")]
    NsmEventRejected(Ipv4Addr, nsm::State, nsm::Event),
    #[error("SPF delay FSM has no transition for {1:?} in state {0:?}")]
    SpfFsmEventRejected(spf::fsm::State, spf::fsm::Event),
    #[error("interface {ifname} failed to start")]
    InterfaceStart {
        ifname: String,
        #[source]
        error: IoError,
    },
}

// I/O errors from the raw-socket and multicast plumbing.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to create raw OSPF socket")]
    Socket(#[source] std::io::Error),
    #[error("failed to join multicast group {0:?}")]
    MulticastJoin(MulticastAddr, #[source] std::io::Error),
    #[error("failed to leave multicast group {0:?}")]
    MulticastLeave(MulticastAddr, #[source] std::io::Error),
    #[error("failed to receive packet")]
    Recv(#[source] std::io::Error),
    #[error("received packet carries no source address")]
    RecvMissingSrc,
    #[error("received packet carries no IP_PKTINFO data")]
    RecvMissingPktinfo,
    #[error("failed to send packet")]
    Send(#[source] std::io::Error),
}

// Ways a received packet can disagree with the receiving interface's
// configuration. The offender and expectation are spelled out so the two
// routers can be reconciled by hand.
#[derive(Debug, Error)]
pub enum CfgMismatch {
    #[error("area {0} instead of the configured area {1}")]
    AreaId(Ipv4Addr, Ipv4Addr),
    #[error("network mask {0} instead of the interface mask {1}")]
    NetMask(Ipv4Addr, Ipv4Addr),
    #[error("hello interval {0} instead of the configured {1}")]
    HelloInterval(u16, u16),
    #[error("dead interval {0} instead of the configured {1}")]
    DeadInterval(u32, u32),
    #[error("external routing capability {0} instead of the area's")]
    ExternalBit(bool),
    #[error("an MTU of {0}, larger than the interface can handle")]
    Mtu(u16),
    #[error("the local router-id {0} as its source")]
    RouterIdCollision(Ipv4Addr),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            // Failing to bring up an interface deserves more attention than
            // a dropped packet or event.
            Error::InterfaceStart { .. } => {
                error!("{}", error_chain(self));
            }
            Error::NsmEventRejected(router_id, ..) => {
                warn_span!("neighbor", %router_id)
                    .in_scope(|| warn!("{}", error_chain(self)));
            }
            _ => {
                warn!("{}", error_chain(self));
            }
        }
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        warn!("{}", error_chain(self));
    }
}

// ===== helper functions =====

// Renders an error together with its chain of sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut msg = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
