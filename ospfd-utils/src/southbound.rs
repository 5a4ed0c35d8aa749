use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct InterfaceFlags: u8 {
        const LOOPBACK = 0x01;
        const OPERATIVE = 0x02;
        const BROADCAST = 0x04;
    }
}

// System data of a network interface, as discovered from the kernel.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceUpdate {
    pub ifname: String,
    pub ifindex: u32,
    pub mtu: u32,
    pub flags: InterfaceFlags,
    pub addresses: BTreeSet<Ipv4Network>,
}

// Route nexthop, in the form expected by the forwarding plane.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Nexthop {
    Address { ifindex: u32, addr: Ipv4Addr },
    Interface { ifindex: u32 },
}

// Request to install a route in the forwarding plane.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteMsg {
    pub prefix: Ipv4Network,
    pub distance: u32,
    pub metric: u32,
    pub tag: Option<u32>,
    pub nexthops: BTreeSet<Nexthop>,
}

// Request to uninstall a route from the forwarding plane.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteKeyMsg {
    pub prefix: Ipv4Network,
}
