use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::if_nametoindex;
use ospfd_utils::southbound::{
    InterfaceFlags, InterfaceUpdate, Nexthop, RouteKeyMsg, RouteMsg,
};
use ospfd_utils::task::Task;
use ospfd_utils::{UnboundedReceiver, UnboundedSender};
use rtnetlink::Handle;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug_span, error, warn};

use crate::collections::Arena;
use crate::interface::Interface;
use crate::route::RouteNet;

// Route protocol type as defined in the rtnetlink.h kernel header.
const NETLINK_PROTO_OSPF: u8 = 188;

// Messages sent to the southbound task.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum SouthboundMsg {
    RouteInstall(RouteMsg),
    RouteUninstall(RouteKeyMsg),
}

// ===== global functions =====

// Discovers system data (ifindex, MTU, flags and addresses) for all
// interfaces in the system.
pub fn interfaces_discover() -> Result<Vec<InterfaceUpdate>, std::io::Error> {
    let mut interfaces: Vec<InterfaceUpdate> = vec![];

    for ifaddr in getifaddrs()? {
        // Lookup or create interface entry.
        let iface = match interfaces
            .iter_mut()
            .find(|iface| iface.ifname == ifaddr.interface_name)
        {
            Some(iface) => iface,
            None => {
                let ifindex =
                    if_nametoindex(ifaddr.interface_name.as_str())
                        .unwrap_or(0);

                let mut flags = InterfaceFlags::empty();
                if ifaddr.flags.contains(nix::net::if_::InterfaceFlags::IFF_LOOPBACK)
                {
                    flags.insert(InterfaceFlags::LOOPBACK);
                }
                if ifaddr.flags.contains(nix::net::if_::InterfaceFlags::IFF_RUNNING)
                {
                    flags.insert(InterfaceFlags::OPERATIVE);
                }
                if ifaddr.flags.contains(nix::net::if_::InterfaceFlags::IFF_BROADCAST)
                {
                    flags.insert(InterfaceFlags::BROADCAST);
                }

                interfaces.push(InterfaceUpdate {
                    ifname: ifaddr.interface_name.clone(),
                    ifindex,
                    // The MTU isn't present in the getifaddrs() results.
                    // Assume the Ethernet default as the original interface
                    // enumeration did.
                    mtu: 1500,
                    flags,
                    addresses: Default::default(),
                });
                interfaces.last_mut().unwrap()
            }
        };

        // Record the interface's IPv4 addresses.
        if let (Some(addr), Some(netmask)) = (ifaddr.address, ifaddr.netmask)
            && let (Some(addr), Some(netmask)) =
                (addr.as_sockaddr_in(), netmask.as_sockaddr_in())
        {
            let addr = Ipv4Addr::from(addr.ip());
            let netmask = Ipv4Addr::from(netmask.ip());
            if let Ok(addr) = Ipv4Network::with_netmask(addr, netmask) {
                iface.addresses.insert(addr);
            }
        }
    }

    Ok(interfaces)
}

// Requests the installation of the provided route in the forwarding plane.
pub(crate) fn route_install(
    southbound_tx: &UnboundedSender<SouthboundMsg>,
    destination: &Ipv4Network,
    route: &RouteNet,
    distance: u8,
    interfaces: &Arena<Interface>,
) {
    // Fill-in nexthops.
    let nexthops = route
        .nexthops
        .values()
        .map(|nexthop| {
            let iface = &interfaces[nexthop.iface_idx];
            match nexthop.addr {
                Some(addr) => Nexthop::Address {
                    ifindex: iface.system.ifindex.unwrap(),
                    addr,
                },
                None => Nexthop::Interface {
                    ifindex: iface.system.ifindex.unwrap(),
                },
            }
        })
        .collect::<BTreeSet<_>>();

    // Install route.
    let msg = RouteMsg {
        prefix: *destination,
        distance: distance.into(),
        metric: route.metric(),
        tag: route.tag,
        nexthops,
    };
    let _ = southbound_tx.send(SouthboundMsg::RouteInstall(msg));
}

// Requests the removal of the provided route from the forwarding plane.
pub(crate) fn route_uninstall(
    southbound_tx: &UnboundedSender<SouthboundMsg>,
    destination: &Ipv4Network,
) {
    let msg = RouteKeyMsg {
        prefix: *destination,
    };
    let _ = southbound_tx.send(SouthboundMsg::RouteUninstall(msg));
}

// Spawns the southbound task, which owns the netlink handle and applies
// route updates to the kernel FIB.
pub fn spawn_task(mut msg_rx: UnboundedReceiver<SouthboundMsg>) -> Task<()> {
    let span = debug_span!("southbound");
    let _span_guard = span.enter();

    Task::spawn(
        async move {
            // Create netlink connection.
            let handle = match rtnetlink::new_connection() {
                Ok((conn, handle, _)) => {
                    tokio::spawn(conn);
                    handle
                }
                Err(error) => {
                    error!(%error, "failed to create netlink connection");
                    return;
                }
            };

            while let Some(msg) = msg_rx.recv().await {
                match msg {
                    SouthboundMsg::RouteInstall(msg) => {
                        route_install_netlink(&handle, msg).await;
                    }
                    SouthboundMsg::RouteUninstall(msg) => {
                        route_uninstall_netlink(&handle, msg).await;
                    }
                }
            }
        }
        .in_current_span(),
    )
}

// ===== helper functions =====

async fn route_install_netlink(handle: &Handle, msg: RouteMsg) {
    // Create netlink request.
    let mut request = handle
        .route()
        .add()
        .protocol(netlink_packet_route::route::RouteProtocol::Other(
            NETLINK_PROTO_OSPF,
        ))
        .v4()
        .replace()
        .destination_prefix(msg.prefix.ip(), msg.prefix.prefix());

    // Add nexthops.
    for nexthop in &msg.nexthops {
        request = match nexthop {
            Nexthop::Address { addr, ifindex } => {
                request.gateway(*addr).output_interface(*ifindex)
            }
            Nexthop::Interface { ifindex } => {
                request.output_interface(*ifindex)
            }
        };
    }

    // Execute request.
    if let Err(error) = request.execute().await {
        warn!(prefix = %msg.prefix, %error, "failed to install route");
    }
}

async fn route_uninstall_netlink(handle: &Handle, msg: RouteKeyMsg) {
    // Create netlink request.
    let mut request = handle
        .route()
        .add()
        .protocol(netlink_packet_route::route::RouteProtocol::Other(
            NETLINK_PROTO_OSPF,
        ))
        .v4()
        .destination_prefix(msg.prefix.ip(), msg.prefix.prefix());

    // Execute request.
    let request = handle.route().del(request.message_mut().clone());
    if let Err(error) = request.execute().await {
        warn!(prefix = %msg.prefix, %error, "failed to uninstall route");
    }
}
