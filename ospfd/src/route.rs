use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::net::Ipv4Addr;

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;

use crate::area::Area;
use crate::collections::{Arena, InterfaceIndex};
use crate::debug::Debug;
use crate::instance::{InstanceArenas, InstanceCfg, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::{LSA_INFINITY, LsaEntry};
use crate::packet::lsa::{LsaKey, LsaRouterFlags};
use crate::southbound;
use crate::spf;

// Network routing table entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteNet {
    pub origin: Option<LsaKey>,
    pub path_type: PathType,
    pub metric: u32,
    pub type2_metric: Option<u32>,
    pub tag: Option<u32>,
    pub nexthops: Nexthops,
    pub flags: RouteNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RouteNetFlags: u8 {
        const CONNECTED = 0x01;
        const INSTALLED = 0x02;
    }
}

// Router routing table entry.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct RouteRtr {
    pub path_type: PathType,
    pub flags: LsaRouterFlags,
    pub metric: u32,
    pub nexthops: Nexthops,
}

// OSPF path types in decreasing order of preference.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathType {
    IntraArea,
    Type1External,
    Type2External,
}

// Route nexthop key.
#[derive(Clone, Copy, Debug, Eq, new, Ord, PartialEq, PartialOrd)]
pub struct NexthopKey {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
}

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
pub struct Nexthop {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
    // Router-ID of the remote neighbor (`None` for connected routes).
    pub nbr_router_id: Option<Ipv4Addr>,
}

// Ordered list of nexthops.
pub type Nexthops = BTreeMap<NexthopKey, Nexthop>;

// ===== impl RouteNet =====

impl RouteNet {
    pub(crate) fn distance(&self, config: &InstanceCfg) -> u8 {
        match self.path_type {
            PathType::IntraArea => config.preference.intra_area,
            PathType::Type1External | PathType::Type2External => {
                config.preference.external
            }
        }
    }

    pub(crate) fn metric(&self) -> u32 {
        match self.path_type {
            PathType::IntraArea => self.metric,
            PathType::Type1External => self.metric,
            PathType::Type2External => self.type2_metric.unwrap(),
        }
    }
}

// ===== global functions =====

// Updates the OSPF routing table after an SPF run, then synchronizes the
// changes with the forwarding plane.
pub(crate) fn update_rib(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let mut rib = BTreeMap::new();
    let old_rib = std::mem::take(&mut instance.state.rib);

    // Compute intra-area routes.
    update_rib_intra_area(&mut rib, &arenas.area);

    // Compute external routes.
    update_rib_external(&mut rib, &arenas.area, instance, &arenas.lsa_entries);

    // Update OSPF routes in the global RIB.
    update_global_rib(&mut rib, old_rib, instance, &arenas.interfaces);

    // Save updated RIB.
    instance.state.rib = rib;
}

// ===== helper functions =====

// Computes intra-area routes.
fn update_rib_intra_area(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    area: &Area,
) {
    // Iterate over all stub networks and their corresponding vertices.
    for stub in spf::intra_area_networks(area) {
        // Calculate stub metric.
        let metric = stub.vertex.distance.saturating_add(stub.metric) as u32;

        // Compare this distance to the current best cost to the stub
        // network. If the calculated distance is larger, go on to examine
        // the next stub network link in the LSA.
        if let Some(best_route) = rib.get(&stub.prefix)
            && metric > best_route.metric
        {
            continue;
        }

        // Get LS Origin.
        let origin = stub.vertex.lsa.origin();

        // If the newly added vertex is a transit network, the routing table
        // entry for the network is located. If the routing table entry
        // already exists, multiple vertices have mapped to the same IP
        // network. For example, this can occur when a new Designated Router
        // is being established. In this case, the current routing table
        // entry should be overwritten if and only if the newly found path is
        // just as short and the current routing table entry's Link State
        // Origin has a smaller Link State ID than the newly added vertex'
        // LSA.
        if !stub.vertex.lsa.is_router() {
            if let btree_map::Entry::Occupied(o) = rib.entry(stub.prefix) {
                let curr_route = o.get();
                if metric > curr_route.metric
                    || origin.lsa_id < curr_route.origin.unwrap().lsa_id
                {
                    continue;
                }
                o.remove();
            }
        }

        // Create new intra-area route.
        let mut flags = RouteNetFlags::empty();
        if stub.vertex.hops == 0 {
            flags.insert(RouteNetFlags::CONNECTED);
        }
        let new_route = RouteNet {
            origin: Some(origin),
            path_type: PathType::IntraArea,
            metric,
            type2_metric: None,
            tag: None,
            nexthops: stub.vertex.nexthops.clone(),
            flags,
        };

        // Try to add or update stub route in the RIB.
        route_update(rib, stub.prefix, new_route);
    }
}

// Computes AS external routes.
fn update_rib_external(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
) {
    // Examine all AS-external-LSAs.
    let router_id = instance.state.router_id;
    for lsa in spf::external_networks(&instance.state.lsdb, lsa_entries)
        // Filter out unreachable LSAs.
        .filter(|lsa| lsa.metric < LSA_INFINITY)
        // Filter out LSAs originated by the calculating router itself.
        .filter(|lsa| lsa.adv_rtr != router_id)
    {
        // Look up the routing table entry for the AS boundary router (ASBR)
        // that originated the LSA.
        let route_asbr = match area
            .state
            .routers
            .get(&lsa.adv_rtr)
            .filter(|route| route.flags.contains(LsaRouterFlags::E))
        {
            Some(route_asbr) => route_asbr,
            None => {
                // If no entry exists for router ASBR, do nothing with this
                // LSA and consider the next in the list.
                Debug::SpfUnreachableAsbr(&lsa.prefix, lsa.adv_rtr).log();
                continue;
            }
        };

        // Get path type and metric.
        let (path_type, metric, type2_metric) = match lsa.e_bit {
            true => {
                (PathType::Type2External, route_asbr.metric, Some(lsa.metric))
            }
            false => (
                PathType::Type1External,
                route_asbr.metric + lsa.metric,
                None,
            ),
        };

        // Create new external route.
        let new_route = RouteNet {
            origin: None,
            path_type,
            metric,
            type2_metric,
            tag: lsa.tag,
            nexthops: route_asbr.nexthops.clone(),
            flags: RouteNetFlags::empty(),
        };

        // Try to add or update external route in the RIB.
        route_update(rib, lsa.prefix, new_route);
    }
}

// Updates OSPF routes in the global RIB.
//
// This step should be done at the end of the routing table calculation to
// prevent transient states from affecting the forwarding plane.
fn update_global_rib(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    mut old_rib: BTreeMap<Ipv4Network, RouteNet>,
    instance: &mut InstanceUpView<'_>,
    interfaces: &Arena<Interface>,
) {
    // Install new routes or routes that have changed.
    for (prefix, route) in rib {
        // Remove route from the old RIB if it's present.
        if let Some(old_route) = old_rib.remove(prefix) {
            // Skip reinstalling the route if it hasn't changed.
            if old_route.metric() == route.metric()
                && old_route.tag == route.tag
                && old_route.nexthops == route.nexthops
            {
                if old_route.flags.contains(RouteNetFlags::INSTALLED) {
                    route.flags.insert(RouteNetFlags::INSTALLED);
                }
                continue;
            }
        }

        // The list of nexthops might be empty in the case of nexthop
        // computation errors. When that happens, ensure the route is removed
        // from the RIB.
        if !route.flags.contains(RouteNetFlags::CONNECTED)
            && !route.nexthops.is_empty()
        {
            let distance = route.distance(instance.config);
            southbound::route_install(
                &instance.tx.southbound,
                prefix,
                route,
                distance,
                interfaces,
            );
            route.flags.insert(RouteNetFlags::INSTALLED);
        } else if route.flags.contains(RouteNetFlags::INSTALLED) {
            southbound::route_uninstall(&instance.tx.southbound, prefix);
            route.flags.remove(RouteNetFlags::INSTALLED);
        }
    }

    // Uninstall routes that are no longer available.
    for (dest, _) in old_rib
        .into_iter()
        .filter(|(_, route)| route.flags.contains(RouteNetFlags::INSTALLED))
    {
        southbound::route_uninstall(&instance.tx.southbound, &dest);
    }
}

fn route_update(
    rib: &mut BTreeMap<Ipv4Network, RouteNet>,
    prefix: Ipv4Network,
    route: RouteNet,
) {
    match rib.entry(prefix) {
        btree_map::Entry::Occupied(o) => {
            let curr_route = o.into_mut();

            match route_compare(&route, curr_route) {
                Ordering::Less => {
                    // Overwrite the current routing table entry, but preserve
                    // the flag indicating whether the route is installed or
                    // not.
                    let installed =
                        curr_route.flags.contains(RouteNetFlags::INSTALLED);
                    *curr_route = route;
                    if installed {
                        curr_route.flags.insert(RouteNetFlags::INSTALLED);
                    }
                }
                Ordering::Equal => {
                    // Merge nexthops.
                    curr_route.nexthops.extend(route.nexthops);
                }
                Ordering::Greater => {
                    // Ignore less preferred route.
                }
            }
        }
        btree_map::Entry::Vacant(v) => {
            v.insert(route);
        }
    }
}

fn route_compare(a: &RouteNet, b: &RouteNet) -> Ordering {
    let cmp = a.path_type.cmp(&b.path_type);
    if cmp != Ordering::Equal {
        return cmp;
    }

    match a.path_type {
        PathType::IntraArea | PathType::Type1External => {
            a.metric.cmp(&b.metric)
        }
        PathType::Type2External => {
            let cmp = a.type2_metric.cmp(&b.type2_metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            a.metric.cmp(&b.metric)
        }
    }
}
