use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use derive_new::new;
use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv4Network;
use ospfd_utils::ip::Ipv4NetworkExt;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{Arena, Lsdb};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::LsaEntry;
use crate::packet::lsa::{
    Lsa, LsaAsExternalFlags, LsaKey, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaTypeCode,
};
use crate::route::{self, Nexthop, NexthopKey, Nexthops, PathType, RouteRtr};
use crate::tasks;

#[derive(Debug, new)]
pub struct Vertex {
    pub id: VertexId,
    pub lsa: VertexLsa,
    pub distance: u16,
    pub hops: u16,
    #[new(default)]
    pub nexthops: Nexthops,
}

// SPF vertex identifier.
//
// NOTE: network vertices are ordered before router vertices in order for the
// SPF algorithm to find all equal-cost paths.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum VertexId {
    Network { dr_addr: Ipv4Addr },
    Router { router_id: Ipv4Addr },
}

#[derive(Debug, Eq, PartialEq, EnumAsInner)]
pub enum VertexLsa {
    Network(Arc<Lsa>),
    Router(Arc<Lsa>),
}

impl VertexLsa {
    // Returns the Link State Origin of this vertex.
    pub(crate) fn origin(&self) -> LsaKey {
        let lsa = match self {
            VertexLsa::Network(lsa) => lsa,
            VertexLsa::Router(lsa) => lsa,
        };
        lsa.hdr.key()
    }
}

#[derive(Debug, new)]
pub struct SpfLink<'a> {
    pub parent: Option<&'a LsaRouterLink>,
    pub id: VertexId,
    pub lsa: VertexLsa,
    pub cost: u16,
}

#[derive(Debug)]
pub struct SpfIntraAreaNetwork<'a> {
    pub vertex: &'a Vertex,
    pub prefix: Ipv4Network,
    pub metric: u16,
}

#[derive(Debug)]
pub struct SpfExternalNetwork {
    pub adv_rtr: Ipv4Addr,
    pub e_bit: bool,
    pub prefix: Ipv4Network,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: Option<u32>,
}

// SPF Delay State Machine.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Quiet,
        ShortWait,
        LongWait,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        Igp,
        DelayTimer,
        HoldDownTimer,
        LearnTimer,
    }
}

// ===== global functions =====

pub(crate) fn fsm(
    event: fsm::Event,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) -> Result<(), Error> {
    Debug::SpfDelayFsmEvent(&instance.state.spf_delay_state, &event).log();

    let new_fsm_state = match (instance.state.spf_delay_state, &event) {
        // Transition 1: IGP event while in QUIET state.
        (fsm::State::Quiet, fsm::Event::Igp) => {
            // If SPF_TIMER is not already running, start it with value
            // INITIAL_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_initial_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Start LEARN_TIMER with TIME_TO_LEARN_INTERVAL.
            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::LearnTimer,
                instance.config.spf_time_to_learn,
            );
            instance.state.spf_learn_timer = Some(task);

            // Start HOLDDOWN_TIMER with HOLDDOWN_INTERVAL.
            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::HoldDownTimer,
                instance.config.spf_hold_down,
            );
            instance.state.spf_hold_down_timer = Some(task);

            // Transition to SHORT_WAIT state.
            Some(fsm::State::ShortWait)
        }
        // Transition 2: IGP event while in SHORT_WAIT.
        (fsm::State::ShortWait, fsm::Event::Igp) => {
            // Reset HOLDDOWN_TIMER to HOLDDOWN_INTERVAL.
            if let Some(timer) = &mut instance.state.spf_hold_down_timer {
                let timeout =
                    Duration::from_millis(instance.config.spf_hold_down.into());
                timer.reset(Some(timeout));
            }

            // If SPF_TIMER is not already running, start it with value
            // SHORT_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_short_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Remain in current state.
            None
        }
        // Transition 3: LEARN_TIMER expiration.
        (fsm::State::ShortWait, fsm::Event::LearnTimer) => {
            instance.state.spf_learn_timer = None;

            // Transition to LONG_WAIT state.
            Some(fsm::State::LongWait)
        }
        // Transition 4: IGP event while in LONG_WAIT.
        (fsm::State::LongWait, fsm::Event::Igp) => {
            // Reset HOLDDOWN_TIMER to HOLDDOWN_INTERVAL.
            if let Some(timer) = &mut instance.state.spf_hold_down_timer {
                let timeout =
                    Duration::from_millis(instance.config.spf_hold_down.into());
                timer.reset(Some(timeout));
            }

            // If SPF_TIMER is not already running, start it with value
            // LONG_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_long_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Remain in current state.
            None
        }
        // Transition 5: HOLDDOWN_TIMER expiration while in LONG_WAIT.
        (fsm::State::LongWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;

            // Transition to QUIET state.
            Some(fsm::State::Quiet)
        }
        // Transition 6: HOLDDOWN_TIMER expiration while in SHORT_WAIT.
        (fsm::State::ShortWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;

            // Deactivate LEARN_TIMER.
            instance.state.spf_learn_timer = None;

            // Transition to QUIET state.
            Some(fsm::State::Quiet)
        }
        // Transitions 7-9: SPF_TIMER expiration.
        (
            fsm::State::Quiet | fsm::State::ShortWait | fsm::State::LongWait,
            fsm::Event::DelayTimer,
        ) => {
            instance.state.spf_delay_timer = None;

            // Compute SPF.
            compute_spf(instance, arenas);

            // Remain in current state.
            None
        }
        _ => {
            return Err(Error::SpfFsmEventRejected(
                instance.state.spf_delay_state,
                event,
            ));
        }
    };

    if let Some(new_fsm_state) = new_fsm_state
        && new_fsm_state != instance.state.spf_delay_state
    {
        // Effectively transition to the new FSM state.
        Debug::SpfDelayFsmTransition(
            &instance.state.spf_delay_state,
            &new_fsm_state,
        )
        .log();
        instance.state.spf_delay_state = new_fsm_state;
    }

    Ok(())
}

// ===== helper functions =====

// This is the SPF main function.
fn compute_spf(instance: &mut InstanceUpView<'_>, arenas: &mut InstanceArenas) {
    // Calculate the area's shortest-path tree.
    run_area(
        &mut arenas.area,
        instance.state.router_id,
        &arenas.interfaces,
        &arenas.lsa_entries,
    );

    // Update routing table.
    route::update_rib(instance, arenas);

    // Update statistics.
    instance.state.spf_run_count += 1;
}

// Runs SPF in the provided area.
pub(crate) fn run_area(
    area: &mut Area,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
    lsa_entries: &Arena<LsaEntry>,
) {
    area.state.transit_capability = false;

    // Get root vertex.
    let root_vid = VertexId::Router { router_id };
    let root_vlsa = match vertex_lsa_find(root_vid, area, lsa_entries) {
        Some(vertex) => vertex,
        None => {
            Error::SpfRootMissing(area.area_id).log();
            return;
        }
    };
    let root_v = Vertex::new(root_vid, root_vlsa, 0, 0);

    // Initialize SPT and candidate list.
    let mut spt = BTreeMap::new();
    let mut cand_list = BTreeMap::new();
    cand_list.insert((root_v.distance, root_v.id), root_v);

    // Clear router's routing table.
    area.state.routers.clear();

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        // Add vertex to SPT.
        spt.insert(vertex.id, vertex);
        let vertex = spt.get(&vertex_id).unwrap();

        if let VertexLsa::Router(lsa) = &vertex.lsa {
            // Add "router" routing table entry.
            let lsa_body = lsa.body.as_router().unwrap();
            let route = RouteRtr::new(
                PathType::IntraArea,
                lsa_body.flags,
                vertex.distance.into(),
                vertex.nexthops.clone(),
            );
            area.state.routers.insert(lsa.hdr.adv_rtr, route);

            // Set TransitCapability.
            if lsa_body.flags.contains(LsaRouterFlags::V) {
                area.state.transit_capability = true;
            }
        }

        // Iterate over all links described by the vertex's LSA.
        for link in vertex_lsa_links(&vertex.lsa, area, lsa_entries) {
            // Check if the LSAs are mutually linked.
            if !vertex_lsa_links(&link.lsa, area, lsa_entries)
                .any(|link| link.id == vertex.id)
            {
                continue;
            }

            // Check if the link's vertex is already on the shortest-path
            // tree.
            if spt.contains_key(&link.id) {
                continue;
            }

            // Calculate distance to the link's vertex.
            let distance = vertex.distance.saturating_add(link.cost);

            // Increment number of hops to the root.
            let mut hops = vertex.hops;
            if link.lsa.is_router() {
                hops = hops.saturating_add(1);
            }

            // Check if this vertex is already present on the candidate list.
            if let Some((cand_key, cand_v)) = cand_list
                .iter_mut()
                .find(|(_, cand_v)| cand_v.id == link.id)
            {
                match distance.cmp(&cand_v.distance) {
                    Ordering::Less => {
                        // Remove vertex since its key has changed. It will be
                        // re-added with the correct key below.
                        let cand_key = *cand_key;
                        cand_list.remove(&cand_key);
                    }
                    Ordering::Equal => {}
                    Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }
            let cand_v =
                cand_list.entry((distance, link.id)).or_insert_with(|| {
                    Vertex::new(link.id, link.lsa, distance, hops)
                });

            // Update vertex's nexthops.
            match calc_nexthops(
                area,
                vertex,
                link.parent,
                link.id,
                &cand_v.lsa,
                interfaces,
            ) {
                Ok(nexthops) => cand_v.nexthops.extend(nexthops),
                Err(error) => error.log(),
            }
        }
    }

    // Update area's SPT.
    area.state.spt = spt;

    // Update statistics.
    area.state.spf_run_count += 1;
    area.state.discontinuity_time = Utc::now();
}

// Computes the set of nexthops that should be used to reach the given
// destination.
fn calc_nexthops(
    area: &Area,
    parent: &Vertex,
    parent_link: Option<&LsaRouterLink>,
    dest_id: VertexId,
    dest_lsa: &VertexLsa,
    interfaces: &Arena<Interface>,
) -> Result<Nexthops, Error> {
    let mut nexthops = Nexthops::new();

    // If there is at least one intervening router in the current shortest
    // path between the destination and the root, the destination simply
    // inherits the set of next hops from the parent.
    if parent.hops != 0 {
        return Ok(parent.nexthops.clone());
    }

    match &parent.lsa {
        // The parent vertex is the root.
        VertexLsa::Router(_parent_lsa) => {
            // The destination is either a directly connected network or
            // directly connected router. The outgoing interface in this case
            // is simply the OSPF interface connecting to the destination
            // network/router.
            let parent_link = parent_link.unwrap();

            // Get nexthop interface.
            let parent_link_addr = parent_link.link_data;
            let (iface_idx, iface) = area
                .interfaces
                .get_by_addr(interfaces, parent_link_addr)
                .ok_or(Error::NexthopUnresolved(dest_id))?;

            match dest_lsa {
                VertexLsa::Router(dest_lsa) => {
                    // Add nexthop(s).
                    nexthops.extend(
                        dest_lsa
                            .body
                            .as_router()
                            .unwrap()
                            .links
                            .iter()
                            .filter(|link| {
                                iface.system.contains_addr(&link.link_data)
                            })
                            .map(|link| {
                                let nexthop_addr = link.link_data;
                                let nbr_router_id = dest_lsa.hdr.adv_rtr;
                                (
                                    NexthopKey::new(
                                        iface_idx,
                                        Some(nexthop_addr),
                                    ),
                                    Nexthop::new(
                                        iface_idx,
                                        Some(nexthop_addr),
                                        Some(nbr_router_id),
                                    ),
                                )
                            }),
                    );
                    if nexthops.is_empty() {
                        return Err(Error::NexthopUnresolved(dest_id));
                    }
                }
                VertexLsa::Network(_lsa) => {
                    // Add nexthop.
                    nexthops.insert(
                        NexthopKey::new(iface_idx, None),
                        Nexthop::new(iface_idx, None, None),
                    );
                }
            }
        }
        // The parent vertex is a network that directly connects the
        // calculating router to the destination router.
        VertexLsa::Network(parent_lsa) => {
            // The list of next hops is then determined by examining the
            // destination's router-LSA. For each link in the router-LSA that
            // points back to the parent network, the link's Link Data field
            // provides the IP address of a next hop router.
            let lsa_body = parent_lsa.body.as_network().unwrap();
            let parent_network =
                Ipv4Network::with_netmask(parent_lsa.hdr.lsa_id, lsa_body.mask)
                    .unwrap();
            let dest_lsa = dest_lsa.as_router().unwrap();
            let dest_link = dest_lsa
                .body
                .as_router()
                .unwrap()
                .links
                .iter()
                .find(|link| parent_network.contains(link.link_data))
                .ok_or(Error::NexthopUnresolved(dest_id))?;

            // Inherit outgoing interface from the parent network.
            let iface_idx = parent
                .nexthops
                .values()
                .next()
                .ok_or(Error::NexthopUnresolved(dest_id))?
                .iface_idx;

            // Get nexthop address.
            let nbr_router_id = dest_lsa.hdr.adv_rtr;
            let nexthop_addr = dest_link.link_data;

            // Add nexthop.
            nexthops.insert(
                NexthopKey::new(iface_idx, Some(nexthop_addr)),
                Nexthop::new(
                    iface_idx,
                    Some(nexthop_addr),
                    Some(nbr_router_id),
                ),
            );
        }
    }

    Ok(nexthops)
}

// Finds the LSA that corresponds to the given SPF vertex.
fn vertex_lsa_find(
    id: VertexId,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> Option<VertexLsa> {
    match id {
        VertexId::Network { dr_addr } => {
            // SPF needs to find a Network-LSA knowing only its LS-ID but not
            // its advertising router.
            area.state
                .lsdb
                .iter_by_type(lsa_entries, LsaTypeCode::Network.into())
                .map(|(_, lse)| &lse.data)
                .find(|lsa| lsa.hdr.lsa_id == dr_addr)
                .filter(|lsa| !lsa.hdr.is_maxage())
                .map(|lsa| VertexLsa::Network(lsa.clone()))
        }
        VertexId::Router { router_id } => {
            let lsa_key = LsaKey::new(
                LsaTypeCode::Router.into(),
                router_id,
                router_id,
            );
            area.state
                .lsdb
                .get(lsa_entries, &lsa_key)
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .map(|(_, lse)| VertexLsa::Router(lse.data.clone()))
        }
    }
}

// Returns an iterator over all links of the provided SPF vertex.
fn vertex_lsa_links<'a>(
    vertex_lsa: &'a VertexLsa,
    area: &'a Area,
    lsa_entries: &'a Arena<LsaEntry>,
) -> Box<dyn Iterator<Item = SpfLink<'a>> + 'a> {
    match vertex_lsa {
        VertexLsa::Network(lsa) => {
            let lsa_body = lsa.body.as_network().unwrap();
            let iter =
                lsa_body
                    .attached_rtrs
                    .iter()
                    .filter_map(move |router_id| {
                        let link_vid = VertexId::Router {
                            router_id: *router_id,
                        };
                        vertex_lsa_find(link_vid, area, lsa_entries).map(
                            |link_vlsa| {
                                SpfLink::new(None, link_vid, link_vlsa, 0)
                            },
                        )
                    });
            Box::new(iter)
        }
        VertexLsa::Router(lsa) => {
            let lsa_body = lsa.body.as_router().unwrap();
            let iter = lsa_body
                .links
                .iter()
                .filter_map(|link| match link.link_type {
                    LsaRouterLinkType::PointToPoint => {
                        let link_vid = VertexId::Router {
                            router_id: link.link_id,
                        };
                        Some((link, link_vid, link.metric))
                    }
                    LsaRouterLinkType::TransitNetwork => {
                        let link_vid = VertexId::Network {
                            dr_addr: link.link_id,
                        };
                        Some((link, link_vid, link.metric))
                    }
                    LsaRouterLinkType::StubNetwork => None,
                    LsaRouterLinkType::VirtualLink => {
                        // Virtual links aren't supported.
                        None
                    }
                })
                .filter_map(move |(link, link_vid, cost)| {
                    vertex_lsa_find(link_vid, area, lsa_entries).map(
                        |link_vlsa| {
                            SpfLink::new(Some(link), link_vid, link_vlsa, cost)
                        },
                    )
                });
            Box::new(iter)
        }
    }
}

// Returns an iterator over all intra-area networks (stub links plus transit
// networks) reachable through the shortest-path tree.
pub(crate) fn intra_area_networks(
    area: &Area,
) -> impl Iterator<Item = SpfIntraAreaNetwork<'_>> + '_ {
    let mut stubs = vec![];

    for vertex in area.state.spt.values() {
        match &vertex.lsa {
            VertexLsa::Network(lsa) => {
                let lsa_body = lsa.body.as_network().unwrap();
                let prefix =
                    Ipv4Network::with_netmask(lsa.hdr.lsa_id, lsa_body.mask)
                        .unwrap();
                let prefix = prefix.apply_mask();

                stubs.push(SpfIntraAreaNetwork {
                    vertex,
                    prefix,
                    metric: 0,
                });
            }
            VertexLsa::Router(lsa) => {
                let lsa_body = lsa.body.as_router().unwrap();
                stubs.extend(
                    lsa_body
                        .links
                        .iter()
                        .filter(|link| {
                            link.link_type == LsaRouterLinkType::StubNetwork
                        })
                        .map(|link| {
                            let prefix = Ipv4Network::with_netmask(
                                link.link_id,
                                link.link_data,
                            )
                            .unwrap();
                            let prefix = prefix.apply_mask();

                            SpfIntraAreaNetwork {
                                vertex,
                                prefix,
                                metric: link.metric,
                            }
                        }),
                )
            }
        }
    }

    stubs.into_iter()
}

// Returns an iterator over all AS external networks.
pub(crate) fn external_networks<'a>(
    lsdb: &'a Lsdb,
    lsa_entries: &'a Arena<LsaEntry>,
) -> impl Iterator<Item = SpfExternalNetwork> + 'a {
    lsdb.iter_by_type(lsa_entries, LsaTypeCode::AsExternal.into())
        .map(|(_, lse)| &lse.data)
        .filter(|lsa| !lsa.hdr.is_maxage())
        .map(|lsa| {
            let lsa_body = lsa.body.as_as_external().unwrap();
            let prefix =
                Ipv4Network::with_netmask(lsa.hdr.lsa_id, lsa_body.mask)
                    .unwrap();

            SpfExternalNetwork {
                adv_rtr: lsa.hdr.adv_rtr,
                e_bit: lsa_body.flags.contains(LsaAsExternalFlags::E),
                prefix,
                metric: lsa_body.metric,
                fwd_addr: lsa_body.fwd_addr,
                tag: Some(lsa_body.tag),
            }
        })
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::packet::Options;
    use crate::packet::lsa::{
        LsaBody, LsaNetwork, LsaRouter, LsaRouterFlags,
    };

    // Installs an LSA directly into the area LSDB, bypassing the regular
    // origination machinery. The LSA entry carries no expiry timer.
    fn lsdb_insert(
        area: &mut Area,
        lsa_entries: &mut Arena<LsaEntry>,
        lsa: Lsa,
    ) {
        static NEXT_ID: std::sync::atomic::AtomicU32 =
            std::sync::atomic::AtomicU32::new(1);
        let id =
            NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        area.state
            .lsdb
            .insert_for_test(lsa_entries, id, Arc::new(lsa));
    }

    fn router_lsa(
        router_id: [u8; 4],
        links: Vec<LsaRouterLink>,
    ) -> Lsa {
        Lsa::new(
            0,
            Options::E,
            router_id.into(),
            router_id.into(),
            crate::lsdb::LSA_INIT_SEQ_NO,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::empty(),
                links,
            }),
        )
    }

    fn network_lsa(
        dr_addr: [u8; 4],
        adv_rtr: [u8; 4],
        mask: [u8; 4],
        attached: &[[u8; 4]],
    ) -> Lsa {
        Lsa::new(
            0,
            Options::E,
            dr_addr.into(),
            adv_rtr.into(),
            crate::lsdb::LSA_INIT_SEQ_NO,
            LsaBody::Network(LsaNetwork {
                mask: mask.into(),
                attached_rtrs: attached
                    .iter()
                    .map(|rtr| Ipv4Addr::from(*rtr))
                    .collect::<BTreeSet<_>>(),
            }),
        )
    }

    fn link(
        link_type: LsaRouterLinkType,
        link_id: [u8; 4],
        link_data: [u8; 4],
        metric: u16,
    ) -> LsaRouterLink {
        LsaRouterLink::new(
            link_type,
            link_id.into(),
            link_data.into(),
            metric,
        )
    }

    // Topology: R1 and R2 share the transit LAN 10.0.0.0/24 (DR is R2), and
    // R2 connects to R3 over a point-to-point link of cost 5. R3 advertises
    // the stub network 192.168.3.0/24.
    fn build_lsdb(area: &mut Area, lsa_entries: &mut Arena<LsaEntry>) {
        let r1 = router_lsa(
            [1, 1, 1, 1],
            vec![link(
                LsaRouterLinkType::TransitNetwork,
                [10, 0, 0, 2],
                [10, 0, 0, 1],
                1,
            )],
        );
        let r2 = router_lsa(
            [2, 2, 2, 2],
            vec![
                link(
                    LsaRouterLinkType::TransitNetwork,
                    [10, 0, 0, 2],
                    [10, 0, 0, 2],
                    1,
                ),
                link(
                    LsaRouterLinkType::PointToPoint,
                    [3, 3, 3, 3],
                    [10, 1, 0, 2],
                    5,
                ),
                link(
                    LsaRouterLinkType::StubNetwork,
                    [10, 1, 0, 0],
                    [255, 255, 255, 0],
                    5,
                ),
            ],
        );
        let r3 = router_lsa(
            [3, 3, 3, 3],
            vec![
                link(
                    LsaRouterLinkType::PointToPoint,
                    [2, 2, 2, 2],
                    [10, 1, 0, 3],
                    5,
                ),
                link(
                    LsaRouterLinkType::StubNetwork,
                    [192, 168, 3, 0],
                    [255, 255, 255, 0],
                    1,
                ),
            ],
        );
        let net = network_lsa(
            [10, 0, 0, 2],
            [2, 2, 2, 2],
            [255, 255, 255, 0],
            &[[1, 1, 1, 1], [2, 2, 2, 2]],
        );

        for lsa in [r1, r2, r3, net] {
            lsdb_insert(area, lsa_entries, lsa);
        }
    }

    #[test]
    fn spf_transit_lan() {
        let mut area = Area::new(Ipv4Addr::UNSPECIFIED);
        let mut lsa_entries = Arena::default();
        let interfaces = Arena::default();
        build_lsdb(&mut area, &mut lsa_entries);

        run_area(
            &mut area,
            Ipv4Addr::new(1, 1, 1, 1),
            &interfaces,
            &lsa_entries,
        );

        // All three routers and the transit network are reachable.
        assert_eq!(area.state.spt.len(), 4);
        let dist = |id: VertexId| area.state.spt.get(&id).unwrap().distance;
        assert_eq!(
            dist(VertexId::Network {
                dr_addr: [10, 0, 0, 2].into()
            }),
            1
        );
        assert_eq!(
            dist(VertexId::Router {
                router_id: [2, 2, 2, 2].into()
            }),
            1
        );
        assert_eq!(
            dist(VertexId::Router {
                router_id: [3, 3, 3, 3].into()
            }),
            6
        );

        // Stub networks inherit the advertising vertex's distance.
        let stubs = intra_area_networks(&area)
            .map(|stub| {
                let metric =
                    stub.vertex.distance.saturating_add(stub.metric);
                (stub.prefix, metric)
            })
            .collect::<BTreeMap<_, _>>();
        assert_eq!(
            stubs.get(&"10.0.0.0/24".parse().unwrap()).copied(),
            Some(1)
        );
        assert_eq!(
            stubs.get(&"192.168.3.0/24".parse().unwrap()).copied(),
            Some(7)
        );
    }

    #[test]
    fn spf_idempotence() {
        let mut area = Area::new(Ipv4Addr::UNSPECIFIED);
        let mut lsa_entries = Arena::default();
        let interfaces = Arena::default();
        build_lsdb(&mut area, &mut lsa_entries);

        run_area(
            &mut area,
            Ipv4Addr::new(1, 1, 1, 1),
            &interfaces,
            &lsa_entries,
        );
        let first = area
            .state
            .spt
            .iter()
            .map(|(id, vertex)| (*id, vertex.distance))
            .collect::<BTreeMap<_, _>>();

        // Running SPF again over the same LSDB produces the same tree.
        run_area(
            &mut area,
            Ipv4Addr::new(1, 1, 1, 1),
            &interfaces,
            &lsa_entries,
        );
        let second = area
            .state
            .spt
            .iter()
            .map(|(id, vertex)| (*id, vertex.distance))
            .collect::<BTreeMap<_, _>>();

        assert_eq!(first, second);
    }

    #[test]
    fn spf_unidirectional_link_ignored() {
        let mut area = Area::new(Ipv4Addr::UNSPECIFIED);
        let mut lsa_entries = Arena::default();
        let interfaces = Arena::default();

        // R2 points to R3, but R3 doesn't point back.
        let r1 = router_lsa(
            [1, 1, 1, 1],
            vec![link(
                LsaRouterLinkType::PointToPoint,
                [2, 2, 2, 2],
                [10, 1, 0, 1],
                1,
            )],
        );
        let r2 = router_lsa(
            [2, 2, 2, 2],
            vec![
                link(
                    LsaRouterLinkType::PointToPoint,
                    [1, 1, 1, 1],
                    [10, 1, 0, 2],
                    1,
                ),
                link(
                    LsaRouterLinkType::PointToPoint,
                    [3, 3, 3, 3],
                    [10, 2, 0, 2],
                    1,
                ),
            ],
        );
        let r3 = router_lsa([3, 3, 3, 3], vec![]);
        for lsa in [r1, r2, r3] {
            lsdb_insert(&mut area, &mut lsa_entries, lsa);
        }

        run_area(
            &mut area,
            Ipv4Addr::new(1, 1, 1, 1),
            &interfaces,
            &lsa_entries,
        );

        assert!(area.state.spt.contains_key(&VertexId::Router {
            router_id: [2, 2, 2, 2].into()
        }));
        assert!(!area.state.spt.contains_key(&VertexId::Router {
            router_id: [3, 3, 3, 3].into()
        }));
    }
}
