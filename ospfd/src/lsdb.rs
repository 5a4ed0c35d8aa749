use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;

use bitflags::bitflags;
use ospfd_utils::UnboundedSender;
use ospfd_utils::ip::Ipv4NetworkExt;
use ospfd_utils::task::TimeoutTask;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{
    Arena, InterfaceId, LsaEntryId, LsaEntryIndex, Lsdb, LsdbId,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, InterfaceType, ism};
use crate::neighbor::nsm;
use crate::packet::Options;
use crate::packet::lsa::{
    Lsa, LsaBody, LsaHdr, LsaKey, LsaNetwork, LsaRouter, LsaRouterFlags,
    LsaRouterLink, LsaRouterLinkType, LsaType, LsaTypeCode,
};
use crate::spf;
use crate::tasks;
use crate::tasks::messages::input::LsaFlushMsg;

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSA data.
    pub data: Arc<Lsa>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub expiry_timer: Option<TimeoutTask>,
    // Refresh interval that triggers every LSA_REFRESH_TIME seconds.
    pub refresh_timer: Option<TimeoutTask>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub enum LsaOriginateEvent {
    InstanceStart,
    InterfaceStateChange { iface_id: InterfaceId },
    InterfaceDrChange { iface_id: InterfaceId },
    InterfaceCostChange,
    NeighborToFromFull { iface_id: InterfaceId },
    SelfOriginatedLsaRcvd { lsdb_id: LsdbId, lse_id: LsaEntryId },
}

// LSA whose origination was postponed by the MinLSInterval check.
#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(
        lsdb_id: LsdbId,
        id: LsaEntryId,
        data: Arc<Lsa>,
        lsa_flushp: &UnboundedSender<LsaFlushMsg>,
    ) -> LsaEntry {
        let expiry_timer = (!data.hdr.is_maxage())
            .then_some(tasks::lsa_expiry_timer(lsdb_id, id, &data, lsa_flushp));

        LsaEntry {
            id,
            data,
            expiry_timer,
            refresh_timer: None,
            flags: Default::default(),
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub(crate) fn lsa_compare(a: &LsaHdr, b: &LsaHdr) -> Ordering {
    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age.abs_diff(b.age) > LSA_MAX_AGE_DIFF {
        return b.age.cmp(&a.age);
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of RFC
// 2328. Its purpose is to determine if the contents of the LSAs are
// identical.
fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks whether the given LSA type can be accepted from the given neighbor.
pub(crate) fn lsa_type_is_valid(
    _nbr_options: Option<Options>,
    lsa_type: LsaType,
) -> bool {
    // Reject LSAs of unknown type.
    lsa_type.type_code().is_some()
}

// Checks whether the LSA is self-originated.
pub(crate) fn lsa_is_self_originated(
    lsa: &Lsa,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
) -> bool {
    // 1) The LSA's Advertising Router is equal to the router's own Router ID.
    if lsa.hdr.adv_rtr == router_id {
        return true;
    }

    // 2) The LSA is a network-LSA and its Link State ID is equal to one of
    // the router's own IP interface addresses.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && interfaces
            .iter()
            .filter_map(|(_, iface)| iface.system.primary_addr)
            .any(|iface_primary_addr| lsa.hdr.lsa_id == iface_primary_addr.ip())
    {
        return true;
    }

    false
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(lsa_base_time) => {
            lsa_base_time.elapsed().as_secs() < LSA_MIN_ARRIVAL
        }
        None => false,
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(lsa_base_time) => {
            lsa_base_time.elapsed().as_secs() < LSA_MIN_INTERVAL
        }
        None => false,
    }
}

// Returns a reference to the LSDB identified by `lsdb_id`.
pub(crate) fn lsdb_get<'a>(
    instance_lsdb: &'a Lsdb,
    area: &'a Area,
    lsdb_id: LsdbId,
) -> &'a Lsdb {
    match lsdb_id {
        LsdbId::Area => &area.state.lsdb,
        LsdbId::As => instance_lsdb,
    }
}

// Returns a mutable reference to the LSDB identified by `lsdb_id`.
pub(crate) fn lsdb_get_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    area: &'a mut Area,
    lsdb_id: LsdbId,
) -> &'a mut Lsdb {
    match lsdb_id {
        LsdbId::Area => &mut area.state.lsdb,
        LsdbId::As => instance_lsdb,
    }
}

// Installs the provided LSA to the specified LSDB.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, &lsa);

    // Lookup LSDB.
    let lsdb =
        lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);

    // Remove old instance of the LSA.
    let old_lsa = match lsdb.get(&arenas.lsa_entries, &lsa.hdr.key()) {
        Some((old_lse_idx, old_lse)) => {
            let old_lsa = old_lse.data.clone();
            lsdb.delete(&mut arenas.lsa_entries, old_lse_idx);
            Some(old_lsa)
        }
        None => None,
    };

    // Add LSA entry to LSDB.
    let (lse_idx, lse) = lsdb.insert(
        &mut arenas.lsa_entries,
        lsdb_id,
        lsa.clone(),
        &instance.tx.protocol_input,
    );

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(
        &lse.data,
        instance.state.router_id,
        &arenas.interfaces,
    ) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // Keep track of self-originated Network-LSAs in the corresponding
    // interface structures. This is necessary to allow flushing those LSAs
    // later, since the interface address might change.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && lsa.hdr.adv_rtr == instance.state.router_id
        && let Some((_, iface)) = arenas
            .area
            .interfaces
            .get_mut_by_addr(&mut arenas.interfaces, lsa.hdr.lsa_id)
    {
        if lsa.hdr.is_maxage() {
            iface.state.network_lsa_self = None;
        } else {
            iface.state.network_lsa_self = Some(lsa.hdr.key());
        }
    }

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance, if
    // present. If there is no difference, there is no need to recalculate the
    // routing table".
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa
        && lsa_same_contents(old_lsa, &lsa)
    {
        content_change = false;
    }
    let route_recalc = content_change && !lsa.body.is_unknown();

    // Schedule SPF run if necessary.
    if route_recalc {
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::Igp);
    }

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa: Lsa,
) {
    let lsdb =
        lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. This is done by
    // prematurely aging the LSA and reflooding it. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
        && lsa.hdr.seq_no == LSA_MAX_SEQ_NO + 1
    {
        // Record LSA that will be originated later and then flush the
        // existing instance.
        match lsdb.seqno_wrapping.entry(lsa_key) {
            hash_map::Entry::Occupied(mut o) => {
                *o.get_mut() = lsa;
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(lsa);
            }
        }
        let reason = LsaFlushReason::PrematureAging;
        flush(instance, arenas, lsdb_id, old_lse_idx, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    let lse_idx = install(instance, arenas, lsdb_id, Arc::new(lsa));

    let lse = &mut arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.area,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        &lse.data,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;

    // Schedule LSA refreshing.
    let refresh_timer = tasks::lsa_refresh_timer(
        lsdb_id,
        lse.id,
        &instance.tx.protocol_input.lsa_refresh,
    );
    lse.refresh_timer = Some(refresh_timer);
}

// Attempts to originate the provided LSA, but only if it passes a few checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);
    let lsdb =
        lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);

    // Get next sequence number.
    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no + 1)
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // If an LSA with identical contents already exists in the LSDB, skip
        // originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    let ldo = o.get_mut();
                    ldo.data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let timeout = tasks::lsa_orig_delayed_timer(
                        lsdb_id,
                        lsa_key,
                        old_lse.data.base_time,
                        &instance.tx.protocol_input.lsa_orig_delayed_timer,
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_id, lsa);
}

// Flushes LSA from the LSDB.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Disarm timers.
    lse.expiry_timer = None;
    lse.refresh_timer = None;

    // Set the LSA age to MaxAge.
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route calculations.
    let lse_idx = install(instance, arenas, lsdb_id, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    let _ = flood(
        instance,
        &arenas.area,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        &lse.data,
        None,
    );

    // Remove pending LSA origination, if any.
    let lsa_key = lse.data.hdr.key();
    let lsdb =
        lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);
    lsdb.delayed_orig.remove(&lsa_key);
}

// Flushes all self-originated LSAs from the LSDB.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    // AS-scope LSAs.
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (LsdbId::As, lse_idx)),
    );

    // Area-scope LSAs.
    idxs.extend(
        arenas
            .area
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (LsdbId::Area, lse_idx)),
    );

    // Flush LSAs.
    for (lsdb_id, lse_idx) in idxs {
        flush(instance, arenas, lsdb_id, lse_idx, reason);
    }
}

// Removes old instance of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(arenas: &mut InstanceArenas, lsa: &Lsa) {
    for iface_idx in arenas.area.interfaces.indexes() {
        let iface = &arenas.interfaces[iface_idx];

        // Iterate over all neighbors from this interface.
        for nbr_idx in iface.state.neighbors.indexes() {
            let nbr = &mut arenas.neighbors[nbr_idx];

            // Remove LSA from rxmt list as long as it's an older version.
            if let btree_map::Entry::Occupied(o) =
                nbr.lists.ls_rxmt.entry(lsa.hdr.key())
            {
                let old_lsa = o.get();
                // Compare using the retransmission copy's current age.
                let old_hdr = LsaHdr {
                    age: old_lsa.age(),
                    ..old_lsa.hdr
                };
                if lsa_compare(&old_hdr, &lsa.hdr) == Ordering::Less {
                    o.remove();
                    nbr.rxmt_lsupd_stop_check();
                }
            }
        }
    }
}

// ===== LSA origination =====

// Originates or flushes the required LSAs in response to an LSA origination
// event.
pub(crate) fn lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::InstanceStart
        | LsaOriginateEvent::InterfaceStateChange { .. }
        | LsaOriginateEvent::InterfaceCostChange => {
            // (Re)originate Router-LSA.
            lsa_orig_router(instance, arenas);
        }
        LsaOriginateEvent::InterfaceDrChange { iface_id }
        | LsaOriginateEvent::NeighborToFromFull { iface_id } => {
            // (Re)originate Router-LSA.
            lsa_orig_router(instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (iface_idx, iface) =
                arenas.area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(instance, arenas, iface_idx);
            } else {
                lsa_flush_network(instance, arenas, iface_idx);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            // Check if the received self-originated LSA needs to be
            // reoriginated or flushed.
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
    };

    Ok(())
}

// Assembles and (re)originates the local Router-LSA by scanning all
// operational interfaces.
pub(crate) fn lsa_orig_router(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let options = arenas.area.options();

    // Router-LSA's links.
    let mut links = vec![];
    for iface in arenas
        .area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
    {
        let primary_addr = iface.system.primary_addr.unwrap();

        // Add Type-3 (stub) links to interfaces in Loopback state.
        if iface.state.ism_state == ism::State::Loopback {
            links.extend(iface.system.addr_list.iter().map(|addr| {
                LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    addr.ip(),
                    Ipv4Addr::BROADCAST,
                    0,
                )
            }));
            continue;
        }

        let mut add_stub_links = false;
        match iface.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => {
                // Add a Type-1 link (p2p) for each fully adjacent neighbor.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        nbr.router_id,
                        primary_addr.ip(),
                        iface.config.cost,
                    );
                    links.push(link);
                }

                // Add Type-3 (stub) links.
                add_stub_links = true;
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if iface.state.ism_state == ism::State::Waiting {
                    // Add Type-3 (stub) links.
                    add_stub_links = true;
                } else if (iface.state.ism_state == ism::State::Dr
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full))
                    || iface
                        .state
                        .dr
                        .and_then(|net_id| {
                            iface
                                .state
                                .neighbors
                                .get_by_net_id(&arenas.neighbors, net_id)
                                .filter(|(_, nbr)| {
                                    nbr.state == nsm::State::Full
                                })
                        })
                        .is_some()
                {
                    // Add a Type-2 (transit) link.
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::TransitNetwork,
                        iface.state.dr.unwrap().get(),
                        primary_addr.ip(),
                        iface.config.cost,
                    );
                    links.push(link);
                } else {
                    // Add Type-3 (stub) links.
                    add_stub_links = true;
                }
            }
        }

        if add_stub_links {
            links.extend(
                iface
                    .system
                    .addr_list
                    .iter()
                    .map(|addr| addr.apply_mask())
                    .map(|addr| {
                        LsaRouterLink::new(
                            LsaRouterLinkType::StubNetwork,
                            addr.ip(),
                            addr.mask(),
                            iface.config.cost,
                        )
                    }),
            );
        }
    }

    // (Re)originate Router-LSA.
    let lsa_body = LsaBody::Router(LsaRouter {
        flags: LsaRouterFlags::empty(),
        links,
    });
    instance.tx.protocol_input.lsa_orig_check(
        LsdbId::Area,
        options,
        instance.state.router_id,
        lsa_body,
    );
}

// (Re)originates the Network-LSA for the given interface. This router must
// be the Designated Router for the interface's network.
fn lsa_orig_network(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    iface_idx: crate::collections::InterfaceIndex,
) {
    let iface = &arenas.interfaces[iface_idx];
    let options = arenas.area.options();

    // The Link State ID for a network-LSA is the IP interface address of the
    // Designated Router.
    let lsa_id = iface.system.primary_addr.unwrap().ip();

    // Network-LSA's mask.
    let mask = iface.system.primary_addr.unwrap().mask();

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    // (Re)originate Network-LSA.
    let lsa_body = LsaBody::Network(LsaNetwork {
        mask,
        attached_rtrs,
    });
    instance.tx.protocol_input.lsa_orig_check(
        LsdbId::Area,
        options,
        lsa_id,
        lsa_body,
    );
}

// Flushes the self-originated Network-LSA of the given interface, if any.
fn lsa_flush_network(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    iface_idx: crate::collections::InterfaceIndex,
) {
    let iface = &arenas.interfaces[iface_idx];
    if let Some(lsa_key) = &iface.state.network_lsa_self
        && let Some((_, lse)) =
            arenas.area.state.lsdb.get(&arenas.lsa_entries, lsa_key)
    {
        instance.tx.protocol_input.lsa_flush(
            LsdbId::Area,
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

// Examines a received self-originated LSA, reoriginating it with a higher
// sequence number or flushing it from the routing domain (RFC 2328 section
// 13.4).
fn process_self_originated_lsa(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let lsdb = lsdb_get(&instance.state.lsdb, &arenas.area, lsdb_id);
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    let lsa = &lse.data;

    // Check LSA type.
    match lsa.hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            // Reoriginate Router-LSA.
            lsa_orig_router(instance, arenas);
        }
        Some(LsaTypeCode::Network) => {
            // Check if the router is still the DR for the network.
            if let Some(iface_idx) = arenas
                .area
                .interfaces
                .indexes()
                .find(|iface_idx| {
                    let iface = &arenas.interfaces[*iface_idx];
                    iface
                        .system
                        .primary_addr
                        .is_some_and(|addr| addr.ip() == lsa.hdr.lsa_id)
                        && iface.state.ism_state == ism::State::Dr
                })
                // Ensure the Router-ID hasn't changed.
                .filter(|_| lsa.hdr.adv_rtr == instance.state.router_id)
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(instance, arenas, iface_idx);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        _ => {
            // Flush LSAs whose origination isn't supported (local route
            // redistribution and inter-area summarization are not
            // implemented).
            flush = true;
        }
    }

    if flush {
        // Effectively flush the received self-originated LSA.
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            lse_id,
            LsaFlushReason::PrematureAging,
        );
    }

    Ok(())
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;
    use crate::packet::lsa::{LsaHdr, LsaType, LsaTypeCode};

    fn hdr(age: u16, seq_no: u32, cksum: u16) -> LsaHdr {
        LsaHdr {
            age,
            options: Options::E,
            lsa_type: LsaType(LsaTypeCode::Router as u8),
            lsa_id: [1, 1, 1, 1].into(),
            adv_rtr: [1, 1, 1, 1].into(),
            seq_no,
            cksum,
            length: 24,
        }
    }

    #[test]
    fn lsa_compare_seq_no() {
        // Higher sequence number wins, using signed comparison so the initial
        // sequence number (0x80000001) is the oldest possible.
        let a = hdr(0, LSA_INIT_SEQ_NO + 1, 0x1000);
        let b = hdr(0, LSA_INIT_SEQ_NO, 0x2000);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);

        let a = hdr(0, LSA_MAX_SEQ_NO, 0);
        let b = hdr(0, LSA_INIT_SEQ_NO, 0);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn lsa_compare_cksum() {
        // Equal sequence numbers fall back to the checksum.
        let a = hdr(0, LSA_INIT_SEQ_NO, 0x2000);
        let b = hdr(0, LSA_INIT_SEQ_NO, 0x1000);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn lsa_compare_age() {
        // MaxAge wins over non-MaxAge.
        let a = hdr(LSA_MAX_AGE, LSA_INIT_SEQ_NO, 0x1000);
        let b = hdr(100, LSA_INIT_SEQ_NO, 0x1000);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);

        // Ages closer than MaxAgeDiff are considered identical.
        let a = hdr(100, LSA_INIT_SEQ_NO, 0x1000);
        let b = hdr(200, LSA_INIT_SEQ_NO, 0x1000);
        assert_eq!(lsa_compare(&a, &b), Ordering::Equal);

        // Otherwise the smaller age is more recent.
        let a = hdr(100, LSA_INIT_SEQ_NO, 0x1000);
        let b = hdr(100 + LSA_MAX_AGE_DIFF + 1, LSA_INIT_SEQ_NO, 0x1000);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }
}
