use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{
    Arena, InterfaceIndex, InterfaceKey, LsaEntryKey, LsdbId, NeighborIndex,
    NeighborKey,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{CfgMismatch, Error};
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{
    self, LsaEntry, LsaEntryFlags, LsaOriginateEvent, lsa_compare,
};
use crate::neighbor::{LastDbDesc, Neighbor, RxmtPacketType, nsm};
use crate::output;
use crate::packet::error::DecodeResult;
use crate::packet::lsa::{Lsa, LsaBody, LsaHdr, LsaKey, LsaScope};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketType,
};
use crate::spf;
use crate::tasks;

// ===== Interface FSM event =====

pub(crate) fn process_ism_event(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    event: ism::Event,
) -> Result<(), Error> {
    // Lookup interface.
    let (_iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Invoke FSM event.
    iface.fsm(
        &arenas.area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    event: nsm::Event,
) -> Result<(), Error> {
    // Lookup interface and neighbor.
    let (_, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Invoke FSM event.
    nbr.fsm(iface, &arenas.area, instance, &arenas.lsa_entries, event);
    if nbr.state == nsm::State::Down {
        // Effectively delete the neighbor.
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);

        // Synchronize interface's Hello Tx task (updated list of neighbors).
        iface.sync_hello_tx(&arenas.area, instance);
    }

    Ok(())
}

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    packet: DecodeResult<Packet>,
) -> Result<(), Error> {
    // Lookup interface.
    let (iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Check if the packet was decoded successfully.
    let packet = match packet {
        Ok(packet) => packet,
        Err(error) => {
            instance.state.rx_error_count += 1;
            return Err(Error::PacketDecode(error));
        }
    };

    // Ignore packets received on inoperational or passive interfaces.
    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    // Validate IP destination address.
    iface.validate_packet_dst(dst)?;

    // Validate IP source address.
    iface.validate_packet_src(src)?;

    // The source router is not allowed to be this router itself.
    let router_id = packet.hdr().router_id;
    let pkt_type = packet.hdr().pkt_type;
    if router_id == instance.state.router_id {
        return Err(Error::PacketMismatch {
            ifname: iface.name.clone(),
            src,
            pkt_type,
            mismatch: CfgMismatch::RouterIdCollision(router_id),
        });
    }

    // Check for Area ID mismatch.
    if packet.hdr().area_id != arenas.area.area_id {
        return Err(Error::PacketMismatch {
            ifname: iface.name.clone(),
            src,
            pkt_type,
            mismatch: CfgMismatch::AreaId(
                packet.hdr().area_id,
                arenas.area.area_id,
            ),
        });
    }

    // Log received packet.
    Debug::PacketRx(&iface.name, &src, &dst, &packet).log();

    if let Packet::Hello(pkt) = packet {
        process_packet_hello(
            iface,
            &arenas.area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
            src,
            pkt,
        )
    } else {
        // Non-Hello packets not matching any active neighbor are discarded.
        let (nbr_idx, nbr) = iface
            .get_neighbor(&src, router_id, &mut arenas.neighbors)
            .ok_or(Error::UnknownNeighbor(src, router_id))?;

        match packet {
            Packet::Hello(_) => unreachable!(),
            Packet::DbDesc(pkt) => process_packet_dbdesc(
                nbr,
                iface,
                &arenas.area,
                instance,
                &arenas.lsa_entries,
                src,
                pkt,
            ),
            Packet::LsRequest(pkt) => process_packet_lsreq(
                nbr,
                iface,
                &arenas.area,
                instance,
                &arenas.lsa_entries,
                pkt,
            ),
            Packet::LsUpdate(pkt) => process_packet_lsupd(
                nbr_idx, iface_idx, instance, arenas, src, pkt,
            ),
            Packet::LsAck(pkt) => process_packet_lsack(nbr, pkt),
        }
    }
}

fn process_packet_hello(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
    src: Ipv4Addr,
    hello: Hello,
) -> Result<(), Error> {
    let protocol_input = &instance.tx.protocol_input;

    // Perform all the required sanity checks.
    process_packet_hello_sanity_checks(iface, area, &hello).map_err(
        |mismatch| Error::PacketMismatch {
            ifname: iface.name.clone(),
            src,
            pkt_type: PacketType::Hello,
            mismatch,
        },
    )?;

    // Find or create new neighbor.
    let router_id = hello.hdr.router_id;
    let (_, nbr) = match iface.get_neighbor(&src, router_id, neighbors) {
        Some(value) => value,
        None => {
            // Create new neighbor.
            let (nbr_idx, nbr) =
                iface.state.neighbors.insert(neighbors, router_id, src);

            // Initialize neighbor values.
            nbr.priority = hello.priority;
            if iface.is_broadcast_or_nbma() {
                nbr.dr = hello.dr;
                nbr.bdr = hello.bdr;
            }

            // Synchronize interface's Hello Tx task (updated list of
            // neighbors).
            iface.sync_hello_tx(area, instance);

            (nbr_idx, nbr)
        }
    };

    // Update neighbor's source address.
    //
    // This can only happen for point-to-point interfaces (for the other
    // interface types, an address change would prompt the creation of a
    // different neighbor entity).
    nbr.src = src;

    // Trigger the HelloReceived event.
    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::HelloRcvd);

    // Trigger the 1-WayReceived or the 2-WayReceived event.
    if hello
        .neighbors
        .iter()
        .any(|id| *id == instance.state.router_id)
    {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);
    } else {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::OneWayRcvd);

        // Update neighbor values.
        if iface.is_broadcast_or_nbma() {
            nbr.priority = hello.priority;
            nbr.dr = hello.dr;
            nbr.bdr = hello.bdr;
        }

        return Ok(());
    }

    // Examine rest of the Hello Packet (ignore Point-to-MultiPoint interfaces
    // as per errata 4022 of RFC 2328).
    if iface.is_broadcast_or_nbma() {
        // Check for Router Priority change.
        if hello.priority != nbr.priority {
            nbr.priority = hello.priority;
            protocol_input.ism_event(iface.id, ism::Event::NbrChange);
        }

        // Check for DR/BDR changes.
        let nbr_net_id = nbr.network_id();
        if iface.state.ism_state == ism::State::Waiting
            && ((hello.dr == Some(nbr_net_id) && hello.bdr.is_none())
                || hello.bdr == Some(nbr_net_id))
        {
            protocol_input.ism_event(iface.id, ism::Event::BackupSeen);
        }
        if (hello.dr == Some(nbr_net_id) && nbr.dr != Some(nbr_net_id))
            || (hello.dr != Some(nbr_net_id) && nbr.dr == Some(nbr_net_id))
            || (hello.bdr == Some(nbr_net_id) && nbr.bdr != Some(nbr_net_id))
            || (hello.bdr != Some(nbr_net_id) && nbr.bdr == Some(nbr_net_id))
        {
            protocol_input.ism_event(iface.id, ism::Event::NbrChange);
        }

        // Update neighbor's DR/BDR.
        nbr.dr = hello.dr;
        nbr.bdr = hello.bdr;
    }

    Ok(())
}

fn process_packet_hello_sanity_checks(
    iface: &Interface,
    area: &Area,
    hello: &Hello,
) -> Result<(), CfgMismatch> {
    // Validate the Hello network mask.
    iface.validate_hello(hello)?;

    // Check for HelloInterval mismatch.
    if hello.hello_interval != iface.config.hello_interval {
        return Err(CfgMismatch::HelloInterval(
            hello.hello_interval,
            iface.config.hello_interval,
        ));
    }

    // Check for RouterDeadInterval mismatch.
    if hello.dead_interval != iface.config.dead_interval as u32 {
        return Err(CfgMismatch::DeadInterval(
            hello.dead_interval,
            iface.config.dead_interval as u32,
        ));
    }

    // Check for ExternalRoutingCapability mismatch.
    if hello.options.contains(Options::E) != area.options().contains(Options::E)
    {
        return Err(CfgMismatch::ExternalBit(
            hello.options.contains(Options::E),
        ));
    }

    Ok(())
}

fn process_packet_dbdesc(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
    src: Ipv4Addr,
    dbdesc: DbDesc,
) -> Result<(), Error> {
    // MTU mismatch check.
    if !iface.config.mtu_ignore && dbdesc.mtu > iface.system.mtu.unwrap() {
        return Err(Error::PacketMismatch {
            ifname: iface.name.clone(),
            src,
            pkt_type: PacketType::DbDesc,
            mismatch: CfgMismatch::Mtu(dbdesc.mtu),
        });
    }

    // Further processing depends on the neighbor's state.
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescNotAllowed(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                let event = nsm::Event::TwoWayRcvd;
                nbr.fsm(iface, area, instance, lsa_entries, event);
                if nbr.state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            if dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs.is_empty()
                && dbdesc.hdr.router_id > instance.state.router_id
            {
                // Set the master/slave bit to slave, and set the neighbor
                // data structure's DD sequence number to that specified by
                // the master.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no;
            } else if !dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no == nbr.dd_seq_no
                && dbdesc.hdr.router_id < instance.state.router_id
            {
                // In this case the router is Master.
            } else {
                // Ignore the packet.
                return Ok(());
            }

            nbr.options = Some(dbdesc.options);
            let event = nsm::Event::NegotiationDone;
            nbr.fsm(iface, area, instance, lsa_entries, event);
        }
        nsm::State::Exchange => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave needs to retransmit the last Database Description
                // packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            // Sanity checks.
            let last_rcvd_dbdesc = nbr.last_rcvd_dbdesc.as_ref().unwrap();
            if dbdesc.dd_flags.contains(DbDescFlags::I)
                || dbdesc.dd_flags.contains(DbDescFlags::MS)
                    != last_rcvd_dbdesc.dd_flags.contains(DbDescFlags::MS)
            {
                let reason = SeqNoMismatchReason::InconsistentFlags;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if dbdesc.options != last_rcvd_dbdesc.options {
                let reason = SeqNoMismatchReason::InconsistentOptions;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if (nbr.dd_flags.contains(DbDescFlags::MS)
                && dbdesc.dd_seq_no != nbr.dd_seq_no)
                || (!nbr.dd_flags.contains(DbDescFlags::MS)
                    && dbdesc.dd_seq_no != nbr.dd_seq_no + 1)
            {
                let reason = SeqNoMismatchReason::InconsistentSeqNo;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave must respond to duplicates by repeating the last
                // Database Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }
    }

    // If we got this far it means the packet was accepted. Stop the
    // retransmission interval in case it's active.
    nbr.rxmt_dbdesc_stop();

    // Now iterate over all LSA headers.
    for lsa_hdr in &dbdesc.lsa_hdrs {
        // Check if the LSA is valid for this neighbor.
        if !lsdb::lsa_type_is_valid(nbr.options, lsa_hdr.lsa_type) {
            let reason = SeqNoMismatchReason::InvalidLsaType;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }

        // RFC 5243 says:
        // "If the Database summary list contains an instance of the LSA that
        // is the same as or less recent than the listed LSA, the LSA is
        // removed from the Database summary list".
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) =
            nbr.lists.db_summary.entry(lsa_key)
        {
            let db_summ_lsa = o.get();
            // Compare using the LSA's current age.
            let db_summ_hdr = LsaHdr {
                age: db_summ_lsa.age(),
                ..db_summ_lsa.hdr
            };
            if lsa_compare(&db_summ_hdr, lsa_hdr) != Ordering::Greater {
                o.remove();
            }
        }

        // Put the LSA on the Link state request list if it's not present on
        // the LSDB, or if the local copy is less recent than the received
        // one.
        let lsdb = match lsa_hdr.lsa_type.scope() {
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => unreachable!(),
        };
        if let Some((_, lse)) = lsdb.get(lsa_entries, &lsa_key) {
            // Compare using the database copy's current age.
            let db_hdr = LsaHdr {
                age: lse.data.age(),
                ..lse.data.hdr
            };
            if lsa_compare(&db_hdr, lsa_hdr) != Ordering::Less {
                continue;
            }
        }
        nbr.lists.ls_request.insert(lsa_key, *lsa_hdr);
    }

    // Start sending Link State Request packets.
    if !nbr.lists.ls_request.is_empty()
        && nbr.lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // Further processing depends on whether the router is master or slave.
    let mut exchange_done = false;
    if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no += 1;

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        } else {
            output::send_dbdesc(nbr, iface, area, instance);
        }
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no;

        output::send_dbdesc(nbr, iface, area, instance);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        }
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::ExchangeDone);

        // The slave must wait RouterDeadInterval seconds before freeing the
        // last Database Description packet. Reception of a Database
        // Description packet from the master after this interval will
        // generate a SeqNumberMismatch neighbor event.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            let dbdesc_free_timer =
                tasks::dbdesc_free_timer(nbr, iface, instance);
            nbr.tasks.dbdesc_free_timer = Some(dbdesc_free_timer);
        }
    }

    // Save last received Database Description packet.
    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options,
        dd_flags: dbdesc.dd_flags,
        dd_seq_no: dbdesc.dd_seq_no,
    });

    Ok(())
}

fn process_packet_lsreq(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
    ls_req: LsRequest,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all request entries.
    for lsa_key in &ls_req.entries {
        // Locate LSA in the LSDB.
        let lsdb = match lsa_key.lsa_type.scope() {
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => {
                // Ignore requests for LSAs of unknown scope.
                continue;
            }
        };

        if let Some((_, lse)) = lsdb.get(lsa_entries, lsa_key) {
            // Copy LSA for transmission to the neighbor.
            let lsa = lse.data.clone();
            nbr.lists.ls_update.insert(*lsa_key, lsa);
        } else {
            // Something has gone wrong with the Database Exchange process.
            nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
            return Ok(());
        }
    }

    // Schedule transmission of new LS Update.
    if !nbr.lists.ls_update.is_empty() {
        instance
            .tx
            .protocol_input
            .send_lsupd(iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv4Addr,
    ls_upd: LsUpdate,
) -> Result<(), Error> {
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Process all LSAs contained in the packet.
    for lsa in ls_upd.lsas {
        let stop = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, instance, arenas, src, lsa,
        );
        if stop {
            break;
        }
    }

    Ok(())
}

fn process_packet_lsupd_lsa(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    _src: Ipv4Addr,
    lsa: Lsa,
) -> bool {
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.area;

    // (1) Validate the LSA (not only the checksum as specified by the RFC).
    if let Err(error) = lsa.validate() {
        // Log why the LSA is being discarded.
        Debug::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();

        // Examine the next LSA.
        return false;
    }

    // (2-3) Check if the LSA type is valid for this neighbor.
    if !lsdb::lsa_type_is_valid(nbr.options, lsa.hdr.lsa_type) {
        // Examine the next LSA.
        return false;
    }

    // (5) Find the instance of this LSA that is currently contained in the
    // router's link state database.
    let lsdb_id = match lsa.hdr.lsa_type.scope() {
        LsaScope::Area => LsdbId::Area,
        LsaScope::As => LsdbId::As,
        LsaScope::Unknown => unreachable!(),
    };
    let lsdb = lsdb::lsdb_get(&instance.state.lsdb, area, lsdb_id);
    let lsa_key = lsa.hdr.key();
    let lse = lsdb.get(&arenas.lsa_entries, &lsa_key).map(|(_, lse)| lse);

    // (4) If the LSA's LS age is equal to MaxAge, and there is currently no
    // instance of the LSA in the router's link state database, and none of
    // router's neighbors are in states Exchange or Loading.
    if lsa.hdr.is_maxage()
        && lse.is_none()
        && !arenas.neighbors.iter().any(|(_, nbr)| {
            matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
        })
    {
        // Acknowledge the receipt of the LSA.
        let nbr = &arenas.neighbors[nbr_idx];
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);

        // Examine the next LSA.
        return false;
    }

    // (5 cont.) There is no database copy, or the received LSA is more
    // recent than the database copy. The database copy is compared using its
    // current age.
    let lsa_cmp = lse.map(|lse| {
        let db_hdr = LsaHdr {
            age: lse.data.age(),
            ..lse.data.hdr
        };
        lsa_compare(&db_hdr, &lsa.hdr)
    });
    if matches!(lsa_cmp, None | Some(Ordering::Less)) {
        // (5.a) MinLSArrival check.
        if let Some(lse) = lse
            && lsdb::lsa_min_arrival_check(lse)
        {
            // Log why the LSA is being discarded.
            Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();

            // Examine the next LSA.
            return false;
        }

        // Move LSA into a reference-counting pointer.
        let lsa = Arc::new(lsa);

        // (5.b) Immediately flood the new LSA out some subset of the
        // router's interfaces.
        let src = Some((iface_idx, nbr_idx));
        let flooded_back = flood(
            instance,
            &arenas.area,
            &mut arenas.interfaces,
            &mut arenas.neighbors,
            &lsa,
            src,
        );

        // (5.c) This step can be skipped since the LSA installation process
        // already takes care of removing the old copy from all Link state
        // retransmission lists.

        // (5.d) Install the new LSA in the link state database (replacing
        // the current database copy).
        let lse_idx = lsdb::install(instance, arenas, lsdb_id, lsa);
        let lse = &mut arenas.lsa_entries[lse_idx];
        lse.flags.insert(LsaEntryFlags::RECEIVED);

        // Update statistics.
        instance.state.rx_lsa_count += 1;

        // (5.e) Possibly acknowledge the receipt of the LSA by sending a
        // Link State Acknowledgment packet.
        let nbr = &mut arenas.neighbors[nbr_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        let area = &arenas.area;
        let nbr_net_id = nbr.network_id();
        let nbr_router_id = nbr.router_id;
        if !flooded_back
            && (iface.state.ism_state != ism::State::Backup
                || iface.state.dr == Some(nbr_net_id))
        {
            // Enqueue delayed ack.
            let lsa_hdr = lse.data.hdr;
            iface.enqueue_delayed_ack(area, instance, &lsa_hdr);
        }

        // (5.f) Check if this is a self-originated LSA.
        if lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED) {
            Debug::LsaSelfOriginated(nbr_router_id, &lse.data.hdr).log();

            // (Re)originate or flush self-originated LSA.
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::SelfOriginatedLsaRcvd {
                    lsdb_id,
                    lse_id: lse.id,
                },
            );
        }

        // Examine the next LSA.
        return false;
    }

    // (6 - errata 3974) Check if the received LSA is the same instance as
    // the database copy (i.e., neither one is more recent).
    let nbr = &mut arenas.neighbors[nbr_idx];
    let lse = lse.unwrap();
    if lsa_cmp == Some(Ordering::Equal) {
        // Check if this LSA can be handled as an implied acknowledgment.
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            o.remove();
            nbr.rxmt_lsupd_stop_check();

            let nbr_net_id = nbr.network_id();
            if iface.state.ism_state == ism::State::Backup
                && iface.state.dr == Some(nbr_net_id)
            {
                // Enqueue delayed ack.
                iface.enqueue_delayed_ack(area, instance, &lsa.hdr);
            }
        } else {
            // Send direct ack.
            output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        }

        // Examine the next LSA.
        return false;
    }

    // (7 - errata 3974) If there is an instance of the LSA on the sending
    // neighbor's Link state request list, an error has occurred in the
    // Database Exchange process.
    if nbr.lists.ls_request.contains_key(&lsa_key)
        || nbr.lists.ls_request_pending.contains_key(&lsa_key)
    {
        // Restart the Database Exchange process.
        nbr.fsm(
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            nsm::Event::BadLsReq,
        );

        // Stop processing the Link State Update packet.
        return true;
    }

    // (8) The database copy is more recent.
    //
    // If the database copy has LS age equal to MaxAge and LS sequence number
    // equal to MaxSequenceNumber, simply discard the received LSA without
    // acknowledging it.
    if lse.data.hdr.is_maxage() && lse.data.hdr.seq_no == lsdb::LSA_MAX_SEQ_NO
    {
        // Examine the next LSA.
        return false;
    }
    if !lsdb::lsa_min_arrival_check(lse) {
        // Send the database copy back to the sending neighbor, encapsulated
        // within a Link State Update Packet.
        nbr.lists.ls_update.insert(lsa_key, lse.data.clone());
        instance
            .tx
            .protocol_input
            .send_lsupd(iface.id, Some(nbr.id));
    } else {
        // Log why the LSA is being discarded.
        Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
    }

    // Examine the next LSA.
    false
}

fn process_packet_lsack(
    nbr: &mut Neighbor,
    ls_ack: LsAck,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all LSA headers.
    for lsa_hdr in &ls_ack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            let lsa = o.get();
            // Compare using the retransmission copy's current age.
            let rxmt_hdr = LsaHdr {
                age: lsa.age(),
                ..lsa.hdr
            };
            if lsa_compare(&rxmt_hdr, lsa_hdr) == Ordering::Equal {
                o.remove();
                nbr.rxmt_lsupd_stop_check();
            } else {
                Debug::QuestionableAck(nbr.router_id, lsa_hdr).log();
            }
        }
    }

    Ok(())
}

// ===== Free last sent/received Database Description packets =====

pub(crate) fn process_dbdesc_free(
    _instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
) -> Result<(), Error> {
    // Lookup interface and neighbor.
    let (_iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Free last sent/received Database Description packets.
    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== Request to send LS Update =====

pub(crate) fn process_send_lsupd(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    nbr_key: Option<NeighborKey>,
) -> Result<(), Error> {
    // Lookup interface and optional neighbor.
    let (_iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let nbr_idx = match &nbr_key {
        Some(nbr_key) => {
            let (nbr_idx, _) = iface
                .state
                .neighbors
                .get_mut_by_key(&mut arenas.neighbors, nbr_key)?;
            Some(nbr_idx)
        }
        None => None,
    };

    // Send LS Update.
    iface.state.tasks.ls_update_timer = None;
    output::send_lsupd(
        nbr_idx,
        iface,
        &arenas.area,
        instance,
        &mut arenas.neighbors,
    );

    Ok(())
}

// ===== Packet retransmission =====

pub(crate) fn process_packet_rxmt(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    packet_type: RxmtPacketType,
) -> Result<(), Error> {
    // Lookup interface and neighbor.
    let (_iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Retransmit packet.
    match packet_type {
        RxmtPacketType::DbDesc => {
            output::rxmt_dbdesc(nbr, iface);
        }
        RxmtPacketType::LsRequest => {
            output::rxmt_lsreq(nbr, iface, &arenas.area, instance);
        }
        RxmtPacketType::LsUpdate => {
            output::rxmt_lsupd(nbr, iface, &arenas.area, instance);
        }
    }

    Ok(())
}

// ===== Delayed Ack timeout =====

pub(crate) fn process_delayed_ack_timeout(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    iface_key: InterfaceKey,
) -> Result<(), Error> {
    // Lookup interface.
    let (_iface_idx, iface) = arenas
        .area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Send delayed LS Ack.
    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, &arenas.area, instance, &arenas.neighbors);

    Ok(())
}

// ===== LSA origination event =====

pub(crate) fn process_lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    // Check which LSAs need to be reoriginated or flushed.
    lsdb::lsa_orig_event(instance, arenas, event)
}

// ===== LSA origination check =====

pub(crate) fn process_lsa_orig_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) -> Result<(), Error> {
    // Attempt to originate LSA.
    lsdb::originate_check(instance, arenas, lsdb_id, options, lsa_id, lsa_body);

    Ok(())
}

// ===== LSA delayed origination timer =====

pub(crate) fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    // Lookup LSDB.
    let lsdb =
        lsdb::lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);

    // Originate LSA.
    if let Some(ldo) = lsdb.delayed_orig.remove(&lsa_key) {
        lsdb::originate(instance, arenas, lsdb_id, ldo.data);
    }

    Ok(())
}

// ===== LSA flush event =====

pub(crate) fn process_lsa_flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_key: LsaEntryKey,
    reason: LsaFlushReason,
) -> Result<(), Error> {
    // Lookup LSA entry.
    let lsdb =
        lsdb::lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);
    let (lse_idx, _) = lsdb.get_mut_by_key(&mut arenas.lsa_entries, &lse_key)?;

    // Flush LSA.
    lsdb::flush(instance, arenas, lsdb_id, lse_idx, reason);

    Ok(())
}

// ===== LSA refresh event =====

pub(crate) fn process_lsa_refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_key: LsaEntryKey,
) -> Result<(), Error> {
    // Lookup LSA entry.
    let lsdb = lsdb::lsdb_get(&instance.state.lsdb, &arenas.area, lsdb_id);
    let (_, lse) = lsdb.get_by_key(&arenas.lsa_entries, &lse_key)?;

    Debug::LsaRefresh(&lse.data.hdr).log();

    // Originate new instance of the LSA.
    let lsa = Lsa::new(
        0,
        lse.data.hdr.options,
        lse.data.hdr.lsa_id,
        lse.data.hdr.adv_rtr,
        lse.data.hdr.seq_no + 1,
        lse.data.body.clone(),
    );
    lsdb::originate(instance, arenas, lsdb_id, lsa);

    Ok(())
}

// ===== LSDB MaxAge sweep timer =====

pub(crate) fn process_lsdb_maxage_sweep_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
) -> Result<(), Error> {
    // Skip discarding MaxAge LSAs if any of the router's neighbors are in
    // states Exchange or Loading.
    if arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    }) {
        return Ok(());
    }

    // Get list of MaxAge LSAs that are no longer contained on any neighbor
    // LS retransmission lists.
    let lsdb =
        lsdb::lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.area, lsdb_id);
    let maxage_lsas = lsdb
        .maxage_lsas
        .iter()
        .copied()
        .filter(|lse_idx| {
            let lse = &arenas.lsa_entries[*lse_idx];
            !arenas.neighbors.iter().any(|(_, nbr)| {
                nbr.lists
                    .ls_rxmt
                    .get(&lse.data.hdr.key())
                    .filter(|rxmt_lsa| Arc::ptr_eq(&lse.data, rxmt_lsa))
                    .is_some()
            })
        })
        .collect::<Vec<_>>();

    for lse_idx in maxage_lsas {
        let lsdb = lsdb::lsdb_get_mut(
            &mut instance.state.lsdb,
            &mut arenas.area,
            lsdb_id,
        );
        let lse = &arenas.lsa_entries[lse_idx];

        // Delete or originate new instance of the LSA depending whether it's
        // wrapping its sequence number.
        if let Some(lsa) = lsdb.seqno_wrapping.remove(&lse.data.hdr.key()) {
            let lsa = Lsa::new(
                0,
                lsa.hdr.options,
                lsa.hdr.lsa_id,
                lsa.hdr.adv_rtr,
                lsdb::LSA_INIT_SEQ_NO,
                lsa.body.clone(),
            );
            lsdb::originate(instance, arenas, lsdb_id, lsa);
        } else {
            lsdb.delete(&mut arenas.lsa_entries, lse_idx);
        }
    }

    Ok(())
}

// ===== SPF run event =====

pub(crate) fn process_spf_delay_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    event: spf::fsm::Event,
) -> Result<(), Error> {
    // Trigger SPF Delay FSM event.
    spf::fsm(event, instance, arenas)
}
