use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use ism::{Event, State};
use ospfd_utils::ip::Ipv4AddrExt;
use ospfd_utils::socket::{AsyncFd, Socket};
use ospfd_utils::southbound::InterfaceFlags;
use ospfd_utils::task::{IntervalTask, Task, TimeoutTask};
use ospfd_utils::UnboundedSender;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use tokio::sync::mpsc;

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, Neighbors};
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{CfgMismatch, Error, IoError};
use crate::instance::InstanceUpView;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::{self, MulticastAddr};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, Packet, PacketHdr, PacketType};
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

#[derive(Debug, Default)]
pub struct InterfaceSys {
    // Interface flags.
    pub flags: InterfaceFlags,
    // Interface ifindex.
    pub ifindex: Option<u32>,
    // Interface MTU.
    pub mtu: Option<u16>,
    // List of addresses associated with this interface.
    pub addr_list: BTreeSet<Ipv4Network>,
    // Primary address.
    pub primary_addr: Option<Ipv4Network>,
}

#[derive(Debug)]
pub struct InterfaceCfg {
    pub if_type: InterfaceType,
    pub enabled: bool,
    pub passive: bool,
    pub priority: u8,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
    pub cost: u16,
    pub mtu_ignore: bool,
    pub static_nbrs: BTreeMap<Ipv4Addr, StaticNbr>,
}

// Statically configured neighbor (NBMA and Point-to-MultiPoint networks).
#[derive(Clone, Copy, Debug)]
pub struct StaticNbr {
    pub priority: u8,
    pub poll_interval: u16,
}

#[derive(Debug)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // Raw socket and Tx/Rx tasks.
    pub net: Option<InterfaceNet>,
    // Source address used when sending packets.
    pub src_addr: Option<Ipv4Addr>,
    // Joined multicast groups.
    pub mcast_groups: HashSet<MulticastAddr>,
    // The network DR/BDR.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // Self-originated Network-LSA of this interface.
    pub network_lsa_self: Option<LsaKey>,
    // Statistics.
    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // Tasks.
    pub tasks: InterfaceTasks,
}

#[derive(Debug)]
pub struct InterfaceNet {
    // Raw socket.
    pub socket: Arc<AsyncFd<Socket>>,
    // Network Tx/Rx tasks.
    _net_tx_task: Task<()>,
    _net_rx_task: Task<()>,
    // Network Tx output channel.
    pub net_tx_packetp: UnboundedSender<NetTxPacketMsg>,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // ISM Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // NBMA poll interval tasks.
    pub nbma_poll_interval: HashMap<Ipv4Addr, IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceType {
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    VirtualLink,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DrCandidate {
    pub router_id: Ipv4Addr,
    pub net_id: NeighborNetId,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            id,
            name,
            system: InterfaceSys::default(),
            config: InterfaceCfg::default(),
            state: InterfaceState::default(),
        }
    }

    // Checks if the interface needs to be started or stopped in response to a
    // configuration or system event.
    pub(crate) fn update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        // Check next ISM event to invoke, but only if necessary.
        let event = match self.is_ready() {
            Ok(_) => {
                let ism_state = self.state.ism_state;
                if self.system.flags.contains(InterfaceFlags::LOOPBACK) {
                    if ism_state == State::Loopback {
                        return;
                    }
                    Event::LoopInd
                } else if ism_state == State::Loopback {
                    Event::UnloopInd
                } else if ism_state == State::Down {
                    Event::InterfaceUp
                } else {
                    return;
                }
            }
            Err(reason) if !self.is_down() => Event::InterfaceDown(reason),
            _ => return,
        };

        // Invoke ISM event.
        self.fsm(area, instance, neighbors, lsa_entries, event);
    }

    // Returns whether the interface is ready for OSPF operation.
    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.config.enabled {
            return Err(InterfaceInactiveReason::AdminDown);
        }

        if !self.system.flags.contains(InterfaceFlags::OPERATIVE) {
            return Err(InterfaceInactiveReason::OperationalDown);
        }

        if self.system.ifindex.is_none() {
            return Err(InterfaceInactiveReason::MissingIfindex);
        }

        if self.system.mtu.is_none() {
            return Err(InterfaceInactiveReason::MissingMtu);
        }

        if self.system.primary_addr.is_none() {
            return Err(InterfaceInactiveReason::MissingIpv4Address);
        }

        Ok(())
    }

    fn start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        Debug::InterfaceStart(&self.name).log();

        // Initialize source address.
        self.state.src_addr = Some(self.system.primary_addr.unwrap().ip());

        if !self.is_passive() {
            // Start network Tx/Rx tasks.
            match InterfaceNet::new(self, instance) {
                Ok(net) => self.state.net = Some(net),
                Err(error) => {
                    let ifname = self.name.clone();
                    Error::InterfaceStart { ifname, error }.log();
                    return State::Down;
                }
            }

            // Start Hello Tx task.
            self.hello_interval_start(area, instance);
        }

        // Get new ISM state.
        let new_ism_state = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => State::PointToPoint,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if self.config.priority == 0 {
                    State::DrOther
                } else {
                    State::Waiting
                }
            }
        };

        if new_ism_state == State::Waiting {
            // Start wait timer.
            let task = tasks::ism_wait_timer(self, instance);
            self.state.tasks.wait_timer = Some(task);

            if self.config.if_type == InterfaceType::NonBroadcast {
                // Examine the configured list of neighbors for this interface
                // and generate the neighbor event Start for each neighbor that
                // is also eligible to become Designated Router.
                for nbr in self
                    .config
                    .static_nbrs
                    .iter()
                    .filter(|(_, snbr)| snbr.priority != 0)
                    .filter_map(|(addr, _)| {
                        self.state
                            .neighbors
                            .iter(neighbors)
                            .find(|nbr| nbr.src == *addr)
                    })
                {
                    instance.tx.protocol_input.nsm_event(
                        self.id,
                        nbr.id,
                        nsm::Event::Start,
                    );
                }
            }
        }

        new_ism_state
    }

    // Stop interface if it's active.
    fn stop(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(&self.name, reason).log();

        // Kill all neighbors.
        let event = match reason {
            InterfaceInactiveReason::OperationalDown
            | InterfaceInactiveReason::MissingIfindex
            | InterfaceInactiveReason::MissingMtu
            | InterfaceInactiveReason::MissingIpv4Address => {
                nsm::Event::LinkDown
            }
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Reset interface state.
        self.state.net = None;
        self.state.src_addr = None;
        self.state.mcast_groups = Default::default();
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        self.state.tasks = Default::default();
    }

    // Restart the Hello Tx task.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.is_passive() && self.state.ism_state >= ism::State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.system.flags.contains(InterfaceFlags::LOOPBACK)
            || self.config.passive
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.name, &self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                // Start interface.
                self.start(area, instance, neighbors)
            }
            (State::Waiting, Event::NbrChange) => {
                // This is an unspecified event but it can happen during normal
                // operation, so ignore it gracefully instead of logging an
                // error.
                return;
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;

                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (_, Event::InterfaceDown(reason)) => {
                // Stop interface.
                self.stop(area, instance, neighbors, lsa_entries, *reason);
                State::Down
            }
            (_, Event::LoopInd) => {
                // Stop interface.
                self.stop(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    InterfaceInactiveReason::LoopedBack,
                );
                State::Loopback
            }
            (State::Loopback, Event::UnloopInd) => {
                // No actions are necessary.
                State::Down
            }
            _ => {
                Error::IsmEventRejected(self.state.ism_state, event).log();
                return;
            }
        };

        // Check for FSM state change.
        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        instance: &InstanceUpView<'_>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::InterfaceStateChange {
                iface_id: self.id,
            });
        if self.state.ism_state == ism::State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange { iface_id: self.id },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::IsmTransition(
            &self.name,
            &self.state.ism_state,
            &new_ism_state,
        )
        .log();
        self.state.ism_state = new_ism_state;

        // Join or leave OSPF multicast groups as necessary.
        self.update_mcast_groups();

        // Update statistics.
        self.state.event_count += 1;
        self.state.discontinuity_time = Utc::now();
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let dst = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::Broadcast
            | InterfaceType::VirtualLink => {
                smallvec![network::multicast_addr(MulticastAddr::AllSpfRtrs)]
            }
            InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
                self.config.static_nbrs.keys().copied().collect()
            }
        };
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance, dst, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        addr: Ipv4Addr,
        poll_interval: u16,
    ) {
        let dst = smallvec![addr];
        let task =
            tasks::hello_interval(self, area, instance, dst, poll_interval);
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: Ipv4Addr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    fn update_mcast_groups(&mut self) {
        let socket = match &self.state.net {
            Some(net) => net.socket.get_ref(),
            None => return,
        };

        // AllSPFRouters.
        if self.state.ism_state >= State::Waiting
            && !self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            self.system
                .join_multicast(socket, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllSpfRtrs);
        } else if self.state.ism_state < State::Waiting
            && self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            self.system
                .leave_multicast(socket, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllSpfRtrs);
        }

        // AllDRouters.
        if self.is_dr_or_backup()
            && !self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            self.system.join_multicast(socket, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllDrRtrs);
        } else if !self.is_dr_or_backup()
            && self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            self.system
                .leave_multicast(socket, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllDrRtrs);
        }
    }

    fn dr_election(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        let router_id = instance.state.router_id;
        let net_id =
            NeighborNetId::from(self.state.src_addr.unwrap());

        // Step 1: note the current values for the network's Designated Router
        // and Backup Designated Router.
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        // Steps 2-3: calculate the new Backup Designated Router and Designated
        // Router.
        let candidates =
            self.dr_eligible_routers(router_id, net_id, neighbors);
        let (mut new_dr, mut new_bdr) = dr_election_compute(&candidates);
        self.state.dr = new_dr;
        self.state.bdr = new_bdr;

        // Step 4: if the router is now newly the DR/BDR, or is now no longer
        // the DR/BDR, repeat steps 2 and 3 with the updated self-declaration.
        if (new_dr == Some(net_id) || old_dr == Some(net_id))
            && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            let candidates =
                self.dr_eligible_routers(router_id, net_id, neighbors);
            (new_dr, new_bdr) = dr_election_compute(&candidates);
            self.state.dr = new_dr;
            self.state.bdr = new_bdr;
        }

        // Step 5: set the interface state accordingly.
        Debug::IsmDrElection(&self.name, old_dr, new_dr, old_bdr, new_bdr)
            .log();
        let next_state = if new_dr == Some(net_id) {
            ism::State::Dr
        } else if new_bdr == Some(net_id) {
            ism::State::Backup
        } else {
            ism::State::DrOther
        };

        // Step 6: if the attached network is an NBMA network, and the router
        // itself has just become either DR or BDR, it must start sending Hello
        // Packets to those neighbors that are not eligible to become DR. This
        // is done by invoking the neighbor event Start for each neighbor having
        // a Router Priority of 0.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(next_state, ism::State::Dr | ism::State::Backup)
        {
            for nbr in self
                .config
                .static_nbrs
                .iter()
                .filter(|(_, snbr)| snbr.priority == 0)
                .filter_map(|(addr, _)| {
                    self.state
                        .neighbors
                        .iter(neighbors)
                        .find(|nbr| nbr.src == *addr)
                })
            {
                instance.tx.protocol_input.nsm_event(
                    self.id,
                    nbr.id,
                    nsm::Event::Start,
                );
            }
        }

        // Step 7: if the DR or BDR changes, invoke the AdjOk? event on all
        // neighbors whose state is at least 2-Way.
        if new_dr != old_dr || new_bdr != old_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            // Synchronize interface's Hello Tx task (updated DR and/or BDR).
            self.sync_hello_tx(area, instance);
        }

        // If the DR changed, reoriginate LSAs that might have been affected.
        if new_dr != old_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange { iface_id: self.id },
            );
        }

        next_state
    }

    fn dr_eligible_routers(
        &self,
        router_id: Ipv4Addr,
        net_id: NeighborNetId,
        neighbors: &Arena<Neighbor>,
    ) -> Vec<DrCandidate> {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });

        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.network_id(),
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });

        myself.into_iter().chain(nbrs).collect()
    }

    pub(crate) fn need_adjacency(&self, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => true,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
        }
    }

    // Generate an OSPF Hello message.
    pub(crate) fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> Packet {
        let hdr = PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: instance.state.router_id,
            area_id: area.area_id,
        };

        Packet::Hello(Hello {
            hdr,
            network_mask: self.system.primary_addr.unwrap().mask(),
            hello_interval: self.config.hello_interval,
            options: area.options(),
            priority: self.config.priority,
            dead_interval: self.config.dead_interval as u32,
            dr: self.state.dr,
            bdr: self.state.bdr,
            neighbors: self.state.neighbors.router_ids().collect(),
        })
    }

    // Validate the destination of the received packet.
    pub(crate) fn validate_packet_dst(
        &self,
        dst: Ipv4Addr,
    ) -> Result<(), Error> {
        // Check if the destination matches the interface primary address.
        if dst == self.system.primary_addr.unwrap().ip() {
            return Ok(());
        }

        // Check if the destination matches AllSPFRouters.
        if dst == network::multicast_addr(MulticastAddr::AllSpfRtrs) {
            return Ok(());
        }

        // Packets whose IP destination is AllDRouters should only be accepted
        // if the state of the receiving interface is DR or Backup.
        if dst == network::multicast_addr(MulticastAddr::AllDrRtrs)
            && self.is_dr_or_backup()
        {
            return Ok(());
        }

        Err(Error::BadDstAddr(dst))
    }

    // Validate the source of the received packet.
    pub(crate) fn validate_packet_src(
        &self,
        src: Ipv4Addr,
    ) -> Result<(), Error> {
        if !src.is_usable() {
            return Err(Error::BadSrcAddr(src));
        }

        // The packet's IP source address is required to be on the same
        // network as the receiving interface.
        if !matches!(
            self.config.if_type,
            InterfaceType::PointToPoint | InterfaceType::VirtualLink
        ) && !self.system.primary_addr.unwrap().contains(src)
        {
            return Err(Error::BadSrcAddr(src));
        }

        Ok(())
    }

    // Validate the received Hello packet.
    pub(crate) fn validate_hello(
        &self,
        hello: &Hello,
    ) -> Result<(), CfgMismatch> {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => {
                // Nothing to validate.
            }
            InterfaceType::PointToMultipoint
            | InterfaceType::Broadcast
            | InterfaceType::NonBroadcast => {
                // Validate the Hello Network mask field.
                let iface_addrmask = self.system.primary_addr.unwrap().mask();
                if hello.network_mask != iface_addrmask {
                    return Err(CfgMismatch::NetMask(
                        hello.network_mask,
                        iface_addrmask,
                    ));
                }
            }
        }

        Ok(())
    }

    // Return the maximum packet size that can be sent on this interface.
    pub(crate) fn max_packet_size(&self) -> u16 {
        const IPV4_HDR_SIZE: u16 = 20;

        self.system.mtu.unwrap() - IPV4_HDR_SIZE
    }

    // Find neighbor identified by its source address or Router-ID.
    pub(crate) fn get_neighbor<'a>(
        &mut self,
        src: &Ipv4Addr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor>,
    ) -> Option<(crate::collections::NeighborIndex, &'a mut Neighbor)> {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => {
                // If the receiving interface connects to a point-to-point
                // network or a virtual link, the sender is identified by the
                // Router ID (source router) found in the packet's OSPF header.
                self.state
                    .neighbors
                    .get_mut_by_router_id(neighbors, router_id)
            }
            InterfaceType::Broadcast
            | InterfaceType::NonBroadcast
            | InterfaceType::PointToMultipoint => {
                // If the receiving interface connects to a broadcast network,
                // Point-to-MultiPoint network or NBMA network the sender is
                // identified by the IP source address found in the packet's IP
                // header.
                let net_id = NeighborNetId::from(*src);
                if let Some((nbr_idx, nbr)) =
                    self.state.neighbors.get_mut_by_net_id(neighbors, net_id)
                {
                    // Update the neighbor's Router ID before returning it.
                    self.state
                        .neighbors
                        .update_router_id(nbr_idx, nbr, router_id);
                    Some((nbr_idx, nbr))
                } else {
                    None
                }
            }
        }
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Start LS Update timeout if necessary.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    pub(crate) fn send_packet(&self, msg: NetTxPacketMsg) {
        let _ = self.state.net.as_ref().unwrap().net_tx_packetp.send(msg);
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl InterfaceSys {
    // Check if the interface shares a subnet with the given IP address.
    pub(crate) fn contains_addr(&self, addr: &Ipv4Addr) -> bool {
        for local in &self.addr_list {
            if local.contains(*addr) {
                return true;
            }
        }

        false
    }

    fn join_multicast(&self, socket: &Socket, addr: MulticastAddr) {
        if let Err(error) =
            network::join_multicast(socket, addr, self.ifindex.unwrap())
        {
            IoError::MulticastJoin(addr, error).log();
        }
    }

    fn leave_multicast(&self, socket: &Socket, addr: MulticastAddr) {
        if let Err(error) =
            network::leave_multicast(socket, addr, self.ifindex.unwrap())
        {
            IoError::MulticastLeave(addr, error).log();
        }
    }
}

// ===== impl InterfaceCfg =====

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            if_type: InterfaceType::Broadcast,
            enabled: true,
            passive: false,
            priority: 1,
            hello_interval: 10,
            dead_interval: 40,
            retransmit_interval: 5,
            transmit_delay: 1,
            cost: 1,
            mtu_ignore: false,
            static_nbrs: Default::default(),
        }
    }
}

// ===== impl InterfaceState =====

impl Default for InterfaceState {
    fn default() -> InterfaceState {
        InterfaceState {
            ism_state: Default::default(),
            net: None,
            src_addr: None,
            mcast_groups: Default::default(),
            dr: None,
            bdr: None,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            network_lsa_self: None,
            event_count: 0,
            discontinuity_time: Utc::now(),
            tasks: Default::default(),
        }
    }
}

// ===== impl InterfaceNet =====

impl InterfaceNet {
    fn new(
        iface: &Interface,
        instance: &InstanceUpView<'_>,
    ) -> Result<Self, IoError> {
        // Create raw socket.
        let socket = network::socket(&iface.name)
            .map_err(IoError::Socket)
            .and_then(|socket| {
                AsyncFd::new(socket).map_err(IoError::Socket)
            })
            .map(Arc::new)?;

        // Start network Tx/Rx tasks.
        let (net_tx_packetp, net_tx_packetc) = mpsc::unbounded_channel();
        let mut net_tx_task =
            tasks::net_tx(socket.clone(), iface, net_tx_packetc);
        let net_rx_task = tasks::net_rx(
            socket.clone(),
            iface,
            &instance.tx.protocol_input.net_packet_rx,
        );

        // The network Tx task needs to be detached to ensure flushed
        // self-originated LSAs will be sent once the instance terminates.
        net_tx_task.detach();

        Ok(InterfaceNet {
            socket,
            _net_tx_task: net_tx_task,
            _net_rx_task: net_rx_task,
            net_tx_packetp,
        })
    }
}

// ===== global functions =====

// Calculates the network's Designated Router and Backup Designated Router
// from the given set of eligible candidates, as specified in section 9.4 of
// RFC 2328.
//
// Returns the elected pair of (DR, BDR).
pub(crate) fn dr_election_compute(
    candidates: &[DrCandidate],
) -> (Option<NeighborNetId>, Option<NeighborNetId>) {
    // Calculate the new Backup Designated Router. Routers that declare
    // themselves the Designated Router aren't eligible.
    let bdr = candidates
        .iter()
        .filter(|rtr| rtr.dr != Some(rtr.net_id))
        .filter(|rtr| rtr.bdr == Some(rtr.net_id))
        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
        .or_else(|| {
            candidates
                .iter()
                .filter(|rtr| rtr.dr != Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
        })
        .map(|rtr| rtr.net_id);

    // Calculate the new Designated Router. If no router declares itself the
    // Designated Router, the newly elected Backup becomes the Designated
    // Router.
    let dr = candidates
        .iter()
        .filter(|rtr| rtr.dr == Some(rtr.net_id))
        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
        .map(|rtr| rtr.net_id)
        .or(bdr);

    (dr, bdr)
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        router_id: [u8; 4],
        addr: [u8; 4],
        priority: u8,
        dr: Option<[u8; 4]>,
        bdr: Option<[u8; 4]>,
    ) -> DrCandidate {
        DrCandidate {
            router_id: router_id.into(),
            net_id: Ipv4Addr::from(addr).into(),
            dr: dr.map(|addr| Ipv4Addr::from(addr).into()),
            bdr: bdr.map(|addr| Ipv4Addr::from(addr).into()),
            priority,
        }
    }

    #[test]
    fn dr_election_no_prior_state() {
        // Three routers, equal priority and no prior DR/BDR knowledge: the
        // highest Router ID becomes the BDR, which is then promoted to DR.
        let candidates = [
            candidate([1, 1, 1, 1], [10, 0, 0, 1], 1, None, None),
            candidate([2, 2, 2, 2], [10, 0, 0, 2], 1, None, None),
            candidate([3, 3, 3, 3], [10, 0, 0, 3], 1, None, None),
        ];
        let (dr, bdr) = dr_election_compute(&candidates);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 3).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 3).into()));

        // Second pass, after the highest Router ID updated its declaration.
        let candidates = [
            candidate([1, 1, 1, 1], [10, 0, 0, 1], 1, None, None),
            candidate([2, 2, 2, 2], [10, 0, 0, 2], 1, None, None),
            candidate(
                [3, 3, 3, 3],
                [10, 0, 0, 3],
                1,
                Some([10, 0, 0, 3]),
                None,
            ),
        ];
        let (dr, bdr) = dr_election_compute(&candidates);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 3).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 2).into()));
    }

    #[test]
    fn dr_election_priority() {
        // Higher priority beats higher Router ID.
        let candidates = [
            candidate([1, 1, 1, 1], [10, 0, 0, 1], 10, None, None),
            candidate([3, 3, 3, 3], [10, 0, 0, 3], 1, None, None),
        ];
        let (dr, bdr) = dr_election_compute(&candidates);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 1).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 1).into()));
    }

    #[test]
    fn dr_election_existing_dr() {
        // An existing DR is not preempted by a higher Router ID or priority.
        let candidates = [
            candidate(
                [1, 1, 1, 1],
                [10, 0, 0, 1],
                1,
                Some([10, 0, 0, 1]),
                None,
            ),
            candidate([3, 3, 3, 3], [10, 0, 0, 3], 10, None, None),
        ];
        let (dr, bdr) = dr_election_compute(&candidates);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 1).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 3).into()));
    }

    #[test]
    fn dr_election_no_candidates() {
        // Routers with priority 0 never make it into the candidate set, so a
        // network where every router has priority 0 elects no DR or BDR.
        let (dr, bdr) = dr_election_compute(&[]);
        assert_eq!(dr, None);
        assert_eq!(bdr, None);
    }

    #[test]
    fn dr_election_determinism() {
        // The election is a pure function of the candidate set.
        let candidates = [
            candidate([1, 1, 1, 1], [10, 0, 0, 1], 1, None, Some([10, 0, 0, 1])),
            candidate([2, 2, 2, 2], [10, 0, 0, 2], 1, Some([10, 0, 0, 2]), None),
            candidate([3, 3, 3, 3], [10, 0, 0, 3], 1, None, None),
        ];
        let first = dr_election_compute(&candidates);
        for _ in 0..10 {
            assert_eq!(first, dr_election_compute(&candidates));
        }
        assert_eq!(first.0, Some(Ipv4Addr::new(10, 0, 0, 2).into()));
        assert_eq!(first.1, Some(Ipv4Addr::new(10, 0, 0, 1).into()));
    }
}
