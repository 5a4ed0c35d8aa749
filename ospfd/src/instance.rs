use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use ospfd_utils::task::TimeoutTask;
use ospfd_utils::{
    Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::area::Area;
use crate::collections::{
    Arena, InterfaceId, LsaEntryId, Lsdb, LsdbId, NeighborId,
};
use crate::debug::{
    Debug, InstanceInactiveReason, InterfaceInactiveReason, LsaFlushReason,
};
use crate::error::Error;
use crate::events;
use crate::interface::{Interface, ism};
use crate::lsdb::{self, LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, nsm};
use crate::output;
use crate::packet::Options;
use crate::packet::lsa::LsaBody;
use crate::route::RouteNet;
use crate::southbound::{self, SouthboundMsg};
use crate::spf;
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::{
    DbDescFreeMsg, DelayedAckMsg, IsmEventMsg, LsaFlushMsg, LsaOrigCheckMsg,
    LsaOrigDelayedMsg, LsaOrigEventMsg, LsaRefreshMsg, LsdbMaxAgeSweepMsg,
    NetRxPacketMsg, NsmEventMsg, RxmtIntervalMsg, SendLsUpdateMsg,
    SpfDelayEventMsg,
};

pub struct Instance {
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance arenas.
    pub arenas: InstanceArenas,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
}

#[derive(Debug)]
pub struct InstanceCfg {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // Administrative route preferences.
    pub preference: Preference,
    // SPF Delay FSM intervals, in milliseconds.
    pub spf_initial_delay: u32,
    pub spf_short_delay: u32,
    pub spf_long_delay: u32,
    pub spf_hold_down: u32,
    pub spf_time_to_learn: u32,
}

#[derive(Debug)]
pub struct Preference {
    pub intra_area: u8,
    pub external: u8,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb,
    // SPF data.
    pub spf_delay_state: spf::fsm::State,
    pub spf_delay_timer: Option<TimeoutTask>,
    pub spf_hold_down_timer: Option<TimeoutTask>,
    pub spf_learn_timer: Option<TimeoutTask>,
    // Routing table.
    pub rib: BTreeMap<Ipv4Network, RouteNet>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    pub rx_error_count: u32,
    pub spf_run_count: u32,
    pub discontinuity_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub area: Area,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

#[derive(Clone, Debug)]
pub struct InstanceChannelsTx {
    // Protocol input channels.
    pub protocol_input: ProtocolInputChannelsTx,
    // Southbound (forwarding plane) output channel.
    pub southbound: UnboundedSender<SouthboundMsg>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Interface FSM event.
    pub ism_event: UnboundedSender<IsmEventMsg>,
    // Neighbor FSM event.
    pub nsm_event: UnboundedSender<NsmEventMsg>,
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg>,
    // Free last sent/received Database Description packets.
    pub dbdesc_free: Sender<DbDescFreeMsg>,
    // Request to send LS Update.
    pub send_lsupd: UnboundedSender<SendLsUpdateMsg>,
    // Packet retransmission interval.
    pub rxmt_interval: Sender<RxmtIntervalMsg>,
    // Delayed Ack timeout.
    pub delayed_ack_timeout: UnboundedSender<DelayedAckMsg>,
    // LSA originate event.
    pub lsa_orig_event: UnboundedSender<LsaOrigEventMsg>,
    // LSA originate check.
    pub lsa_orig_check: UnboundedSender<LsaOrigCheckMsg>,
    // LSA delayed origination timer.
    pub lsa_orig_delayed_timer: Sender<LsaOrigDelayedMsg>,
    // LSA flush event.
    pub lsa_flush: UnboundedSender<LsaFlushMsg>,
    // LSA refresh event.
    pub lsa_refresh: UnboundedSender<LsaRefreshMsg>,
    // LSDB MaxAge sweep timer.
    pub lsdb_maxage_sweep_interval: Sender<LsdbMaxAgeSweepMsg>,
    // SPF run event.
    pub spf_delay_event: UnboundedSender<SpfDelayEventMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    pub ism_event: UnboundedReceiver<IsmEventMsg>,
    pub nsm_event: UnboundedReceiver<NsmEventMsg>,
    pub net_packet_rx: Receiver<NetRxPacketMsg>,
    pub dbdesc_free: Receiver<DbDescFreeMsg>,
    pub send_lsupd: UnboundedReceiver<SendLsUpdateMsg>,
    pub rxmt_interval: Receiver<RxmtIntervalMsg>,
    pub delayed_ack_timeout: UnboundedReceiver<DelayedAckMsg>,
    pub lsa_orig_event: UnboundedReceiver<LsaOrigEventMsg>,
    pub lsa_orig_check: UnboundedReceiver<LsaOrigCheckMsg>,
    pub lsa_orig_delayed_timer: Receiver<LsaOrigDelayedMsg>,
    pub lsa_flush: UnboundedReceiver<LsaFlushMsg>,
    pub lsa_refresh: UnboundedReceiver<LsaRefreshMsg>,
    pub lsdb_maxage_sweep_interval: Receiver<LsdbMaxAgeSweepMsg>,
    pub spf_delay_event: UnboundedReceiver<SpfDelayEventMsg>,
}

pub struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx,
}

// Operator commands received through the control channel.
#[derive(Debug, Deserialize, Serialize)]
pub enum ControlMsg {
    DumpState,
    Shutdown,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(config: InstanceCfg, tx: InstanceChannelsTx) -> Instance {
        Instance {
            config,
            state: None,
            arenas: Default::default(),
            tx,
        }
    }

    // Runs the instance event loop until a shutdown is requested.
    pub async fn run(
        mut self,
        mut protocol_input_rx: ProtocolInputChannelsRx,
        mut control_rx: UnboundedReceiver<ControlMsg>,
    ) {
        self.start();

        loop {
            tokio::select! {
                biased;
                msg = control_rx.recv() => {
                    match msg {
                        Some(ControlMsg::DumpState) => {
                            self.dump_state();
                        }
                        Some(ControlMsg::Shutdown) | None => {
                            break;
                        }
                    }
                }
                msg = protocol_input_rx.recv() => {
                    match msg {
                        Some(msg) => self.process_protocol_msg(msg),
                        None => break,
                    }
                }
            }
        }

        self.stop(InstanceInactiveReason::AdminDown);
    }

    fn start(&mut self) {
        Debug::InstanceStart.log();

        let state = InstanceState::new(self.config.router_id);

        // Store instance initial state.
        self.state = Some(state);

        // Try to start interfaces.
        let (instance, arenas) = self.as_up().unwrap();
        for iface_idx in arenas.area.interfaces.indexes() {
            let iface = &mut arenas.interfaces[iface_idx];

            iface.update(
                &arenas.area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
        }

        // Originate the initial Router-LSA.
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::InstanceStart);
    }

    fn stop(&mut self, reason: InstanceInactiveReason) {
        if !self.is_active() {
            return;
        }

        Debug::InstanceStop(reason).log();

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up().unwrap();
        lsdb::flush_all_self_originated(&mut instance, arenas);

        // Uninstall all routes.
        for (dest, _) in instance.state.rib.iter().filter(|(_, route)| {
            route
                .flags
                .contains(crate::route::RouteNetFlags::INSTALLED)
        }) {
            southbound::route_uninstall(&instance.tx.southbound, dest);
        }

        // Stop interfaces.
        for iface_idx in arenas.area.interfaces.indexes() {
            let iface = &mut arenas.interfaces[iface_idx];
            if iface.is_down() || iface.is_passive() {
                continue;
            }

            // Send pending LS Updates.
            output::send_lsupd(
                None,
                iface,
                &arenas.area,
                &instance,
                &mut arenas.neighbors,
            );

            let reason = InterfaceInactiveReason::InstanceDown;
            iface.fsm(
                &arenas.area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
                ism::Event::InterfaceDown(reason),
            );
        }

        // Clear instance state.
        self.state = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) = process_protocol_msg(&mut instance, arenas, msg)
        {
            error.log();
        }
    }

    // Dumps the routing table and SPF state in response to the operator's
    // "debug" command.
    fn dump_state(&mut self) {
        let Some((instance, arenas)) = self.as_up() else {
            return;
        };

        let mut dump = String::new();
        dump.push_str("==== routing table ====\n");
        for (prefix, route) in &instance.state.rib {
            let nexthops = route
                .nexthops
                .values()
                .map(|nexthop| match nexthop.addr {
                    Some(addr) => addr.to_string(),
                    None => "directly connected".to_owned(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            dump.push_str(&format!(
                "{} metric {} via [{}]\n",
                prefix,
                route.metric(),
                nexthops
            ));
        }
        dump.push_str("==== shortest-path tree ====\n");
        for (vertex_id, vertex) in &arenas.area.state.spt {
            dump.push_str(&format!(
                "{:?} distance {}\n",
                vertex_id, vertex.distance
            ));
        }
        let lsa_count = arenas.area.state.lsdb.lsa_count()
            + instance.state.lsdb.lsa_count();
        dump.push_str(&format!("==== lsdb ({} LSAs) ====\n", lsa_count));
        for lsdb in [&arenas.area.state.lsdb, &instance.state.lsdb] {
            for (_, lse) in lsdb.iter(&arenas.lsa_entries) {
                let hdr = &lse.data.hdr;
                dump.push_str(&format!(
                    "type {} id {} adv-rtr {} seq 0x{:08x} age {}\n",
                    hdr.lsa_type,
                    hdr.lsa_id,
                    hdr.adv_rtr,
                    hdr.seq_no,
                    lse.data.age(),
                ));
            }
        }

        print!("{}", dump);
        if let Err(error) = std::fs::write("/tmp/ospfd_state.dump", &dump) {
            tracing::warn!(%error, "failed to write state dump");
        }
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut InstanceArenas)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                config: &self.config,
                state,
                tx: &self.tx,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            router_id: Ipv4Addr::UNSPECIFIED,
            preference: Preference {
                intra_area: 110,
                external: 110,
            },
            spf_initial_delay: 50,
            spf_short_delay: 200,
            spf_long_delay: 5000,
            spf_hold_down: 10000,
            spf_time_to_learn: 500,
        }
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(router_id: Ipv4Addr) -> InstanceState {
        InstanceState {
            router_id,
            lsdb: Default::default(),
            spf_delay_state: spf::fsm::State::Quiet,
            spf_delay_timer: None,
            spf_hold_down_timer: None,
            spf_learn_timer: None,
            rib: Default::default(),
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            rx_error_count: 0,
            spf_run_count: 0,
            discontinuity_time: Utc::now(),
        }
    }
}

// ===== impl ProtocolInputChannelsTx =====

impl ProtocolInputChannelsTx {
    pub(crate) fn ism_event(&self, iface_id: InterfaceId, event: ism::Event) {
        let _ = self.ism_event.send(IsmEventMsg {
            iface_key: iface_id.into(),
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        let _ = self.nsm_event.send(NsmEventMsg {
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        let _ = self.send_lsupd.send(SendLsUpdateMsg {
            iface_key: iface_id.into(),
            nbr_key: nbr_id.map(std::convert::Into::into),
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        let _ = self.lsa_orig_event.send(LsaOrigEventMsg { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        let _ = self.lsa_orig_check.send(LsaOrigCheckMsg {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        let _ = self.lsa_flush.send(LsaFlushMsg {
            lsdb_id,
            lse_key: lse_id.into(),
            reason,
        });
    }

    pub(crate) fn spf_delay_event(&self, event: spf::fsm::Event) {
        let _ = self.spf_delay_event.send(SpfDelayEventMsg { event });
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            biased;
            msg = self.ism_event.recv() => {
                msg.map(ProtocolInputMsg::IsmEvent)
            }
            msg = self.nsm_event.recv() => {
                msg.map(ProtocolInputMsg::NsmEvent)
            }
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.dbdesc_free.recv() => {
                msg.map(ProtocolInputMsg::DbDescFree)
            }
            msg = self.send_lsupd.recv() => {
                msg.map(ProtocolInputMsg::SendLsUpdate)
            }
            msg = self.rxmt_interval.recv() => {
                msg.map(ProtocolInputMsg::RxmtInterval)
            }
            msg = self.delayed_ack_timeout.recv() => {
                msg.map(ProtocolInputMsg::DelayedAck)
            }
            msg = self.lsa_orig_event.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigEvent)
            }
            msg = self.lsa_orig_check.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigCheck)
            }
            msg = self.lsa_orig_delayed_timer.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigDelayed)
            }
            msg = self.lsa_flush.recv() => {
                msg.map(ProtocolInputMsg::LsaFlush)
            }
            msg = self.lsa_refresh.recv() => {
                msg.map(ProtocolInputMsg::LsaRefresh)
            }
            msg = self.lsdb_maxage_sweep_interval.recv() => {
                msg.map(ProtocolInputMsg::LsdbMaxAgeSweep)
            }
            msg = self.spf_delay_event.recv() => {
                msg.map(ProtocolInputMsg::SpfDelayEvent)
            }
        }
    }
}

// ===== global functions =====

// Creates the protocol input channel pairs used to communicate with the
// instance task.
pub fn protocol_input_channels()
-> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
    let (ism_eventp, ism_eventc) = mpsc::unbounded_channel();
    let (nsm_eventp, nsm_eventc) = mpsc::unbounded_channel();
    let (net_packet_rxp, net_packet_rxc) = mpsc::channel(4);
    let (dbdesc_freep, dbdesc_freec) = mpsc::channel(4);
    let (send_lsupdp, send_lsupdc) = mpsc::unbounded_channel();
    let (rxmt_intervalp, rxmt_intervalc) = mpsc::channel(4);
    let (delayed_ack_timeoutp, delayed_ack_timeoutc) =
        mpsc::unbounded_channel();
    let (lsa_orig_eventp, lsa_orig_eventc) = mpsc::unbounded_channel();
    let (lsa_orig_checkp, lsa_orig_checkc) = mpsc::unbounded_channel();
    let (lsa_orig_delayed_timerp, lsa_orig_delayed_timerc) = mpsc::channel(4);
    let (lsa_flushp, lsa_flushc) = mpsc::unbounded_channel();
    let (lsa_refreshp, lsa_refreshc) = mpsc::unbounded_channel();
    let (lsdb_maxage_sweep_intervalp, lsdb_maxage_sweep_intervalc) =
        mpsc::channel(4);
    let (spf_delay_eventp, spf_delay_eventc) = mpsc::unbounded_channel();

    let tx = ProtocolInputChannelsTx {
        ism_event: ism_eventp,
        nsm_event: nsm_eventp,
        net_packet_rx: net_packet_rxp,
        dbdesc_free: dbdesc_freep,
        send_lsupd: send_lsupdp,
        rxmt_interval: rxmt_intervalp,
        delayed_ack_timeout: delayed_ack_timeoutp,
        lsa_orig_event: lsa_orig_eventp,
        lsa_orig_check: lsa_orig_checkp,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerp,
        lsa_flush: lsa_flushp,
        lsa_refresh: lsa_refreshp,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalp,
        spf_delay_event: spf_delay_eventp,
    };
    let rx = ProtocolInputChannelsRx {
        ism_event: ism_eventc,
        nsm_event: nsm_eventc,
        net_packet_rx: net_packet_rxc,
        dbdesc_free: dbdesc_freec,
        send_lsupd: send_lsupdc,
        rxmt_interval: rxmt_intervalc,
        delayed_ack_timeout: delayed_ack_timeoutc,
        lsa_orig_event: lsa_orig_eventc,
        lsa_orig_check: lsa_orig_checkc,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerc,
        lsa_flush: lsa_flushc,
        lsa_refresh: lsa_refreshc,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalc,
        spf_delay_event: spf_delay_eventc,
    };

    (tx, rx)
}

// ===== helper functions =====

fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Interface FSM event.
        ProtocolInputMsg::IsmEvent(msg) => {
            events::process_ism_event(instance, arenas, msg.iface_key, msg.event)?
        }
        // Neighbor FSM event.
        ProtocolInputMsg::NsmEvent(msg) => events::process_nsm_event(
            instance,
            arenas,
            msg.iface_key,
            msg.nbr_key,
            msg.event,
        )?,
        // Received network packet.
        ProtocolInputMsg::NetRxPacket(msg) => {
            events::process_packet(
                instance,
                arenas,
                msg.iface_key,
                msg.src,
                msg.dst,
                msg.packet,
            )?;
        }
        // Free last sent/received Database Description packets.
        ProtocolInputMsg::DbDescFree(msg) => events::process_dbdesc_free(
            instance,
            arenas,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Request to send LS Update.
        ProtocolInputMsg::SendLsUpdate(msg) => events::process_send_lsupd(
            instance,
            arenas,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Packet retransmission.
        ProtocolInputMsg::RxmtInterval(msg) => events::process_packet_rxmt(
            instance,
            arenas,
            msg.iface_key,
            msg.nbr_key,
            msg.packet_type,
        )?,
        // Delayed Ack timeout.
        ProtocolInputMsg::DelayedAck(msg) => {
            events::process_delayed_ack_timeout(
                instance,
                arenas,
                msg.iface_key,
            )?
        }
        // LSA origination event.
        ProtocolInputMsg::LsaOrigEvent(msg) => {
            events::process_lsa_orig_event(instance, arenas, msg.event)?
        }
        // LSA origination check.
        ProtocolInputMsg::LsaOrigCheck(msg) => events::process_lsa_orig_check(
            instance,
            arenas,
            msg.lsdb_id,
            msg.options,
            msg.lsa_id,
            msg.lsa_body,
        )?,
        // LSA delayed origination timer.
        ProtocolInputMsg::LsaOrigDelayed(msg) => {
            events::process_lsa_orig_delayed_timer(
                instance,
                arenas,
                msg.lsdb_id,
                msg.lsa_key,
            )?
        }
        // LSA flush.
        ProtocolInputMsg::LsaFlush(msg) => events::process_lsa_flush(
            instance,
            arenas,
            msg.lsdb_id,
            msg.lse_key,
            msg.reason,
        )?,
        // LSA refresh event.
        ProtocolInputMsg::LsaRefresh(msg) => events::process_lsa_refresh(
            instance,
            arenas,
            msg.lsdb_id,
            msg.lse_key,
        )?,
        // LSA MaxAge sweep interval.
        ProtocolInputMsg::LsdbMaxAgeSweep(msg) => {
            events::process_lsdb_maxage_sweep_interval(
                instance,
                arenas,
                msg.lsdb_id,
            )?
        }
        // SPF run event.
        ProtocolInputMsg::SpfDelayEvent(msg) => {
            events::process_spf_delay_event(instance, arenas, msg.event)?
        }
    }

    Ok(())
}
