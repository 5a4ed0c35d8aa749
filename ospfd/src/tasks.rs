use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ospfd_utils::socket::{AsyncFd, Socket};
use ospfd_utils::task::{IntervalTask, Task, TimeoutTask};
use ospfd_utils::{Sender, UnboundedReceiver, UnboundedSender};
use smallvec::SmallVec;
use tracing::{Instrument, debug_span};

use crate::area::Area;
use crate::collections::{LsaEntryId, LsdbId};
use crate::debug::LsaFlushReason;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::network;
use crate::packet::lsa::{Lsa, LsaKey};
use crate::spf;

//
// OSPF tasks diagram:
//                                    +--------------+
//                     net_rx (Nx) -> |              | -> (Nx) net_tx
//                                    |              |
//             ism_wait_timer (Nx) -> |              | -> (Nx) hello_interval
//                                    |              |
//       nsm_inactivity_timer (Nx) -> |              |
//       packet_rxmt_interval (Nx) -> |              |
//          dbdesc_free_timer (Nx) -> |              |
//            ls_update_timer (Nx) -> |              |
//          delayed_ack_timer (Nx) -> |   instance   |
//                                    |              |
//           lsa_expiry_timer (Nx) -> |              |
//          lsa_refresh_timer (Nx) -> |              |
//     lsa_orig_delayed_timer (Nx) -> |              |
// lsdb_maxage_sweep_interval (Nx) -> |              |
//                                    |              |
//            spf_delay_timer (Nx) -> |              |
//                                    +--------------+
//                                          | ^
//                          southbound (1x) | | (1x) control
//                                          V |
//                                    +--------------+
//                                    |      OS      |
//                                    +--------------+
//

// OSPF inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    use crate::collections::{
        InterfaceKey, LsaEntryKey, LsdbId, NeighborKey,
    };
    use crate::debug::LsaFlushReason;
    use crate::interface::ism;
    use crate::lsdb::LsaOriginateEvent;
    use crate::neighbor::{RxmtPacketType, nsm};
    use crate::packet::error::DecodeError;
    use crate::packet::lsa::{LsaBody, LsaKey};
    use crate::packet::{Options, Packet};
    use crate::spf;

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            IsmEvent(IsmEventMsg),
            NsmEvent(NsmEventMsg),
            NetRxPacket(NetRxPacketMsg),
            DbDescFree(DbDescFreeMsg),
            SendLsUpdate(SendLsUpdateMsg),
            RxmtInterval(RxmtIntervalMsg),
            DelayedAck(DelayedAckMsg),
            LsaOrigEvent(LsaOrigEventMsg),
            LsaOrigCheck(LsaOrigCheckMsg),
            LsaOrigDelayed(LsaOrigDelayedMsg),
            LsaFlush(LsaFlushMsg),
            LsaRefresh(LsaRefreshMsg),
            LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg),
            SpfDelayEvent(SpfDelayEventMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct IsmEventMsg {
            pub iface_key: InterfaceKey,
            pub event: ism::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub event: nsm::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxPacketMsg {
            pub iface_key: InterfaceKey,
            pub src: Ipv4Addr,
            pub dst: Ipv4Addr,
            pub packet: Result<Packet, DecodeError>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DbDescFreeMsg {
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SendLsUpdateMsg {
            pub iface_key: InterfaceKey,
            pub nbr_key: Option<NeighborKey>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DelayedAckMsg {
            pub iface_key: InterfaceKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigEventMsg {
            pub event: LsaOriginateEvent,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigCheckMsg {
            pub lsdb_id: LsdbId,
            pub options: Options,
            pub lsa_id: Ipv4Addr,
            pub lsa_body: LsaBody,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigDelayedMsg {
            pub lsdb_id: LsdbId,
            pub lsa_key: LsaKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaFlushMsg {
            pub lsdb_id: LsdbId,
            pub lse_key: LsaEntryKey,
            pub reason: LsaFlushReason,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaRefreshMsg {
            pub lsdb_id: LsdbId,
            pub lse_key: LsaEntryKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsdbMaxAgeSweepMsg {
            pub lsdb_id: LsdbId,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SpfDelayEventMsg {
            pub event: spf::fsm::Event,
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Clone, Debug, Serialize)]
        pub struct NetTxPacketMsg {
            pub packet: Packet,
            pub dst: SmallVec<[Ipv4Addr; 4]>,
        }
    }
}

// ===== OSPF tasks =====

// Network Rx task.
pub(crate) fn net_rx(
    socket: Arc<AsyncFd<Socket>>,
    iface: &Interface,
    net_packet_rxp: &Sender<messages::input::NetRxPacketMsg>,
) -> Task<()> {
    let span1 = debug_span!("network");
    let _span1_guard = span1.enter();
    let span2 = debug_span!("input");
    let _span2_guard = span2.enter();

    let iface_id = iface.id;
    let net_packet_rxp = net_packet_rxp.clone();

    Task::spawn_supervised(move || {
        let socket = socket.clone();
        let net_packet_rxp = net_packet_rxp.clone();
        async move {
            let _ = network::read_loop(socket, iface_id, net_packet_rxp).await;
        }
        .in_current_span()
    })
}

// Network Tx task.
pub(crate) fn net_tx(
    socket: Arc<AsyncFd<Socket>>,
    iface: &Interface,
    net_packet_txc: UnboundedReceiver<messages::output::NetTxPacketMsg>,
) -> Task<()> {
    let span1 = debug_span!("network");
    let _span1_guard = span1.enter();
    let span2 = debug_span!("output");
    let _span2_guard = span2.enter();

    let ifname = iface.name.clone();
    let ifindex = iface.system.ifindex.unwrap();
    let src = iface.state.src_addr.unwrap();

    Task::spawn(
        async move {
            network::write_loop(socket, ifname, ifindex, src, net_packet_txc)
                .await;
        }
        .in_current_span(),
    )
}

// Send periodic OSPF Hello messages.
pub(crate) fn hello_interval(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    dst: SmallVec<[Ipv4Addr; 4]>,
    interval: u16,
) -> IntervalTask {
    // Generate hello packet.
    let packet = iface.generate_hello(area, instance);

    let net_tx_packetp =
        iface.state.net.as_ref().unwrap().net_tx_packetp.clone();
    IntervalTask::new(
        Duration::from_secs(interval.into()),
        true,
        move || {
            let packet = packet.clone();
            let dst = dst.clone();
            let net_tx_packetp = net_tx_packetp.clone();

            async move {
                let msg = messages::output::NetTxPacketMsg { packet, dst };
                let _ = net_tx_packetp.send(msg);
            }
        },
    )
}

// Interface wait timer task.
pub(crate) fn ism_wait_timer(
    iface: &Interface,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let timeout = Duration::from_secs(iface.config.dead_interval.into());
    let iface_id = iface.id;
    let ism_eventp = instance.tx.protocol_input.ism_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::IsmEventMsg {
            iface_key: iface_id.into(),
            event: ism::Event::WaitTimer,
        };
        let _ = ism_eventp.send(msg);
    })
}

// Neighbor inactivity timer.
pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface: &Interface,
    _area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let timeout = Duration::from_secs(iface.config.dead_interval.into());
    let nbr_id = nbr.id;
    let iface_id = iface.id;
    let nsm_eventp = instance.tx.protocol_input.nsm_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::NsmEventMsg {
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event: nsm::Event::InactivityTimer,
        };
        let _ = nsm_eventp.send(msg);
    })
}

// Send periodic packet retransmissions.
pub(crate) fn packet_rxmt_interval(
    iface: &Interface,
    msg: messages::input::RxmtIntervalMsg,
    instance: &InstanceUpView<'_>,
) -> IntervalTask {
    let rxmt_intervalp = instance.tx.protocol_input.rxmt_interval.clone();

    IntervalTask::new(
        Duration::from_secs(iface.config.retransmit_interval.into()),
        false,
        move || {
            let rxmt_intervalp = rxmt_intervalp.clone();
            let msg = msg.clone();

            async move {
                let _ = rxmt_intervalp.send(msg).await;
            }
        },
    )
}

// Timer to free the neighbor's last sent/received Database Description
// packets.
pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface: &Interface,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let iface_id = iface.id;
    let nbr_id = nbr.id;
    let dbdesc_freep = instance.tx.protocol_input.dbdesc_free.clone();

    TimeoutTask::new(
        Duration::from_secs(iface.config.dead_interval.into()),
        move || async move {
            let _ = dbdesc_freep
                .send(messages::input::DbDescFreeMsg {
                    iface_key: iface_id.into(),
                    nbr_key: nbr_id.into(),
                })
                .await;
        },
    )
}

// Interface LS Update timer task.
pub(crate) fn ls_update_timer(
    iface: &Interface,
    _area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let iface_id = iface.id;
    let send_lsupdp = instance.tx.protocol_input.send_lsupd.clone();

    TimeoutTask::new(Duration::from_millis(100), move || async move {
        let _ = send_lsupdp.send(messages::input::SendLsUpdateMsg {
            iface_key: iface_id.into(),
            nbr_key: None,
        });
    })
}

// Interface delayed Ack timer task.
pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    _area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let iface_id = iface.id;
    let delayed_ack_timeoutp =
        instance.tx.protocol_input.delayed_ack_timeout.clone();

    // RFC 2328 - Section 13.5:
    // "The fixed interval between a router's delayed transmissions must be
    // short (less than RxmtInterval) or needless retransmissions will
    // ensue".
    let timeout = Duration::from_secs(1);
    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::DelayedAckMsg {
            iface_key: iface_id.into(),
        };
        let _ = delayed_ack_timeoutp.send(msg);
    })
}

// LSA expiry timer task.
pub(crate) fn lsa_expiry_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa: &Lsa,
    lsa_flushp: &UnboundedSender<messages::input::LsaFlushMsg>,
) -> TimeoutTask {
    let timeout = lsdb::LSA_MAX_AGE - lsa.hdr.age;
    let timeout = Duration::from_secs(timeout.into());
    let lsa_flushp = lsa_flushp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaFlushMsg {
            lsdb_id,
            lse_key: lse_id.into(),
            reason: LsaFlushReason::Expiry,
        };
        let _ = lsa_flushp.send(msg);
    })
}

// LSA refresh timer task.
pub(crate) fn lsa_refresh_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa_refreshp: &UnboundedSender<messages::input::LsaRefreshMsg>,
) -> TimeoutTask {
    let timeout = lsdb::LSA_REFRESH_TIME;
    let timeout = Duration::from_secs(timeout.into());
    let lsa_refreshp = lsa_refreshp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaRefreshMsg {
            lsdb_id,
            lse_key: lse_id.into(),
        };
        let _ = lsa_refreshp.send(msg);
    })
}

// LSA delayed origination timer task.
pub(crate) fn lsa_orig_delayed_timer(
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
    lsa_base_time: Option<Instant>,
    lsa_orig_delayed_timerp: &Sender<messages::input::LsaOrigDelayedMsg>,
) -> TimeoutTask {
    let lsa_orig_delayed_timerp = lsa_orig_delayed_timerp.clone();

    let lsa_age = lsa_base_time.unwrap().elapsed();
    let timeout =
        Duration::from_secs(lsdb::LSA_MIN_INTERVAL).saturating_sub(lsa_age);

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaOrigDelayedMsg { lsdb_id, lsa_key };
        let _ = lsa_orig_delayed_timerp.send(msg).await;
    })
}

// LSDB MaxAge sweeper interval task.
pub(crate) fn lsdb_maxage_sweep_interval(
    lsdb_id: LsdbId,
    lsdb_maxage_sweep_intervalp: &Sender<messages::input::LsdbMaxAgeSweepMsg>,
) -> IntervalTask {
    let lsdb_maxage_sweep_intervalp = lsdb_maxage_sweep_intervalp.clone();

    let timeout = Duration::from_secs(5);
    IntervalTask::new(timeout, false, move || {
        let lsdb_maxage_sweep_intervalp = lsdb_maxage_sweep_intervalp.clone();
        async move {
            let msg = messages::input::LsdbMaxAgeSweepMsg { lsdb_id };
            let _ = lsdb_maxage_sweep_intervalp.send(msg).await;
        }
    })
}

// SPF delay timer task.
pub(crate) fn spf_delay_timer(
    instance: &InstanceUpView<'_>,
    event: spf::fsm::Event,
    timeout: u32,
) -> TimeoutTask {
    let timeout = Duration::from_millis(timeout.into());
    let spf_delay_eventp = instance.tx.protocol_input.spf_delay_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::SpfDelayEventMsg { event };
        let _ = spf_delay_eventp.send(msg);
    })
}
