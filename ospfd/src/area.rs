use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use crate::collections::{Interfaces, Lsdb};
use crate::packet::Options;
use crate::route::RouteRtr;
use crate::spf::{Vertex, VertexId};

// OSPF area. A single area is supported (normally the backbone).
#[derive(Debug)]
pub struct Area {
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area state data.
    pub state: AreaState,
    // Area interfaces.
    pub interfaces: Interfaces,
}

// OSPF area state.
#[derive(Debug)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
    // Indicates whether the area can carry data traffic that neither
    // originates nor terminates in the area itself.
    pub transit_capability: bool,
    // Shortest-path tree.
    pub spt: BTreeMap<VertexId, Vertex>,
    // Table of all routers in the area.
    pub routers: BTreeMap<Ipv4Addr, RouteRtr>,
    // Statistics.
    pub spf_run_count: u32,
    pub discontinuity_time: DateTime<Utc>,
}

// ===== impl Area =====

impl Area {
    pub fn new(area_id: Ipv4Addr) -> Self {
        Self {
            area_id,
            state: Default::default(),
            interfaces: Default::default(),
        }
    }

    // Returns whether this is the backbone area.
    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }

    // Returns the options used for sending OSPF Hello and Database
    // Description packets, as well as for originating LSAs.
    pub(crate) fn options(&self) -> Options {
        Options::E
    }
}

impl Default for Area {
    fn default() -> Area {
        Area::new(Ipv4Addr::UNSPECIFIED)
    }
}

// ===== impl AreaState =====

impl Default for AreaState {
    fn default() -> AreaState {
        AreaState {
            lsdb: Default::default(),
            transit_capability: false,
            spt: Default::default(),
            routers: Default::default(),
            spf_run_count: 0,
            discontinuity_time: Utc::now(),
        }
    }
}
