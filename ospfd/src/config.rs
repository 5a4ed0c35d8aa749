use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::interface::InterfaceType;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // Area ID (a single area is supported).
    pub area_id: Ipv4Addr,
    // Log file used when running as a daemon.
    pub log_file: String,
    // OSPF interfaces.
    pub interface: Vec<InterfaceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub if_type: InterfaceTypeConfig,
    pub passive: bool,
    pub router_priority: u8,
    pub hello_interval: u16,
    pub router_dead_interval: u16,
    pub rxmt_interval: u16,
    pub inf_trans_delay: u16,
    pub cost: u16,
    pub mtu_ignore: bool,
    pub neighbor: Vec<StaticNbrConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceTypeConfig {
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    VirtualLink,
}

// Statically configured neighbor (NBMA and Point-to-MultiPoint networks).
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct StaticNbrConfig {
    pub address: Ipv4Addr,
    pub priority: u8,
    pub poll_interval: u16,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ospfd.toml";

    // Parses the configuration file.
    pub fn load(config_file: Option<&str>) -> Config {
        let path = config_file.unwrap_or(Config::DFLT_FILEPATH);
        match std::fs::read_to_string(path) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("failed to parse configuration file"),
            Err(error) => {
                eprintln!(
                    "failed to load configuration file {}: {}",
                    path, error
                );
                eprintln!("falling back to default configuration");
                Config::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            router_id: Ipv4Addr::UNSPECIFIED,
            area_id: Ipv4Addr::UNSPECIFIED,
            log_file: "/tmp/ospf_daemon.log".to_owned(),
            interface: vec![],
        }
    }
}

// ===== impl InterfaceConfig =====

impl Default for InterfaceConfig {
    fn default() -> InterfaceConfig {
        InterfaceConfig {
            name: String::new(),
            if_type: InterfaceTypeConfig::Broadcast,
            passive: false,
            router_priority: 1,
            hello_interval: 10,
            router_dead_interval: 40,
            rxmt_interval: 5,
            inf_trans_delay: 1,
            cost: 1,
            mtu_ignore: false,
            neighbor: vec![],
        }
    }
}

// ===== impl InterfaceTypeConfig =====

impl From<InterfaceTypeConfig> for InterfaceType {
    fn from(if_type: InterfaceTypeConfig) -> InterfaceType {
        match if_type {
            InterfaceTypeConfig::Broadcast => InterfaceType::Broadcast,
            InterfaceTypeConfig::NonBroadcast => InterfaceType::NonBroadcast,
            InterfaceTypeConfig::PointToMultipoint => {
                InterfaceType::PointToMultipoint
            }
            InterfaceTypeConfig::PointToPoint => InterfaceType::PointToPoint,
            InterfaceTypeConfig::VirtualLink => InterfaceType::VirtualLink,
        }
    }
}

// ===== impl StaticNbrConfig =====

impl Default for StaticNbrConfig {
    fn default() -> StaticNbrConfig {
        StaticNbrConfig {
            address: Ipv4Addr::UNSPECIFIED,
            priority: 0,
            poll_interval: 120,
        }
    }
}
