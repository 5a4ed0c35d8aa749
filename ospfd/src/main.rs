#![warn(rust_2018_idioms)]

use std::path::Path;

use clap::{App, Arg};
use nix::unistd::Uid;
use ospfd::area::Area;
use ospfd::config::{Config, InterfaceConfig};
use ospfd::instance::{
    self, ControlMsg, Instance, InstanceArenas, InstanceChannelsTx,
    InstanceCfg,
};
use ospfd::interface::StaticNbr;
use ospfd::southbound;
use ospfd_utils::UnboundedSender;
use ospfd_utils::southbound::InterfaceUpdate;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

fn init_tracing(daemonized: bool, log_file: &str) {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("ospfd=debug".parse().unwrap())
        .from_env_lossy();

    if daemonized {
        // Log to the configured log file.
        let path = Path::new(log_file);
        let dir = path.parent().unwrap_or_else(|| Path::new("/tmp"));
        let name = path
            .file_name()
            .map(|name| name.to_owned())
            .unwrap_or_else(|| "ospf_daemon.log".into());
        let file_appender = rolling::never(dir, name);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .init();
    } else {
        // Log to stdout.
        let layer = tracing_subscriber::fmt::layer().with_target(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .init();
    }
}

// Builds the OSPF instance from the parsed configuration and the system
// interface data.
fn init_instance(
    config: &Config,
    system_interfaces: Vec<InterfaceUpdate>,
    tx: InstanceChannelsTx,
) -> Instance {
    let mut instance_cfg = InstanceCfg::default();
    instance_cfg.router_id = config.router_id;

    let mut instance = Instance::new(instance_cfg, tx);
    instance.arenas = InstanceArenas {
        area: Area::new(config.area_id),
        ..Default::default()
    };

    // Create configured interfaces.
    for iface_cfg in &config.interface {
        let arenas = &mut instance.arenas;
        let (_, iface) = arenas
            .area
            .interfaces
            .insert(&mut arenas.interfaces, &iface_cfg.name);

        // Apply interface configuration.
        apply_interface_config(iface, iface_cfg);

        // Fill in system data discovered from the kernel.
        if let Some(system_iface) = system_interfaces
            .iter()
            .find(|system_iface| system_iface.ifname == iface_cfg.name)
        {
            iface.system.flags = system_iface.flags;
            iface.system.ifindex = Some(system_iface.ifindex);
            iface.system.mtu = Some(system_iface.mtu as u16);
            iface.system.addr_list = system_iface.addresses.clone();
            iface.system.primary_addr =
                system_iface.addresses.iter().copied().next();
        } else {
            warn!(name = %iface_cfg.name, "interface not found in the system");
        }
    }

    instance
}

fn apply_interface_config(
    iface: &mut ospfd::interface::Interface,
    iface_cfg: &InterfaceConfig,
) {
    iface.config.if_type = iface_cfg.if_type.into();
    iface.config.passive = iface_cfg.passive;
    iface.config.priority = iface_cfg.router_priority;
    iface.config.hello_interval = iface_cfg.hello_interval;
    iface.config.dead_interval = iface_cfg.router_dead_interval;
    iface.config.retransmit_interval = iface_cfg.rxmt_interval;
    iface.config.transmit_delay = iface_cfg.inf_trans_delay;
    iface.config.cost = iface_cfg.cost;
    iface.config.mtu_ignore = iface_cfg.mtu_ignore;
    iface.config.static_nbrs = iface_cfg
        .neighbor
        .iter()
        .map(|nbr| {
            (
                nbr.address,
                StaticNbr {
                    priority: nbr.priority,
                    poll_interval: nbr.poll_interval,
                },
            )
        })
        .collect();
}

// Reads operator commands from stdin and relays them to the instance task.
async fn control_loop(control_tx: UnboundedSender<ControlMsg>) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "exit" => {
                let _ = control_tx.send(ControlMsg::Shutdown);
                break;
            }
            "debug" => {
                let _ = control_tx.send(ControlMsg::DumpState);
            }
            "" => (),
            command => {
                eprintln!("unknown command: {}", command);
            }
        }
    }
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("OSPFv2 routing daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("daemon")
                .short("d")
                .long("daemon")
                .help("Run in the background as a daemon."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(1);
    }

    // Detach from the controlling terminal when requested.
    let daemonized = matches.is_present("daemon");
    if daemonized && let Err(error) = nix::unistd::daemon(false, false) {
        eprintln!("failed to daemonize: {}", error);
        std::process::exit(1);
    }

    // Initialize tracing.
    init_tracing(daemonized, &config.log_file);

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    // We're ready to go!
    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            // Discover the system interfaces.
            let system_interfaces = match southbound::interfaces_discover() {
                Ok(interfaces) => interfaces,
                Err(error) => {
                    error!(%error, "failed to enumerate system interfaces");
                    std::process::exit(1);
                }
            };

            // Start the southbound task.
            let (southbound_tx, southbound_rx) = mpsc::unbounded_channel();
            let _southbound_task = southbound::spawn_task(southbound_rx);

            // Create the instance channels.
            let (protocol_input_tx, protocol_input_rx) =
                instance::protocol_input_channels();
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            let tx = InstanceChannelsTx {
                protocol_input: protocol_input_tx,
                southbound: southbound_tx,
            };

            // Build the OSPF instance.
            let instance = init_instance(&config, system_interfaces, tx);

            // Start the control loop, unless running detached.
            if !daemonized {
                tokio::spawn(control_loop(control_tx.clone()));
            }

            // Initiate a graceful shutdown upon receiving SIGINT.
            let shutdown_tx = control_tx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(ControlMsg::Shutdown);
                }
            });

            // Run the instance event loop.
            instance.run(protocol_input_rx, control_rx).await;

            info!("exiting");
        });
}
