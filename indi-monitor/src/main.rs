//! # INDI Monitor
//!
//! Connects to an INDI server, logs every device and property event for a while and prints
//! the resulting device tree. Switches given with `--switch` are turned on once their vector
//! has been defined.
use std::error::Error;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::Parser;
use env_logger::Env;
use indi_client::{
    Client, Event,
    config::{Builder, DEFAULT_PORT},
    model::{Model, VectorId},
};

#[derive(Clone, Debug, Eq, PartialEq)]
struct SwitchTarget {
    device: String,
    vector: String,
    member: String,
}

impl FromStr for SwitchTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(device), Some(vector), Some(member))
                if !device.is_empty() && !vector.is_empty() && !member.is_empty() =>
            {
                Ok(SwitchTarget {
                    device: device.to_string(),
                    vector: vector.to_string(),
                    member: member.to_string(),
                })
            }
            _ => Err(format!("expected DEVICE/VECTOR/MEMBER, got '{}'", s)),
        }
    }
}

#[derive(Parser)]
#[command(about = "Monitor the devices and properties of an INDI server", long_about=None)]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "10", help = "How long to monitor the server")]
    seconds: u64,

    #[arg(long = "switch", value_name = "DEVICE/VECTOR/MEMBER", help = "Switch to turn on")]
    switches: Vec<SwitchTarget>,
}

fn log_event(event: &Event) {
    match event {
        Event::Error(err) => log::error!("{}", err),
        Event::RawReceived { size, xml } => log::trace!("Received {} bytes: {}", size, xml),
        Event::RawSent { size, xml } => log::debug!("Sent {} bytes: {}", size, xml),
        Event::PropertyWillChange { .. } => {}
        Event::PropertyDidChange { property, value } => log::info!("{} = {}", property, value),
        Event::ServerMessage { device, message } => {
            log::info!("[{}] {}", device.as_deref().unwrap_or("server"), message)
        }
        other => log::info!("{:?}", other),
    }
}

fn print_summary(model: &Model) {
    for device in model.devices() {
        println!("{}", device.name());
        for group in model.groups(device.id()) {
            println!("  {}", group);
            for vector in model.vectors_in_group(device.id(), group) {
                println!(
                    "    {} ({}) [{}]",
                    vector.ui_label(),
                    vector.kind(),
                    vector.state()
                );
                for member in vector.members() {
                    println!("      {} = {}", member.ui_label(), member.value());
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("Parsed arguments: host={}, port={}", args.host, args.port);

    let config = Builder::new().label("indi-monitor").build();
    let mut client = Client::with_config(config, log_event);
    client.set_server(args.host.clone(), args.port)?;
    client.connect();

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut pending = args.switches;
    while Instant::now() < deadline {
        client.process_next(Duration::from_millis(100));
        client.process_pending();

        let mut remaining = Vec::new();
        for target in pending {
            let id = VectorId::new(target.device.as_str(), target.vector.as_str());
            if client.model().lookup_vector(&id).is_none() {
                remaining.push(target);
                continue;
            }
            log::info!("Turning on {}/{}", id, target.member);
            if let Err(err) = client.switch_on(&target.device, &target.vector, &target.member) {
                log::error!("{}", err);
            }
        }
        pending = remaining;
    }

    for target in &pending {
        log::warn!("{}/{} was never defined", target.device, target.vector);
    }
    client.disconnect();
    print_summary(client.model());
    Ok(())
}
