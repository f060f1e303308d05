//! A master and a slave engine talking over an in-memory pair link.
//!
//! Run with `RUST_LOG=trace cargo run --example pair_demo` to watch the
//! engine's framing decisions.

use std::sync::{Arc, Mutex};
use std::time::Instant;
use wirebus_core::pdu::request::ReadInputRegistersRequest;
use wirebus_core::pdu::response::ReadInputRegistersResponse;
use wirebus_core::{Bus, Config, Framing, Packet, Role};
use wirebus_link::PairLink;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();

    let started = Instant::now();
    let clock = move || i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    let (master_end, slave_end) = PairLink::pair();

    let slave_inbox = Arc::new(Mutex::new(Vec::new()));
    let inbox = Arc::clone(&slave_inbox);
    let slave = Bus::new(
        &slave_end,
        Config::new(Role::Slave, Framing::Tcp, clock).with_address(0x11),
        move |packet| inbox.lock().unwrap().push(packet),
    )
    .expect("slave bus");

    let started = Instant::now();
    let clock = move || i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let master = Bus::new(
        &master_end,
        Config::new(Role::Master, Framing::Tcp, clock),
        |packet| println!("master received {packet:?}"),
    )
    .expect("master bus");

    let request = ReadInputRegistersRequest::new(1, 0x11, 0x0010, 2);
    master
        .send(&Packet::ReadInputRegistersRequest(request))
        .expect("send request");

    let requests = slave_inbox.lock().unwrap().clone();
    for packet in &requests {
        println!("slave received {packet:?}");
        if let Packet::ReadInputRegistersRequest(request) = packet {
            let response = ReadInputRegistersResponse::new(
                request.header.transaction_id,
                request.header.address,
                vec![0x0102, 0x0304],
            );
            slave
                .send(&Packet::ReadInputRegistersResponse(response))
                .expect("send response");
        }
    }
}
