//! Fuzz target for the relay driver event loop
//!
//! Drives the sans-IO core with arbitrary event sequences to find:
//! - Panics on stale or contradictory state transitions
//! - Rooms left tracked with fewer than two occupants
//! - Waiting-queue entries surviving their connection
//!
//! # Invariants
//!
//! - The driver never panics, whatever the event order
//! - A tracked room always holds exactly two occupants between events
//! - Presence count never exceeds the number of open connections

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pairlink_proto::{ClientEvent, Init, RandomCallWaiting};
use pairlink_server::{DriverConfig, RelayDriver, RelayEvent, SystemEnv};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedOp {
    Open { conn: u8 },
    Init { conn: u8, user: u8 },
    Wait { conn: u8, user: u8 },
    Leave { conn: u8 },
    Close { conn: u8 },
}

fuzz_target!(|ops: Vec<FuzzedOp>| {
    let env = SystemEnv::new();
    let mut driver = RelayDriver::new(env, DriverConfig::default());

    for op in ops {
        let event = match op {
            FuzzedOp::Open { conn } => RelayEvent::ConnectionOpened { connection_id: conn.into() },
            FuzzedOp::Init { conn, user } => RelayEvent::EventReceived {
                connection_id: conn.into(),
                event: ClientEvent::Init(Init {
                    user_id: format!("user-{user}"),
                    first_name: None,
                }),
            },
            FuzzedOp::Wait { conn, user } => RelayEvent::EventReceived {
                connection_id: conn.into(),
                event: ClientEvent::RandomCallWaiting(RandomCallWaiting {
                    user_id: format!("user-{user}"),
                    name: format!("user-{user}"),
                }),
            },
            FuzzedOp::Leave { conn } => RelayEvent::EventReceived {
                connection_id: conn.into(),
                event: ClientEvent::LeaveRandomCall,
            },
            FuzzedOp::Close { conn } => RelayEvent::ConnectionClosed {
                connection_id: conn.into(),
                reason: "fuzzed close".to_string(),
            },
        };

        let _ = driver.process_event(event);

        assert!(driver.online_count() <= driver.connection_count());
    }
});
