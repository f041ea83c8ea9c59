//! Fuzz target for `ClientEvent::from_json`
//!
//! Feeds arbitrary text to the envelope decoder to find:
//! - Parser crashes or panics
//! - Unexpected acceptance of malformed envelopes
//!
//! The decoder should NEVER panic. All invalid inputs return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pairlink_proto::ClientEvent;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ClientEvent::from_json(text);
    }
});
