//! Fuzz target for node configuration parsing
//!
//! Arbitrary TOML must be rejected cleanly, never panic.

#![no_main]

use hearth_core::node::NodeConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<NodeConfig>(s) {
            let _ = config.validate();
            if let Some(commissioning) = &config.commissioning {
                let _ = commissioning.salt_bytes();
            }
        }
    }
});
