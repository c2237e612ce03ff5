//! Reusable multi-node fixtures.

mod faulty;
mod two_node;

pub use faulty::{Fault, FaultyTransport};
pub use two_node::{
    CONTROLLER_NODE_ID, DEVICE_NODE_ID, ECHO_PROTOCOL, EchoHandler, FABRIC_ID, PASSCODE, SALT,
    TwoNodeFixture,
};
