//! Domain model: loan applications, wire message catalogue, delivery log and the ports the
//! application layer talks to.

pub mod charges;
pub mod loan;
pub mod message;
pub mod message_log;
pub mod money;
pub mod ports;
