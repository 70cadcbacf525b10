//! Domain model: shipments, rates, payments, tracking, and the ports the
//! application layer talks through.

pub mod carrier;
pub mod ids;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod rate;
pub mod shipment;
pub mod tracking;
