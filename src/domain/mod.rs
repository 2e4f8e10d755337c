//! Domain model: subscriptions, ledger entries, notifications, time, and the
//! ports the engine drives.

pub mod clock;
pub mod money;
pub mod notification;
pub mod ports;
pub mod subscription;
pub mod transaction;
