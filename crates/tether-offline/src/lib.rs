//! `tether-offline`: the offline data contract consumed by UI code.
//!
//! [`OfflineDataFacade`] wires a connectivity monitor, a snapshot cache, the
//! mutation queue and the sync coordinator together. It is the only type
//! that knows about all four; none of them know about it.

pub mod facade;

pub use facade::OfflineDataFacade;
