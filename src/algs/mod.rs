//! Distributed algorithms: transport façade, bulk exchange, global vertex
//! numbering, and the layer-crawling protocol driver.

pub mod communicator;
pub mod crawler;
pub mod exchange;
pub mod numbering;
pub mod wire;
