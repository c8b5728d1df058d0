// Domain layer: plain data types and the ports each external service implements.

pub mod model;
pub mod ports;
