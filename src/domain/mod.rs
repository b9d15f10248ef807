pub mod errors;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod webhook;
