//! Domain layer of the access-control engine.

pub mod context;
pub mod details;
pub mod error;
pub mod filters;
pub mod linkage;
pub mod model;
pub mod ports;
pub mod privileges;
pub mod reattach;
pub mod service;
pub mod token;
pub mod voter;
