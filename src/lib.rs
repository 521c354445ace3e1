//! Daily food intake log service: per-user day records, meal grouping and
//! nutrient scaling over an external food catalog, plus weight history.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod intake;
pub mod state;
pub mod storage;
pub mod validation;
pub mod weights;
