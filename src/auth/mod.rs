//! Bearer-token verification. Tokens are issued by the identity service;
//! this crate only checks them and extracts the numeric user id.

pub mod claims;
pub mod jwt;
