// nsfwd: local NSFW image check service
//
// This is the library root. The binary in main.rs wires these together:
// config → model (one capability, loaded once) → policy → web.

pub mod check;
pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod web;
