//! Route handlers

pub mod calibration;
pub mod chat;
pub mod frames;
pub mod monitoring;
pub mod settings;
pub mod stats;
