// libs/appointment-cell/src/services/mod.rs
pub mod access;
pub mod availability;
pub mod booking;
pub mod conflict;
pub mod dashboard;
pub mod directory;
pub mod lifecycle;
pub mod locks;
pub mod notification;
pub mod time_utils;
pub mod working_hours;
