#![doc = include_str!("../README.md")]
pub mod chassis;
pub mod configuration;
pub mod distance_controller;
pub mod drive_mixer;
pub mod driver;
pub mod error;
pub mod heading_controller;
pub mod logging;
pub mod motor_group;
