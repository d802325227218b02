#![doc = include_str!("../README.md")]
pub mod audio;
pub mod config;
pub mod controller;
pub mod injector;
pub mod transcriber;
pub mod utils;

pub use config::Config;
pub use controller::{Controller, ControllerBuilder, HotkeyListener, SessionSounds, State};
