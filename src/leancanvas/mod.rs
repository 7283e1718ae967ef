// src/leancanvas/mod.rs

pub mod agent;
pub mod canvas;
pub mod canvas_store;
pub mod canvas_tools;
pub mod change;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod memory;
pub mod mutation;
pub mod network;
pub mod reconciler;
pub mod runtime;
#[cfg(feature = "server")]
pub mod server;
pub mod specialists;
pub mod stream_event;
pub mod think;
pub mod tool_protocol;
