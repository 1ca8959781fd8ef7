//! # Arena Client Library
//!
//! Headless client for the vehicle combat arena. It connects over UDP, walks
//! through the join flow on the reliable channel, drives its car with a
//! scripted driver and keeps a local simulation of every car in sync with
//! the authoritative server.
//!
//! ## Prediction and Correction
//!
//! The local car responds to its own inputs immediately; the server hears
//! about them one round trip later. Every car, local or remote, runs the
//! same vehicle model and fixed-step clock as the server. When a snapshot
//! arrives it replaces the car's pending correction (the newest wins) and is
//! consumed once on the next physics frame:
//! - more than [`shared::SNAP_DISTANCE`] away: teleport onto the snapshot
//! - more than [`shared::BLEND_DISTANCE`] away: move 90% of the way, take
//!   the snapshot's velocities as they are
//! - otherwise leave the car alone
//!
//! ## Module Organization
//!
//! - `driver`: random scripted controls for load testing
//! - `game`: local world, snapshot buffer and correction policy
//! - `input`: input sequencing, change detection and keep-alive
//! - `network`: UDP loop, reliable RPC flow and event logging

pub mod driver;
pub mod game;
pub mod input;
pub mod network;
