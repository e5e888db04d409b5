#![no_std]

// Shared logic for the DHT22 edge-timing controller.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. The firmware and the emulator provide the line, edge,
// timer and deferred-work capabilities; everything that decides what happens
// next lives here.

pub mod attributes;
pub mod config;
pub mod cycle;
pub mod decode;
pub mod orchestrator;
pub mod protocol;
pub mod telemetry;

/// Canonical timestamp units used across the core (microseconds).
pub type TimestampMicros = u64;
