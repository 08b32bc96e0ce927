//! Integration tests driving a real `Connection` against a scripted broker
//!
//! The broker runs on the other end of an in-memory duplex stream and plays
//! a fixed conversation, checking every frame the client sends.

mod broker;
mod channel_tests;
mod handshake_tests;
