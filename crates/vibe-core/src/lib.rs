//! Agent facade, event dispatch, and behavior lifecycle for the Vibe bot.
//!
//! This crate owns everything between the environment connection and the
//! behaviors that drive the agent: the event dispatcher with its 20-tick
//! scheduling window, the agent facade over the connection, the behavior
//! attach/detach lifecycle, and the strategy contract.
//!
//! # Modules
//!
//! - [`action`] -- [`Behavior`] trait and the [`Action`] attach/detach
//!   lifecycle with tick-offset gating.
//! - [`agent`] -- [`Agent`] facade: connection lifecycle, spawn activation,
//!   reconnects, state queries, movement, eating, trading.
//! - [`clock`] -- Tick counter wrapping over the 20-tick window.
//! - [`config`] -- Configuration loading from `vibe-config.yaml` into
//!   strongly-typed structs.
//! - [`connection`] -- [`Connector`]/[`Connection`] traits for the external
//!   environment.
//! - [`dispatcher`] -- Ordered, gated, failure-isolating event dispatch.
//! - [`loopback`] -- In-process environment for dry runs and tests.
//! - [`registry`] -- Static item and food data.
//! - [`strategy`] -- [`Strategy`] trait and shared run state.
//!
//! [`Behavior`]: action::Behavior
//! [`Action`]: action::Action
//! [`Agent`]: agent::Agent
//! [`Connector`]: connection::Connector
//! [`Connection`]: connection::Connection
//! [`Strategy`]: strategy::Strategy

pub mod action;
pub mod agent;
pub mod clock;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod loopback;
pub mod registry;
pub mod strategy;
