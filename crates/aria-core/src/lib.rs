//! # aria-core
//!
//! Foundation types, errors, and branded IDs for the Aria music daemon.
//!
//! This crate provides the shared vocabulary that all other Aria crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::TrackId`] (content address) and [`ids::JobId`]
//!   as newtypes
//! - **Requests**: [`request::GenerateRequest`] with per-back-end validation
//! - **Jobs & tracks**: [`job::Job`], [`track::Track`] lifecycle records
//! - **Back-ends**: [`backend::BackendKind`] tagged dispatch,
//!   [`backend::BackendDescriptor`] status surface
//! - **Errors**: [`errors::ErrorKind`] taxonomy with stable integer and
//!   string codes, surfaced in RPC errors and terminal notifications
//! - **Notifications**: [`events::Notification`] server-initiated events
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other aria crates.

#![deny(unsafe_code)]

pub mod backend;
pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod request;
pub mod track;
