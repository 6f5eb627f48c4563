//! Build PDF book bundles from packages of HTML documents.
//!
//! A [`Registry`](application::registry::Registry) creates packages from
//! archives, directories or uploads. Each package builds on its own thread
//! and the [`reaper`](application::reaper) removes finished packages once
//! their retention window has passed.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
