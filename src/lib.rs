//! Meme generation service: picks a template, writes an edit instruction and
//! renders the result through a hosted image model.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod images;
pub mod matching;
pub mod prompt;
pub mod retry;
pub mod service;
pub mod templates;
pub mod web;
