//! # credsift
//!
//! Bulk archive unlock and credential-dump harvesting pipeline.
//!
//! ## Overview
//!
//! credsift sweeps a drop directory for ZIP, RAR (including multi-volume
//! sets), and 7z containers of unknown provenance, attempts to unlock them
//! against a ranked password dictionary, recursively resolves archives nested
//! inside archives, and parses any extracted plaintext dumps into canonical
//! `url:username:password` records on a durable append-only stream.
//!
//! ## Pipeline
//!
//! - **Classification**: magic-byte sniffing plus RAR volume-naming rules
//! - **Volume resolution**: multi-part sets collapse to one job keyed on the
//!   canonical first volume and are deleted or quarantined as a unit
//! - **Cracking**: one adapter per format behind a uniform capability trait;
//!   the engine drives the dictionary until first success or exhaustion
//! - **Harvesting**: encoding-sniffed, line-oriented credential parsing with
//!   immediate flushed appends
//! - **Quarantine**: anything unprocessable is moved aside with a reason and
//!   never retried within the run
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use std::path::Path;
//! use credsift::dictionary::PasswordDictionary;
//! use credsift::engine::CrackEngine;
//! use credsift::output::{OutputSink, Quarantine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dictionary = PasswordDictionary::load(Path::new("passwords.txt"));
//! let quarantine = Quarantine::new("quarantine")?;
//! let cancel = Arc::new(AtomicBool::new(false));
//!
//! let mut engine = CrackEngine::new(&dictionary, &quarantine, "pass", cancel);
//! let stats = engine.run(Path::new("input"), false)?;
//!
//! let mut sink = OutputSink::new("credentials.txt")?;
//! let harvest = credsift::parser::harvest_directory(Path::new("pass"), &mut sink)?;
//! println!(
//!     "{} archive(s) unlocked, {} credential(s) harvested",
//!     stats.archives_processed, harvest.records
//! );
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod classify;
pub mod cli;
pub mod constants;
pub mod dictionary;
pub mod engine;
pub mod models;
pub mod output;
pub mod parser;
pub mod summary;
pub mod volumes;
