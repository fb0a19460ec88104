//! OmniChat is a terminal chat client for Gemini models that keeps many
//! independent conversations and streams replies as they are generated.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session store, the streaming merge loop, the model
//!   catalog, persisted settings and configuration.
//! - [`api`] defines the Gemini request and response payloads.
//! - [`ui`] runs the line-oriented chat loop and renders transcripts.
//! - [`commands`] implements slash-command parsing and execution.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
