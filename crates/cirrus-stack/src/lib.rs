//! # cirrus-stack
//!
//! Composition of the serverless web stack.
//!
//! Provides the main entry points:
//! - [`compose`](composer::compose): Builds, resolves, and synthesizes one stack.
//! - [`App`](app::App): Synthesizes several independent stacks in one run.
//! - [`NameAllocator`](naming::NameAllocator): Deterministic resource names.
//! - [`SecretGenerator`](secret::SecretGenerator): Stable, stack-scoped secret handles.
//! - [`StackState`](state::StackState): Identity state persisted between runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use cirrus_artifact::Packager;
//! use cirrus_common::config::StackConfig;
//! use cirrus_stack::{composer, state::StackState};
//!
//! let config = StackConfig::load(std::path::Path::new("stack.yaml"))?;
//! let mut state = StackState::new("job-board");
//! let synthesis = composer::compose("job-board", &config, &mut state, &Packager::new("cirrus.out"))?;
//! println!("{}", synthesis.document.to_json()?);
//! # Ok::<(), cirrus_common::error::CirrusError>(())
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod app;
pub mod composer;
pub mod naming;
pub mod secret;
pub mod state;

pub use app::App;
pub use composer::{Synthesis, compose};
