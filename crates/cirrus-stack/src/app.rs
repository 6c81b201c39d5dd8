//! Multi-stack application.
//!
//! Each registered stack is composed on its own: it owns its
//! configuration and [`StackState`], so identity tokens and secret
//! handles never leak between stacks of the same run. Stacks without a
//! persisted token get a fresh one that no other stack of the app holds.

use std::collections::BTreeSet;

use cirrus_artifact::Packager;
use cirrus_common::config::StackConfig;
use cirrus_common::error::{CirrusError, Result};

use crate::composer::{self, Synthesis};
use crate::naming;
use crate::state::StackState;

#[derive(Debug)]
struct StackEntry {
    name: String,
    config: StackConfig,
    state: StackState,
}

/// A set of independently synthesized stacks sharing one output directory.
#[derive(Debug)]
pub struct App {
    packager: Packager,
    stacks: Vec<StackEntry>,
}

impl App {
    /// Creates an empty application packaging into `packager`'s output
    /// directory.
    #[must_use]
    pub const fn new(packager: Packager) -> Self {
        Self {
            packager,
            stacks: Vec::new(),
        }
    }

    /// Returns the packager.
    #[must_use]
    pub const fn packager(&self) -> &Packager {
        &self.packager
    }

    /// Registers a stack with its persisted state.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if a stack of that name is already
    /// registered, `state` belongs to another stack, or its identity token
    /// is already held by a registered stack.
    pub fn add_stack(
        &mut self,
        name: impl Into<String>,
        config: StackConfig,
        state: StackState,
    ) -> Result<()> {
        let name = name.into();
        if self.stacks.iter().any(|s| s.name == name) {
            return Err(CirrusError::validation(
                &name,
                "name",
                "stack is already registered in this app",
            ));
        }
        if state.stack != name {
            return Err(CirrusError::validation(
                &name,
                "state",
                format!("state belongs to stack \"{}\"", state.stack),
            ));
        }
        if let Some(token) = &state.identity_token {
            if let Some(holder) = self
                .stacks
                .iter()
                .find(|s| s.state.identity_token.as_ref() == Some(token))
            {
                return Err(CirrusError::validation(
                    &name,
                    "identity_token",
                    format!("token \"{token}\" is already held by stack \"{}\"", holder.name),
                ));
            }
        }
        self.stacks.push(StackEntry {
            name,
            config,
            state,
        });
        Ok(())
    }

    /// Names of the registered stacks, in registration order.
    pub fn stack_names(&self) -> impl Iterator<Item = &str> {
        self.stacks.iter().map(|s| s.name.as_str())
    }

    /// Current state of stack `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StackState> {
        self.stacks.iter().find(|s| s.name == name).map(|s| &s.state)
    }

    /// Composes every stack in registration order.
    ///
    /// Stops at the first failing stack. Stacks composed before it keep
    /// their updated state; the failing stack's state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the first composition error.
    pub fn synth_all(&mut self) -> Result<Vec<Synthesis>> {
        let mut taken: BTreeSet<String> = self
            .stacks
            .iter()
            .filter_map(|s| s.state.identity_token.as_ref())
            .map(|t| t.as_str().to_owned())
            .collect();
        let mut syntheses = Vec::with_capacity(self.stacks.len());
        for entry in &mut self.stacks {
            let mut state = entry.state.clone();
            if state.identity_token.is_none() {
                let token = naming::unique_token(&mut rand::rng(), &taken);
                tracing::info!(stack = %entry.name, token = %token, "allocated identity token");
                let _ = taken.insert(token.as_str().to_owned());
                state.identity_token = Some(token);
            }
            let synthesis =
                composer::compose(&entry.name, &entry.config, &mut state, &self.packager)?;
            entry.state = state;
            syntheses.push(synthesis);
        }
        tracing::info!(stacks = syntheses.len(), "app synthesized");
        Ok(syntheses)
    }
}
