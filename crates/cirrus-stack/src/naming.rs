//! Deterministic resource naming.
//!
//! Names that only need to be unique within a stack are
//! `{stack}-{role}`. Names that live in a provider-global namespace
//! (buckets, roles, functions) append the stack's identity token:
//! `{stack}-{role}-{token}`. The token is taken from [`StackState`] and
//! only generated when none was persisted, so a stack keeps its names
//! across deployments.

use std::collections::BTreeSet;

use cirrus_common::constants::MAX_GLOBAL_NAME_LENGTH;
use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::{IdentityToken, is_kebab_segment};
use rand::Rng;

use crate::state::StackState;

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "clever", "cosmic", "crisp", "daring", "eager", "fancy", "gentle",
    "golden", "happy", "humble", "jolly", "keen", "lively", "lucky", "merry", "mighty", "noble",
    "polite", "proud", "quick", "quiet", "rapid", "shiny", "steady", "sunny", "swift", "tidy",
    "vivid", "witty",
];

const ANIMALS: &[&str] = &[
    "badger", "beaver", "bison", "condor", "coyote", "falcon", "ferret", "gecko", "heron",
    "ibis", "jackal", "koala", "lemur", "lynx", "marmot", "mink", "newt", "ocelot", "osprey",
    "otter", "panda", "puffin", "quail", "raven", "salmon", "stork", "tapir", "toucan", "walrus",
    "weasel", "yak", "zebra",
];

/// Range of the six-hex-digit suffix appended to the two words.
const SUFFIX_SPACE: u32 = 1 << 24;

/// Generates a pronounceable token such as `brave-otter-3fa9c1`.
///
/// The two words keep tokens readable; the 24-bit suffix keeps them apart
/// in provider-global namespaces.
pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> IdentityToken {
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.random_range(0..ANIMALS.len())];
    let suffix = rng.random_range(0..SUFFIX_SPACE);
    IdentityToken::new(format!("{adjective}-{animal}-{suffix:06x}"))
        .unwrap_or_else(|_| unreachable!("word lists are lowercase kebab-case"))
}

/// Generates a token that is not in `taken`.
pub fn unique_token<R: Rng + ?Sized>(rng: &mut R, taken: &BTreeSet<String>) -> IdentityToken {
    loop {
        let token = generate_token(rng);
        if !taken.contains(token.as_str()) {
            return token;
        }
        tracing::debug!(token = %token, "identity token already taken, drawing again");
    }
}

/// Allocates resource names for one stack.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    stack: String,
    token: IdentityToken,
}

impl NameAllocator {
    /// Creates an allocator for `stack`, taking the identity token from
    /// `state` or generating and recording one.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the stack name is not
    /// lowercase kebab-case.
    pub fn new(stack: &str, state: &mut StackState) -> Result<Self> {
        if !is_kebab_segment(stack) {
            return Err(CirrusError::validation(
                stack,
                "name",
                "stack names must be lowercase kebab-case",
            ));
        }
        let token = match &state.identity_token {
            Some(token) => token.clone(),
            None => {
                let token = generate_token(&mut rand::rng());
                tracing::info!(stack, token = %token, "allocated identity token");
                state.identity_token = Some(token.clone());
                token
            }
        };
        Ok(Self {
            stack: stack.to_owned(),
            token,
        })
    }

    /// Returns the identity token.
    #[must_use]
    pub const fn token(&self) -> &IdentityToken {
        &self.token
    }

    /// Returns the stack name.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Name unique within the stack: `{stack}-{role}`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if `role` is not kebab-case.
    pub fn allocate(&self, role: &str) -> Result<String> {
        check_role(role)?;
        Ok(format!("{}-{role}", self.stack))
    }

    /// Globally unique name: `{stack}-{role}-{token}`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if `role` is not kebab-case or the
    /// name exceeds the global name length limit.
    pub fn allocate_global(&self, role: &str) -> Result<String> {
        check_role(role)?;
        let name = format!("{}-{role}-{}", self.stack, self.token);
        if name.len() > MAX_GLOBAL_NAME_LENGTH {
            return Err(CirrusError::validation(
                role,
                "name",
                format!(
                    "global name \"{name}\" exceeds {MAX_GLOBAL_NAME_LENGTH} characters"
                ),
            ));
        }
        Ok(name)
    }
}

fn check_role(role: &str) -> Result<()> {
    if is_kebab_segment(role) {
        Ok(())
    } else {
        Err(CirrusError::validation(
            role,
            "role",
            "resource roles must be lowercase kebab-case",
        ))
    }
}
