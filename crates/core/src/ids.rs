// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers carried on the wire.
//!
//! Unlike `oj-core`'s generated IDs (job/agent ids minted locally), a
//! `RequestId` and `TransactionId` are chosen by the sender and arrive
//! pre-formed on every inbound message. They're cheap to clone
//! (`SmolStr` avoids a heap allocation for the common short-id case) and
//! compare/hash by value so they can key the spool, the mutex registry, and
//! the thread container interchangeably.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(SmolStr);

        impl $name {
            pub fn new(s: impl Into<SmolStr>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

opaque_id!(RequestId);
opaque_id!(TransactionId);

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
