//! One-of-two JSON shapes
//!
//! ActivityStreams fields often hold either a bare value or an object (an IRI
//! or an embedded document, a context URL or a context map). Decoding tries
//! `Left` first and keeps the first variant that parses.

use serde::{Deserialize, Serialize};

/// Value that decodes as either `L` or `R`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    /// Left value, if this is `Left`
    pub fn left(&self) -> Option<&L> {
        match self {
            Either::Left(value) => Some(value),
            Either::Right(_) => None,
        }
    }

    /// Right value, if this is `Right`
    pub fn right(&self) -> Option<&R> {
        match self {
            Either::Left(_) => None,
            Either::Right(value) => Some(value),
        }
    }
}

/// A JSON-LD `@context` entry: a context IRI or an inline term map
pub type ContextItem = Either<String, serde_json::Map<String, serde_json::Value>>;

/// A JSON-LD `@context` that is either a single entry or a list of entries
pub type Context = Either<ContextItem, Vec<ContextItem>>;
