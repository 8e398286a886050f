//! Removes a leading interpreter directive (`#!...`) before parsing and
//! remembers it for the executable patcher

use crate::core::{DirectiveStore, StageId};
use crate::stages::{Stage, StageError, TransformContext};
use tracing::debug;

pub struct StripHashbangStage {
    store: DirectiveStore,
}

impl StripHashbangStage {
    pub fn new(store: DirectiveStore) -> Self {
        Self { store }
    }
}

/// Split a leading directive line off `code`, excluding its line terminator
pub fn split_hashbang(code: &str) -> Option<(&str, &str)> {
    if !code.starts_with("#!") {
        return None;
    }
    let end = code.find(['\n', '\r']).unwrap_or(code.len());
    Some((&code[..end], &code[end..]))
}

impl Stage for StripHashbangStage {
    fn id(&self) -> StageId {
        StageId::StripHashbang
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        let Some((directive, rest)) = split_hashbang(code) else {
            return Ok(None);
        };

        debug!("Captured '{}' from {}", directive, ctx.id.display());
        self.store.record(&ctx.id, directive);
        Ok(Some(rest.to_string()))
    }
}
