// Pattern compiler - turns fact templates plus a context into concrete facts

//! # Pattern Compiler
//!
//! Compiling is a pure function of `(pattern, context)`:
//!
//! 1. Directive lines are skipped
//! 2. Each triple line becomes a candidate fact; placeholder slots are
//!    resolved by looking their name up in the context, and keep their
//!    authored uid and name when the context has no such entry
//! 3. The candidate is kept **only if** both objects and the relation ended up
//!    with a uid and a name
//!
//! Dropping incomplete candidates is how optional fields are skipped: a step
//! whose user left a field empty simply contributes fewer facts. It is not an
//! error and is not reported as one.

use tracing::trace;

use crate::models::{Context, Fact, Pattern, Slot, UidRef, Uid};
use crate::Result;

/// Stateless compiler for step fact templates
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternCompiler;

impl PatternCompiler {
    pub fn new() -> Self {
        PatternCompiler
    }

    /// Resolve one object slot against the context
    ///
    /// A placeholder whose name is not in the context keeps its authored uid
    /// and name. Placeholder `0` counts as no uid, so its fact is dropped.
    fn resolve_slot(&self, slot: &Slot, context: &Context) -> (Option<Uid>, String) {
        match slot.uid {
            UidRef::Literal(uid) => (Some(uid), slot.name.clone()),
            UidRef::Placeholder(n) => match context.get(&slot.name) {
                Some(entry) => (entry.uid, entry.value.clone()),
                None => ((n > 0).then_some(Uid::from(n)), slot.name.clone()),
            },
        }
    }

    /// Compile every triple line of `pattern`, in line order
    pub fn compile(&self, pattern: &Pattern, context: &Context) -> Vec<Fact> {
        pattern
            .triples()
            .filter_map(|(lhs, rel, rhs)| {
                let fact = Fact::triple(
                    self.resolve_slot(lhs, context),
                    (Some(rel.uid), rel.name.clone()),
                    self.resolve_slot(rhs, context),
                );
                if fact.is_complete() {
                    Some(fact)
                } else {
                    trace!(lhs = %lhs.name, rel = %rel.name, rhs = %rhs.name, "skipping incomplete fact template");
                    None
                }
            })
            .collect()
    }

    /// Parse raw template lines and compile them
    ///
    /// Used for ad-hoc templates that were not validated at load time.
    pub fn compile_lines<I, S>(&self, lines: I, context: &Context) -> Result<Vec<Fact>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pattern = Pattern::parse(lines)?;
        Ok(self.compile(&pattern, context))
    }
}
