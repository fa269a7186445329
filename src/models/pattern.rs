// Fact pattern grammar - typed AST and parser for step fact templates

//! # Fact Patterns
//!
//! Step specs author their fact templates as short text lines:
//!
//! ```text
//! @full_definition:?definition
//! 1.NewConcept? > 1146.is a specialization of > 2.Supertype?
//! 730044.Physical Object > 1981.is a whole for > 3.Part?*
//! ```
//!
//! The grammar is:
//!
//! ```text
//! line        := directive | triple
//! directive   := '@' key ':' value
//! triple      := slot '>' relation '>' slot
//! slot        := uid '.' name ['?'] [cardinality]
//! relation    := uid '.' name
//! cardinality := '*' | '+'
//! ```
//!
//! A slot uid in `0..=99` is a **placeholder**: at compile time it is replaced
//! by the context entry named after the slot (with the `?` marker removed).
//! Any larger uid is a literal knowledge-graph uid.
//!
//! The text form is only an authoring format. Lines are parsed once, when the
//! definition is loaded, into the types below; the compiler never looks at
//! strings again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fact::Uid;
use crate::engine::temp_id::TempIdAllocator;

/// Why a pattern line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("line {line:?}: expected '<lhs> > <rel> > <rhs>', found {parts} part(s)")]
    Arity { line: String, parts: usize },

    #[error("line {line:?}: directive must look like '@key:value'")]
    Directive { line: String },

    #[error("slot {slot:?}: expected '<uid>.<name>'")]
    Slot { slot: String },

    #[error("slot {slot:?}: uid {uid:?} is not a non-negative integer")]
    Uid { slot: String, uid: String },

    #[error("slot {slot:?}: name is empty")]
    EmptyName { slot: String },
}

/// How a slot's uid is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidRef {
    /// A real knowledge-graph uid, used verbatim
    Literal(Uid),
    /// A reference into the context, resolved by the slot's name
    Placeholder(u8),
}

/// Repeatable-slot marker; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// `*`: zero or more
    Many,
    /// `+`: one or more
    AtLeastOne,
}

/// One object position of a triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub uid: UidRef,
    /// Name with the `?` marker and cardinality stripped
    pub name: String,
    /// Whether the name carried a `?` marker
    pub queried: bool,
    pub cardinality: Option<Cardinality>,
}

/// The relation position of a triple; never a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub uid: Uid,
    pub name: String,
}

/// One parsed pattern line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternLine {
    Directive { key: String, value: String },
    Triple { lhs: Slot, rel: Relation, rhs: Slot },
}

/// An ordered list of pattern lines
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Pattern {
    lines: Vec<PatternLine>,
}

fn split_uid(text: &str) -> Result<(Uid, &str), PatternError> {
    let (uid, name) = text.split_once('.').ok_or_else(|| PatternError::Slot {
        slot: text.to_string(),
    })?;
    let uid = uid.trim();
    let uid = uid.parse::<Uid>().map_err(|_| PatternError::Uid {
        slot: text.to_string(),
        uid: uid.to_string(),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(PatternError::EmptyName {
            slot: text.to_string(),
        });
    }
    Ok((uid, name))
}

impl std::str::FromStr for Slot {
    type Err = PatternError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (uid, mut name) = split_uid(text)?;

        let cardinality = match name.chars().last() {
            Some('*') => Some(Cardinality::Many),
            Some('+') => Some(Cardinality::AtLeastOne),
            _ => None,
        };
        if cardinality.is_some() {
            name = name[..name.len() - 1].trim_end();
        }
        let queried = name.ends_with('?');
        if queried {
            name = name[..name.len() - 1].trim_end();
        }
        if name.is_empty() {
            return Err(PatternError::EmptyName {
                slot: text.to_string(),
            });
        }

        let uid = if TempIdAllocator::is_provisional(uid) {
            // provisional range is 0..=99 so this always fits
            UidRef::Placeholder(uid as u8)
        } else {
            UidRef::Literal(uid)
        };

        Ok(Slot {
            uid,
            name: name.to_string(),
            queried,
            cardinality,
        })
    }
}

impl std::str::FromStr for Relation {
    type Err = PatternError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (uid, name) = split_uid(text.trim())?;
        Ok(Relation {
            uid,
            name: name.to_string(),
        })
    }
}

impl std::str::FromStr for PatternLine {
    type Err = PatternError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let line = text.trim();

        if let Some(rest) = line.strip_prefix('@') {
            let (key, value) = rest.split_once(':').ok_or_else(|| PatternError::Directive {
                line: line.to_string(),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(PatternError::Directive {
                    line: line.to_string(),
                });
            }
            return Ok(PatternLine::Directive {
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }

        let parts: Vec<&str> = line.split('>').collect();
        if parts.len() != 3 {
            return Err(PatternError::Arity {
                line: line.to_string(),
                parts: parts.len(),
            });
        }

        Ok(PatternLine::Triple {
            lhs: parts[0].parse()?,
            rel: parts[1].parse()?,
            rhs: parts[2].parse()?,
        })
    }
}

impl Pattern {
    /// Parse authored lines; blank lines are skipped
    pub fn parse<I, S>(lines: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = lines
            .into_iter()
            .filter(|l| !l.as_ref().trim().is_empty())
            .map(|l| l.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pattern { lines })
    }

    pub fn lines(&self) -> &[PatternLine] {
        &self.lines
    }

    /// Triple lines only, in authored order
    pub fn triples(&self) -> impl Iterator<Item = (&Slot, &Relation, &Slot)> {
        self.lines.iter().filter_map(|line| match line {
            PatternLine::Triple { lhs, rel, rhs } => Some((lhs, rel, rhs)),
            PatternLine::Directive { .. } => None,
        })
    }

    /// Names of every placeholder slot, in order of first appearance
    pub fn placeholder_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (lhs, _, rhs) in self.triples() {
            for slot in [lhs, rhs] {
                if matches!(slot.uid, UidRef::Placeholder(_)) && !names.contains(&slot.name.as_str()) {
                    names.push(&slot.name);
                }
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl TryFrom<Vec<String>> for Pattern {
    type Error = PatternError;

    fn try_from(lines: Vec<String>) -> Result<Self, Self::Error> {
        Pattern::parse(lines)
    }
}

impl From<Pattern> for Vec<String> {
    fn from(pattern: Pattern) -> Self {
        pattern.lines.iter().map(|l| l.to_string()).collect()
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uid = match self.uid {
            UidRef::Literal(uid) => uid,
            UidRef::Placeholder(n) => n as Uid,
        };
        write!(f, "{}.{}", uid, self.name)?;
        if self.queried {
            write!(f, "?")?;
        }
        match self.cardinality {
            Some(Cardinality::Many) => write!(f, "*"),
            Some(Cardinality::AtLeastOne) => write!(f, "+"),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for PatternLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternLine::Directive { key, value } => write!(f, "@{}:{}", key, value),
            PatternLine::Triple { lhs, rel, rhs } => {
                write!(f, "{} > {}.{} > {}", lhs, rel.uid, rel.name, rhs)
            }
        }
    }
}
