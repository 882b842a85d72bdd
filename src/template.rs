// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Typed placeholder templates.
//!
//! Every piece of text that automatorr renders from data, e.g., volume mounts,
//! environment values, setup steps, guide header, etc., is a __template__.
//! A template is plain text with placeholders written as `{name}` or
//! `{name:argument}`. Literal braces are written doubled: `{{` and `}}`.
//!
//! # Placeholder Vocabulary
//!
//! Templates are parsed once into literal and placeholder segments. The set
//! of placeholders a template may use is a type implementing [`Variable`].
//! Thus, an unknown placeholder is rejected when the template is parsed, and
//! a placeholder whose value is unavailable is rejected when the template is
//! rendered. Neither case ever renders a blank.

use std::{
    borrow::Cow,
    fmt::{Debug, Display},
    mem,
};

/// Placeholder vocabulary of a template.
pub trait Variable: Sized + Clone + Debug + Display {
    /// Interpret placeholder name with optional argument.
    ///
    /// Return `None` if the placeholder is not part of the vocabulary.
    fn parse(name: &str, argument: Option<&str>) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<V> {
    Literal(String),
    Variable(V),
}

/// Parsed template over placeholder vocabulary `V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template<V> {
    source: String,
    segments: Vec<Segment<V>>,
}

impl<V> Template<V>
where
    V: Variable,
{
    /// Parse template text.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::Unclosed`] if a placeholder is never closed.
    /// - Return [`TemplateError::StrayBrace`] for a lone closing brace.
    /// - Return [`TemplateError::UnknownPlaceholder`] if a placeholder is not
    ///   part of vocabulary `V`.
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        placeholder.push(inner);
                    }

                    if !closed {
                        return Err(TemplateError::Unclosed {
                            template: source.clone(),
                            offset,
                        });
                    }

                    let (name, argument) = match placeholder.split_once(':') {
                        Some((name, argument)) => (name.trim(), Some(argument.trim())),
                        None => (placeholder.trim(), None),
                    };
                    let variable = V::parse(name, argument).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            placeholder: placeholder.clone(),
                            template: source.clone(),
                        }
                    })?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(variable));
                }
                '}' => {
                    return Err(TemplateError::StrayBrace {
                        template: source.clone(),
                        offset,
                    })
                }
                _ => literal.push(ch),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// Render template by looking up each placeholder.
    ///
    /// # Errors
    ///
    /// - Return [`MissingValue`] naming the first placeholder that `lookup`
    ///   has no value for.
    pub fn render<'a, F>(&self, lookup: F) -> Result<String, MissingValue>
    where
        F: FnMut(&V) -> Option<Cow<'a, str>>,
    {
        self.render_with(|text| Cow::Borrowed(text), lookup)
    }

    /// Render template, passing each literal segment through `literal`.
    ///
    /// Values returned by `lookup` are inserted as they are.
    ///
    /// # Errors
    ///
    /// - Return [`MissingValue`] naming the first placeholder that `lookup`
    ///   has no value for.
    pub fn render_with<'a, L, F>(&self, mut literal: L, mut lookup: F) -> Result<String, MissingValue>
    where
        L: for<'s> FnMut(&'s str) -> Cow<'s, str>,
        F: FnMut(&V) -> Option<Cow<'a, str>>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(&literal(text)),
                Segment::Variable(variable) => match lookup(variable) {
                    Some(value) => out.push_str(&value),
                    None => {
                        return Err(MissingValue {
                            placeholder: variable.to_string(),
                        })
                    }
                },
            }
        }

        Ok(out)
    }

    /// Iterate through placeholders used by template in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &V> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(variable) => Some(variable),
            Segment::Literal(_) => None,
        })
    }

    /// Original template text.
    pub fn as_str(&self) -> &str {
        self.source.as_str()
    }
}

/// Template parsing error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Placeholder opened but never closed.
    #[error("unclosed placeholder at byte {offset} of {template:?}")]
    Unclosed { template: String, offset: usize },

    /// Closing brace without matching opening brace.
    #[error("stray '}}' at byte {offset} of {template:?}")]
    StrayBrace { template: String, offset: usize },

    /// Placeholder is not part of the vocabulary.
    #[error("unknown placeholder {{{placeholder}}} in {template:?}")]
    UnknownPlaceholder {
        placeholder: String,
        template: String,
    },
}

/// No value available for a placeholder during rendering.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no value for placeholder {{{placeholder}}}")]
pub struct MissingValue {
    pub placeholder: String,
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
