//! The handshake-pattern language: tokens, modifiers, validation, and
//! the pattern registry.
//!
//! Patterns are looked up by name. A name like `XXpsk0+psk1` resolves
//! by cloning the `XX` base, applying each modifier, and caching the
//! result under the full name. Custom patterns register through
//! [`register`] and must satisfy the same structural rules as the
//! built-ins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::Error;

mod catalog;
mod token;

pub use token::{Direction, PatternLine, Token};

/// The pattern-name modifiers: `fallback` and one `psk<N>` per
/// pre-shared key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifier {
    /// Set by the `fallback` modifier. Recorded, not transformative.
    pub fallback: bool,
    /// The `N` of every `psk<N>` modifier, in name order.
    pub psk_indexes: Vec<usize>,
}

impl Modifier {
    /// Whether any psk modifier is present.
    pub fn psk_mode(&self) -> bool {
        !self.psk_indexes.is_empty()
    }
}

/// A parsed, validated handshake pattern.
#[derive(Clone, Debug)]
pub struct HandshakePattern {
    name: String,
    body: String,
    pre_messages: Vec<PatternLine>,
    messages: Vec<PatternLine>,
    modifier: Option<Modifier>,
}

impl HandshakePattern {
    /// The full pattern name, modifiers included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The textual body the pattern was registered with.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The pre-message lines, possibly empty.
    pub fn pre_messages(&self) -> &[PatternLine] {
        &self.pre_messages
    }

    /// The message lines driving the handshake.
    pub fn messages(&self) -> &[PatternLine] {
        &self.messages
    }

    pub fn modifier(&self) -> Option<&Modifier> {
        self.modifier.as_ref()
    }

    /// Whether any `psk` modifier applies.
    pub fn psk_mode(&self) -> bool {
        self.modifier.as_ref().is_some_and(Modifier::psk_mode)
    }

    /// How many pre-shared keys the pattern consumes.
    pub fn psk_count(&self) -> usize {
        self.modifier
            .as_ref()
            .map_or(0, |m| m.psk_indexes.len())
    }

    /// Parse and validate a pattern registered as `name` with `body`.
    fn parse(name: &str, body: &str) -> Result<Self, Error> {
        let base_len = base_name_len(name)?;
        let modifier = match &name[base_len..] {
            "" => None,
            modifiers => Some(parse_modifiers(modifiers)?),
        };

        let sections: Vec<&str> = body.split("...").collect();
        if sections.len() > 2 {
            return Err(Error::InvalidPattern(
                "at most one pre-message section is allowed".to_owned(),
            ));
        }
        let (pre_section, message_section) = match sections.as_slice() {
            [messages] => (None, *messages),
            [pre, messages] => (Some(*pre), *messages),
            _ => unreachable!("split yields at least one section"),
        };

        let messages = token::tokenize(message_section, false)?;
        let pre_messages = match pre_section {
            Some(section) if !section.trim().is_empty() => token::tokenize(section, true)?,
            _ => Vec::new(),
        };

        let pattern = Self {
            name: name.to_owned(),
            body: body.to_owned(),
            pre_messages,
            messages,
            modifier,
        };
        pattern.validate_psk_positions()?;
        Ok(pattern)
    }

    /// The psk tokens in the body must sit exactly where the name's
    /// modifiers put them: index 0 is the head of the first message
    /// line, index K the tail of line K.
    fn validate_psk_positions(&self) -> Result<(), Error> {
        let declared = self
            .modifier
            .as_ref()
            .map(|m| m.psk_indexes.clone())
            .unwrap_or_default();

        let present = self
            .messages
            .iter()
            .flat_map(|line| &line.tokens)
            .filter(|&&t| t == Token::Psk)
            .count();
        if present != declared.len() {
            return Err(Error::InvalidPattern(format!(
                "{} psk tokens for {} psk modifiers",
                present,
                declared.len()
            )));
        }

        let mut remaining = declared;
        if self.messages[0].tokens.first() == Some(&Token::Psk) {
            take_index(&mut remaining, 0)?;
        }
        for (i, line) in self.messages.iter().enumerate() {
            if line.tokens.last() == Some(&Token::Psk) {
                take_index(&mut remaining, i + 1)?;
            }
        }
        if let Some(&line) = remaining.first() {
            return Err(Error::InvalidPattern(format!("missing psk at line {line}")));
        }
        Ok(())
    }

    /// Insert the psk tokens a modifier name asks for.
    fn insert_psk_tokens(&mut self) -> Result<(), Error> {
        let indexes = match &self.modifier {
            Some(modifier) => modifier.psk_indexes.clone(),
            None => return Ok(()),
        };
        for index in indexes {
            if index == 0 {
                self.messages[0].tokens.insert(0, Token::Psk);
            } else if index <= self.messages.len() {
                self.messages[index - 1].tokens.push(Token::Psk);
            } else {
                return Err(Error::InvalidPattern(format!(
                    "psk index {index} exceeds the message count"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for HandshakePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn take_index(indexes: &mut Vec<usize>, wanted: usize) -> Result<(), Error> {
    match indexes.iter().position(|&i| i == wanted) {
        Some(at) => {
            indexes.remove(at);
            Ok(())
        }
        None => Err(Error::InvalidPattern(format!("invalid psk index: {wanted}"))),
    }
}

/// Length of the leading uppercase-alphanumeric base name.
fn base_name_len(name: &str) -> Result<usize, Error> {
    let len = name
        .bytes()
        .take_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        .count();
    if len == 0 {
        return Err(Error::InvalidPatternName);
    }
    Ok(len)
}

/// Parse a `+`-separated modifier list: `fallback` or `psk<digits>`.
fn parse_modifiers(s: &str) -> Result<Modifier, Error> {
    let mut modifier = Modifier::default();
    for piece in s.split('+') {
        if piece == "fallback" {
            modifier.fallback = true;
            continue;
        }
        let digits = piece
            .strip_prefix("psk")
            .ok_or(Error::InvalidModifierName)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidModifierName);
        }
        let index = digits.parse().map_err(|_| Error::InvalidModifierName)?;
        modifier.psk_indexes.push(index);
    }
    Ok(modifier)
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<HandshakePattern>>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (name, body) in catalog::BUILTINS {
        let pattern = HandshakePattern::parse(name, body).expect("builtin pattern is valid");
        m.insert((*name).to_owned(), Arc::new(pattern));
    }
    RwLock::new(m)
});

/// Look up a pattern by name, deriving and caching modifier variants of
/// registered bases on first use.
pub fn from_name(name: &str) -> Result<Arc<HandshakePattern>, Error> {
    {
        let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(pattern) = registry.get(name) {
            return Ok(pattern.clone());
        }
    }

    let base_len = base_name_len(name)?;
    let modifiers = &name[base_len..];
    let base = {
        let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .get(&name[..base_len])
            .cloned()
            .ok_or_else(|| Error::UnsupportedComponent(name.to_owned()))?
    };
    if modifiers.is_empty() {
        return Ok(base);
    }

    let mut derived = (*base).clone();
    derived.name = name.to_owned();
    derived.modifier = Some(parse_modifiers(modifiers)?);
    derived.insert_psk_tokens()?;

    let derived = Arc::new(derived);
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(name.to_owned(), derived.clone());
    Ok(derived)
}

/// Register a custom pattern under `name`. Replaces an existing entry
/// of the same name; must happen before any protocol that uses it.
pub fn register(name: &str, body: &str) -> Result<(), Error> {
    let pattern = HandshakePattern::parse(name, body)?;
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(name.to_owned(), Arc::new(pattern));
    tracing::debug!(pattern = name, "registered handshake pattern");
    Ok(())
}

/// Names of all registered patterns, unordered. 38 without custom
/// registrations or cached modifier variants.
pub fn supported() -> Vec<String> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.keys().cloned().collect()
}
