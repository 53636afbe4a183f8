//! Pattern tokens, directed lines, and structural validation.

use std::fmt;

use crate::error::Error;

/// An atomic step inside a pattern line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    E,
    S,
    Ee,
    Es,
    Se,
    Ss,
    Psk,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Token::E => "e",
            Token::S => "s",
            Token::Ee => "ee",
            Token::Es => "es",
            Token::Se => "se",
            Token::Ss => "ss",
            Token::Psk => "psk",
        })
    }
}

/// The direction of a pattern line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// `->`: sent by the initiator, read by the responder.
    ToResponder,
    /// `<-`: sent by the responder, read by the initiator.
    ToInitiator,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::ToResponder => "->",
            Direction::ToInitiator => "<-",
        })
    }
}

/// One directed line of a pattern: a direction and its token list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternLine {
    pub direction: Direction,
    pub tokens: Vec<Token>,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidPattern(msg.into())
}

fn parse_token(s: &str) -> Result<Token, Error> {
    match s {
        "e" => Ok(Token::E),
        "s" => Ok(Token::S),
        "ee" => Ok(Token::Ee),
        "es" => Ok(Token::Es),
        "se" => Ok(Token::Se),
        "ss" => Ok(Token::Ss),
        "psk" => Ok(Token::Psk),
        _ => Err(invalid(format!("token '{s}' is invalid"))),
    }
}

/// Parse one line: a direction marker followed by a comma-separated
/// token list. `"-> e, es"` becomes `ToResponder, [e, es]`.
fn parse_line(line: &str) -> Result<PatternLine, Error> {
    let line = line.trim();
    let (direction, rest) = if let Some(rest) = line.strip_prefix("->") {
        (Direction::ToResponder, rest)
    } else if let Some(rest) = line.strip_prefix("<-") {
        (Direction::ToInitiator, rest)
    } else {
        return Err(invalid(format!("line '{line}' is invalid")));
    };

    let mut tokens = Vec::new();
    for piece in rest.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(invalid(format!("line '{line}' is invalid")));
        }
        tokens.push(parse_token(piece)?);
    }
    Ok(PatternLine { direction, tokens })
}

/// Parse a newline-separated pattern section into lines and validate
/// the structural rules. `pre` marks a pre-message section, which
/// relaxes the first-line direction but restricts the token set.
pub(super) fn tokenize(section: &str, pre: bool) -> Result<Vec<PatternLine>, Error> {
    let mut lines = Vec::new();
    for raw in section.lines() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        lines.push(parse_line(raw)?);
    }
    if lines.is_empty() {
        return Err(invalid("pattern has no lines"));
    }
    validate(&lines, pre)?;
    Ok(lines)
}

/// The structural rules from the noise spec:
///
/// 1. the first message line comes from the initiator (pre-messages
///    excepted);
/// 2. lines alternate direction;
/// 3. within a line, every token except `psk` appears at most once;
/// 4. deferred-payload rules: `se` on the initiator side needs a prior
///    `ee`, `ss` needs `es`; `es` on the responder side needs `ee`,
///    `ss` needs `se`;
/// 5. pre-message lines carry only `e` and `s`.
fn validate(lines: &[PatternLine], pre: bool) -> Result<(), Error> {
    if !pre && lines[0].direction != Direction::ToResponder {
        return Err(invalid("the first line must be from the initiator"));
    }

    let (mut seen_ee, mut seen_es, mut seen_se) = (false, false, false);
    let mut prev_direction = None;

    for line in lines {
        if prev_direction == Some(line.direction) {
            return Err(invalid(format!(
                "cannot have two consecutive lines from {}",
                line.direction
            )));
        }
        prev_direction = Some(line.direction);

        for (i, &token) in line.tokens.iter().enumerate() {
            if token != Token::Psk && line.tokens[..i].contains(&token) {
                return Err(invalid(format!("token '{token}' appeared more than once")));
            }
            if pre && !matches!(token, Token::E | Token::S) {
                return Err(invalid("pre-message lines may only contain e or s"));
            }

            match token {
                Token::Ee => seen_ee = true,
                Token::Es => seen_es = true,
                Token::Se => seen_se = true,
                _ => {}
            }

            let from_initiator = line.direction == Direction::ToResponder;
            if from_initiator {
                if token == Token::Se && !seen_ee {
                    return Err(invalid("need token ee before se"));
                }
                if token == Token::Ss && !seen_es {
                    return Err(invalid("need token es before ss"));
                }
            } else {
                if token == Token::Es && !seen_ee {
                    return Err(invalid("need token ee before es"));
                }
                if token == Token::Ss && !seen_se {
                    return Err(invalid("need token se before ss"));
                }
            }
        }
    }
    Ok(())
}
