//! `winnow` grammar for attribute console requests.
//!
//! ```text
//! request := "get" name | "set" name integer | "list"
//! name    := [a-z0-9_]+
//! ```
//!
//! Keywords are case-insensitive. Surrounding whitespace and a trailing line
//! ending are ignored.

use core::fmt;

use winnow::ascii::{Caseless, dec_int, line_ending, space0, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

type PResult<O> = Result<O, ErrMode<ContextError>>;

/// Request as typed, before the attribute name is resolved.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request<'a> {
    Get(&'a str),
    Set(&'a str, i64),
    List,
}

/// Input that does not match the grammar.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyntaxError {
    /// Byte offset where parsing stopped.
    pub offset: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at column {}", self.offset + 1)
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Request<'_>, SyntaxError> {
    request.parse(line).map_err(|err| SyntaxError {
        offset: err.offset(),
    })
}

fn request<'s>(input: &mut &'s str) -> PResult<Request<'s>> {
    terminated(
        preceded(space0, alt((get, set, list))),
        (space0, opt(line_ending)),
    )
    .parse_next(input)
}

fn get<'s>(input: &mut &'s str) -> PResult<Request<'s>> {
    preceded((literal(Caseless("get")), space1), name)
        .map(Request::Get)
        .parse_next(input)
}

fn set<'s>(input: &mut &'s str) -> PResult<Request<'s>> {
    preceded(
        (literal(Caseless("set")), space1),
        (name, preceded(space1, dec_int::<_, i64, _>)),
    )
    .map(|(name, value)| Request::Set(name, value))
    .parse_next(input)
}

fn list<'s>(input: &mut &'s str) -> PResult<Request<'s>> {
    literal(Caseless("list"))
        .value(Request::List)
        .parse_next(input)
}

fn name<'s>(input: &mut &'s str) -> PResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}
