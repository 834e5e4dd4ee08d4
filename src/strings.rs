//! String-literal recognizer
//!
//! A self-contained sub-grammar for single- and double-quoted string
//! literals with ECMAScript-aligned escape semantics (strict mode: legacy
//! octal and decimal-digit escapes are rejected). Errors are committed
//! (`cut_err`) so the reported index lands on the offending escape's
//! backslash, or on the first invalid hex digit for the hex/unicode forms.

use winnow::combinator::{cut_err, fail};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stream;
use winnow::token::one_of;

use crate::parse::{Input, PResult};

/// Recognize one string literal (including quotes) and produce the decoded
/// text. The caller wraps this in a lexeme to consume trailing trivia.
pub(crate) fn string_literal(input: &mut Input<'_>) -> PResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut text = String::new();
    loop {
        let at = input.checkpoint();
        let Some(c) = input.next_token() else {
            input.reset(&at);
            return missing(input, "closing quote");
        };
        match c {
            _ if c == quote => return Ok(text),
            '\\' => escape_sequence(input, &at, &mut text)?,
            // A bare line terminator ends the line, not the literal.
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                input.reset(&at);
                return missing(input, "closing quote before end of line");
            }
            _ => text.push(c),
        }
    }
}

type Checkpoint<'a> = <Input<'a> as Stream>::Checkpoint;

/// Decode one escape sequence. `backslash` is the checkpoint taken just
/// before the opening `\`, used to anchor error offsets.
fn escape_sequence<'a>(
    input: &mut Input<'a>,
    backslash: &Checkpoint<'a>,
    text: &mut String,
) -> PResult<()> {
    let Some(c) = input.next_token() else {
        input.reset(backslash);
        return missing(input, "escape character after backslash");
    };
    match c {
        'n' => text.push('\n'),
        'r' => text.push('\r'),
        't' => text.push('\t'),
        'b' => text.push('\u{0008}'),
        'f' => text.push('\u{000C}'),
        'v' => text.push('\u{000B}'),
        // Line continuations contribute no character.
        '\n' | '\u{2028}' | '\u{2029}' => {}
        '\r' => {
            // CRLF counts as a single line terminator.
            let after_cr = input.checkpoint();
            if input.next_token() != Some('\n') {
                input.reset(&after_cr);
            }
        }
        '0' => {
            let after_zero = input.checkpoint();
            match input.next_token() {
                Some(d) if d.is_ascii_digit() => {
                    input.reset(backslash);
                    return forbidden(input, "octal escape sequence");
                }
                _ => {
                    input.reset(&after_zero);
                    text.push('\0');
                }
            }
        }
        '1'..='9' => {
            input.reset(backslash);
            return forbidden(input, "octal or decimal escape sequence");
        }
        'x' => {
            let value = hex_digits(input, 2)?;
            // Always in the Latin-1 range.
            text.push(char::from(value as u8));
        }
        'u' => return unicode_escape(input, backslash, text),
        // Identity escape: the character stands for itself.
        _ => text.push(c),
    }
    Ok(())
}

/// `\uHHHH` (one UTF-16 code unit, surrogate pairs combined) or `\u{H...}`
/// (1-6 hex digits, at most 0x10FFFF). Rust strings hold Unicode scalar
/// values, so an unpaired surrogate is rejected at the escape's backslash.
fn unicode_escape<'a>(
    input: &mut Input<'a>,
    backslash: &Checkpoint<'a>,
    text: &mut String,
) -> PResult<()> {
    let brace = input.checkpoint();
    if input.next_token() == Some('{') {
        let mut value = 0u32;
        let mut digits = 0;
        loop {
            let at = input.checkpoint();
            let Some(c) = input.next_token() else {
                input.reset(&at);
                return missing(input, "closing brace");
            };
            if c == '}' {
                if digits == 0 {
                    input.reset(&at);
                    return missing(input, "hex digit");
                }
                break;
            }
            if digits == 6 {
                input.reset(&at);
                return missing(input, "closing brace");
            }
            let Some(d) = c.to_digit(16) else {
                input.reset(&at);
                return missing(input, "hex digit");
            };
            value = value * 16 + d;
            digits += 1;
        }
        if value > 0x10FFFF {
            input.reset(backslash);
            return forbidden(input, "code point above 0x10FFFF");
        }
        match char::from_u32(value) {
            Some(c) => {
                text.push(c);
                Ok(())
            }
            None => {
                input.reset(backslash);
                forbidden(input, "unpaired surrogate escape")
            }
        }
    } else {
        input.reset(&brace);
        let unit = hex_digits(input, 4)?;
        if let Some(c) = char::from_u32(unit) {
            text.push(c);
            return Ok(());
        }
        // `unit` is a surrogate; a high surrogate may pair with an
        // immediately following `\uDC00`..`\uDFFF`.
        if (0xD800..0xDC00).contains(&unit)
            && let Some(low) = low_surrogate(input)?
        {
            let value = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            if let Some(c) = char::from_u32(value) {
                text.push(c);
                return Ok(());
            }
        }
        input.reset(backslash);
        forbidden(input, "unpaired surrogate escape")
    }
}

/// Try to consume a `\uHHHH` low surrogate; restores the input on mismatch.
fn low_surrogate(input: &mut Input<'_>) -> PResult<Option<u32>> {
    let at = input.checkpoint();
    if input.next_token() == Some('\\') && input.next_token() == Some('u') {
        let unit = hex_digits(input, 4)?;
        if (0xDC00..0xE000).contains(&unit) {
            return Ok(Some(unit));
        }
    }
    input.reset(&at);
    Ok(None)
}

/// Exactly `count` hex digits; errors at the first byte that is not one.
fn hex_digits(input: &mut Input<'_>, count: usize) -> PResult<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        let at = input.checkpoint();
        match input.next_token().and_then(|c| c.to_digit(16)) {
            Some(d) => value = value * 16 + d,
            None => {
                input.reset(&at);
                return missing(input, "hex digit");
            }
        }
    }
    Ok(value)
}

fn missing<T>(input: &mut Input<'_>, what: &'static str) -> PResult<T> {
    cut_err(
        fail.context(StrContext::Label("string literal"))
            .context(StrContext::Expected(StrContextValue::Description(what))),
    )
    .parse_next(input)
}

fn forbidden<T>(input: &mut Input<'_>, what: &'static str) -> PResult<T> {
    cut_err(fail.context(StrContext::Label(what))).parse_next(input)
}

// ============ Sanity Tests ============
// Escape-by-escape coverage; offsets are checked via the public parser in
// the integration tests.
