//! Parser for evex expressions
//!
//! A recursive-descent grammar over a locating stream, so every node
//! carries the byte span of the source it was parsed from. Trivia (ASCII
//! whitespace, `//` line comments, non-nesting `/* ... */` block comments)
//! is consumed by the lexeme wrappers and never reaches the AST. The
//! pipeline operator `|>` is desugared into calls here; the evaluator
//! never sees it.

use std::ops::Range;

use winnow::ascii::{digit0, digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, eof, opt, preceded, repeat, separated, terminated};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::LocatingSlice;
use winnow::token::{one_of, take_until, take_while};

use crate::ast::{BinOp, Expr, ExprKind, Literal, Span, UnaryOp};
use crate::strings::string_literal;

pub(crate) type Input<'a> = LocatingSlice<&'a str>;
pub(crate) type PResult<T> = winnow::ModalResult<T>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset of the failure, `0 <= index <= input.len()`.
    pub index: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.index)
    }
}

impl std::error::Error for ParseError {}

/// Parse a complete expression from a string.
///
/// The whole input must be consumed: leading/trailing trivia is allowed,
/// leftover non-trivia is an error.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    match program.parse(LocatingSlice::new(input)) {
        Ok(expr) => {
            log::trace!("parsed expression spanning {}..{}", expr.span.start, expr.span.end);
            Ok(expr)
        }
        Err(err) => {
            let index = err.offset().min(input.len());
            let rendered = err.inner().to_string();
            let message = if rendered.is_empty() {
                "invalid expression".to_string()
            } else {
                rendered.replace('\n', "; ")
            };
            Err(ParseError { message, index })
        }
    }
}

fn program(input: &mut Input<'_>) -> PResult<Expr> {
    delimited(
        trivia,
        expression,
        cut_err(eof).context(expected("end of input")),
    )
    .parse_next(input)
}

// ============ Lexeme / trivia machinery ============

/// Wrap a parser so it consumes trailing trivia. Every token parser in the
/// grammar goes through this; leading trivia is consumed once at the top.
fn lexeme<'a, Output, ParseNext>(
    parser: ParseNext,
) -> impl Parser<Input<'a>, Output, ErrMode<ContextError>>
where
    ParseNext: Parser<Input<'a>, Output, ErrMode<ContextError>>,
{
    terminated(parser, trivia)
}

fn sym<'a>(token: &'static str) -> impl Parser<Input<'a>, &'a str, ErrMode<ContextError>> {
    lexeme(token)
}

fn trivia(input: &mut Input<'_>) -> PResult<()> {
    repeat(0.., alt((multispace1.void(), line_comment, block_comment))).parse_next(input)
}

fn line_comment(input: &mut Input<'_>) -> PResult<()> {
    ("//", till_line_ending).void().parse_next(input)
}

fn block_comment(input: &mut Input<'_>) -> PResult<()> {
    preceded(
        "/*",
        cut_err(terminated(take_until(0.., "*/"), "*/"))
            .context(label("block comment"))
            .context(expected("closing */")),
    )
    .void()
    .parse_next(input)
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

fn expect_token(token: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::StringLiteral(token))
}

fn label(what: &'static str) -> StrContext {
    StrContext::Label(what)
}

// ============ Top-level expression (handles precedence) ============

fn expression(input: &mut Input<'_>) -> PResult<Expr> {
    conditional.parse_next(input)
}

/// `pipeline ('?' expression ':' expression)?` — right-associative through
/// the recursive `expression` on both branches.
fn conditional(input: &mut Input<'_>) -> PResult<Expr> {
    let test = pipeline.parse_next(input)?;
    let branches = opt(preceded(
        sym("?"),
        cut_err((
            expression,
            preceded(sym(":").context(expect_token(":")), expression),
        )),
    ))
    .parse_next(input)?;
    Ok(match branches {
        Some((consequent, alternate)) => {
            let span = test.span.to(alternate.span);
            Expr::new(
                ExprKind::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
                span,
            )
        }
        None => test,
    })
}

/// `a |> f` desugars to `f(a)`; `a |> f(x, y)` to `f(a, x, y)`. The right
/// operand must be a postfix chain rooted at an identifier.
fn pipeline(input: &mut Input<'_>) -> PResult<Expr> {
    let first = or_expr.parse_next(input)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded(
            sym("|>"),
            cut_err(pipe_target).context(expected("function after |>")),
        ),
    )
    .parse_next(input)?;
    Ok(rest.into_iter().fold(first, apply_pipe))
}

fn apply_pipe(lhs: Expr, target: Expr) -> Expr {
    let span = lhs.span.to(target.span);
    match target.kind {
        ExprKind::Call(callee, args) => {
            let mut piped = Vec::with_capacity(args.len() + 1);
            piped.push(lhs);
            piped.extend(args);
            Expr::new(ExprKind::Call(callee, piped), span)
        }
        _ => Expr::new(ExprKind::Call(Box::new(target), vec![lhs]), span),
    }
}

fn pipe_target(input: &mut Input<'_>) -> PResult<Expr> {
    let base = word_expr
        .verify(|e| matches!(e.kind, ExprKind::Ident(_)))
        .parse_next(input)?;
    postfix_chain(base, input)
}

fn or_expr(input: &mut Input<'_>) -> PResult<Expr> {
    let first = and_expr.parse_next(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded(sym("||"), cut_err(and_expr))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, r| binary(l, BinOp::Or, r)))
}

fn and_expr(input: &mut Input<'_>) -> PResult<Expr> {
    let first = equality.parse_next(input)?;
    let rest: Vec<Expr> = repeat(0.., preceded(sym("&&"), cut_err(equality))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, r| binary(l, BinOp::And, r)))
}

fn equality(input: &mut Input<'_>) -> PResult<Expr> {
    let first = comparison.parse_next(input)?;
    let rest: Vec<(BinOp, Expr)> = repeat(0.., (eq_op, cut_err(comparison))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, (op, r)| binary(l, op, r)))
}

fn eq_op(input: &mut Input<'_>) -> PResult<BinOp> {
    lexeme(alt(("==".value(BinOp::Eq), "!=".value(BinOp::Ne)))).parse_next(input)
}

fn comparison(input: &mut Input<'_>) -> PResult<Expr> {
    let first = additive.parse_next(input)?;
    let rest: Vec<(BinOp, Expr)> = repeat(0.., (cmp_op, cut_err(additive))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, (op, r)| binary(l, op, r)))
}

fn cmp_op(input: &mut Input<'_>) -> PResult<BinOp> {
    lexeme(alt((
        "<=".value(BinOp::Le),
        ">=".value(BinOp::Ge),
        "<".value(BinOp::Lt),
        ">".value(BinOp::Gt),
    )))
    .parse_next(input)
}

fn additive(input: &mut Input<'_>) -> PResult<Expr> {
    let first = multiplicative.parse_next(input)?;
    let rest: Vec<(BinOp, Expr)> =
        repeat(0.., (add_op, cut_err(multiplicative))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, (op, r)| binary(l, op, r)))
}

fn add_op(input: &mut Input<'_>) -> PResult<BinOp> {
    lexeme(alt(('+'.value(BinOp::Add), '-'.value(BinOp::Sub)))).parse_next(input)
}

fn multiplicative(input: &mut Input<'_>) -> PResult<Expr> {
    let first = unary_expr.parse_next(input)?;
    let rest: Vec<(BinOp, Expr)> = repeat(0.., (mul_op, cut_err(unary_expr))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |l, (op, r)| binary(l, op, r)))
}

fn mul_op(input: &mut Input<'_>) -> PResult<BinOp> {
    lexeme(alt((
        '*'.value(BinOp::Mul),
        '/'.value(BinOp::Div),
        '%'.value(BinOp::Mod),
    )))
    .parse_next(input)
}

fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    Expr::new(ExprKind::Binary(Box::new(lhs), op, Box::new(rhs)), span)
}

fn unary_expr(input: &mut Input<'_>) -> PResult<Expr> {
    alt((
        (lexeme('!'.span()), cut_err(unary_expr)).map(|(sp, e)| unary(UnaryOp::Not, sp, e)),
        (lexeme('+'.span()), cut_err(unary_expr)).map(|(sp, e)| unary(UnaryOp::Pos, sp, e)),
        (lexeme('-'.span()), cut_err(unary_expr)).map(|(sp, e)| unary(UnaryOp::Neg, sp, e)),
        postfix_expr,
    ))
    .parse_next(input)
}

fn unary(op: UnaryOp, op_span: Range<usize>, operand: Expr) -> Expr {
    let span = Span::new(op_span.start, operand.span.end);
    Expr::new(ExprKind::Unary(op, Box::new(operand)), span)
}

// ============ Postfix expressions (.member and (call)) ============

enum Postfix {
    Member(String, Span),
    Call(Vec<Expr>, Span),
}

fn postfix_expr(input: &mut Input<'_>) -> PResult<Expr> {
    let base = primary.parse_next(input)?;
    postfix_chain(base, input)
}

fn postfix_chain(base: Expr, input: &mut Input<'_>) -> PResult<Expr> {
    let ops: Vec<Postfix> = repeat(0.., postfix_op).parse_next(input)?;
    Ok(ops.into_iter().fold(base, apply_postfix))
}

fn apply_postfix(acc: Expr, op: Postfix) -> Expr {
    match op {
        Postfix::Member(name, end) => {
            let span = acc.span.to(end);
            Expr::new(ExprKind::Member(Box::new(acc), name), span)
        }
        Postfix::Call(args, end) => {
            let span = acc.span.to(end);
            Expr::new(ExprKind::Call(Box::new(acc), args), span)
        }
    }
}

fn postfix_op(input: &mut Input<'_>) -> PResult<Postfix> {
    alt((member_access, call_args)).parse_next(input)
}

fn member_access(input: &mut Input<'_>) -> PResult<Postfix> {
    preceded(
        sym("."),
        cut_err(lexeme(ident_str.with_span())).context(expected("property name")),
    )
    .map(|(name, span): (String, Range<usize>)| Postfix::Member(name, span.into()))
    .parse_next(input)
}

fn call_args(input: &mut Input<'_>) -> PResult<Postfix> {
    preceded(
        sym("("),
        cut_err((
            separated(0.., expression, sym(",")),
            lexeme(')'.span()).context(expect_token(")")),
        )),
    )
    .map(|(args, rp): (Vec<Expr>, Range<usize>)| Postfix::Call(args, rp.into()))
    .parse_next(input)
}

// ============ Primary expressions ============

fn primary(input: &mut Input<'_>) -> PResult<Expr> {
    alt((array_expr, paren_expr, string_expr, number_expr, word_expr))
        .context(expected("expression"))
        .parse_next(input)
}

/// A trailing comma is not accepted in array literals or argument lists.
fn array_expr(input: &mut Input<'_>) -> PResult<Expr> {
    (
        lexeme('['.span()),
        cut_err((
            separated(0.., expression, sym(",")),
            lexeme(']'.span()).context(expect_token("]")),
        )),
    )
        .map(
            |(lb, (elements, rb)): (Range<usize>, (Vec<Expr>, Range<usize>))| {
                Expr::new(ExprKind::Array(elements), Span::new(lb.start, rb.end))
            },
        )
        .parse_next(input)
}

/// The parenthesized node keeps the span of the whole `( ... )` group.
fn paren_expr(input: &mut Input<'_>) -> PResult<Expr> {
    (
        lexeme('('.span()),
        cut_err((expression, lexeme(')'.span()).context(expect_token(")")))),
    )
        .map(|(lp, (mut expr, rp)): (Range<usize>, (Expr, Range<usize>))| {
            expr.span = Span::new(lp.start, rp.end);
            expr
        })
        .parse_next(input)
}

fn string_expr(input: &mut Input<'_>) -> PResult<Expr> {
    lexeme(string_literal.with_span())
        .map(|(value, span)| Expr::new(ExprKind::Literal(Literal::String(value)), span.into()))
        .parse_next(input)
}

/// Unsigned decimal forms: `123`, `123.`, `123.45`, `.45`. Signs are
/// unary operators, not part of the literal.
fn number_expr(input: &mut Input<'_>) -> PResult<Expr> {
    lexeme(number.with_span())
        .map(|(value, span)| Expr::new(ExprKind::Literal(Literal::Number(value)), span.into()))
        .parse_next(input)
}

fn number(input: &mut Input<'_>) -> PResult<f64> {
    alt(((digit1, opt(('.', digit0))).take(), ('.', digit1).take()))
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)
}

/// Identifier or reserved word. `true`, `false` and `null` only match as
/// keywords here, where the whole identifier-shaped word was consumed, so
/// `nullx` stays an identifier.
fn word_expr(input: &mut Input<'_>) -> PResult<Expr> {
    lexeme(ident_str.with_span())
        .map(|(word, span): (String, Range<usize>)| {
            let kind = match word.as_str() {
                "true" => ExprKind::Literal(Literal::Bool(true)),
                "false" => ExprKind::Literal(Literal::Bool(false)),
                "null" => ExprKind::Literal(Literal::Null),
                _ => ExprKind::Ident(word),
            };
            Expr::new(kind, span.into())
        })
        .parse_next(input)
}

fn ident_str(input: &mut Input<'_>) -> PResult<String> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

// ============ Sanity Tests ============
// Most testing is done via integration tests in tests/integration.rs

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literals() {
        assert!(matches!(
            parse("123").unwrap().kind,
            ExprKind::Literal(Literal::Number(n)) if n == 123.0
        ));
        assert!(matches!(
            parse("3.14").unwrap().kind,
            ExprKind::Literal(Literal::Number(_))
        ));
        assert!(matches!(
            parse(".5").unwrap().kind,
            ExprKind::Literal(Literal::Number(n)) if n == 0.5
        ));
        assert!(matches!(
            parse("true").unwrap().kind,
            ExprKind::Literal(Literal::Bool(true))
        ));
        assert!(matches!(
            parse("null").unwrap().kind,
            ExprKind::Literal(Literal::Null)
        ));
        assert!(matches!(
            parse(r#""hello""#).unwrap().kind,
            ExprKind::Literal(Literal::String(_))
        ));
    }

    #[test]
    fn keywords_need_a_boundary() {
        assert!(matches!(parse("nullx").unwrap().kind, ExprKind::Ident(ref s) if s == "nullx"));
        assert!(matches!(parse("true_").unwrap().kind, ExprKind::Ident(_)));
        assert!(matches!(parse("falsey").unwrap().kind, ExprKind::Ident(_)));
    }

    #[test]
    fn parse_operator_precedence() {
        // a * b + c parses as (a * b) + c
        let expr = parse("a * b + c").unwrap();
        if let ExprKind::Binary(left, BinOp::Add, _) = expr.kind {
            assert!(matches!(left.kind, ExprKind::Binary(_, BinOp::Mul, _)));
        } else {
            panic!("expected Add at top level");
        }

        // a && b || c parses as (a && b) || c
        let expr = parse("a && b || c").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary(_, BinOp::Or, _)));

        // comparisons bind tighter than equality
        let expr = parse("a < b == c < d").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary(_, BinOp::Eq, _)));
    }

    #[test]
    fn parse_unary_chains() {
        let expr = parse("!!x").unwrap();
        if let ExprKind::Unary(UnaryOp::Not, inner) = expr.kind {
            assert!(matches!(inner.kind, ExprKind::Unary(UnaryOp::Not, _)));
        } else {
            panic!("expected nested Not");
        }
        assert!(matches!(
            parse("-+1").unwrap().kind,
            ExprKind::Unary(UnaryOp::Neg, _)
        ));
    }

    #[test]
    fn parse_method_chain() {
        let expr = parse("user.address.city").unwrap();
        assert!(matches!(expr.kind, ExprKind::Member(_, ref p) if p == "city"));
        assert!(parse("std.len(xs)").is_ok());
        assert!(parse("f(1)(2)").is_ok());
    }

    #[test]
    fn parse_conditional() {
        let expr = parse("a ? b : c ? d : e").unwrap();
        if let ExprKind::Conditional { alternate, .. } = expr.kind {
            assert!(matches!(alternate.kind, ExprKind::Conditional { .. }));
        } else {
            panic!("expected nested conditional");
        }
    }

    #[test]
    fn parse_pipeline_desugars() {
        let expr = parse("41 |> inc").unwrap();
        if let ExprKind::Call(callee, args) = expr.kind {
            assert!(matches!(callee.kind, ExprKind::Ident(ref s) if s == "inc"));
            assert_eq!(args.len(), 1);
        } else {
            panic!("expected call");
        }

        let expr = parse("41 |> add(1, 2)").unwrap();
        if let ExprKind::Call(_, args) = expr.kind {
            assert_eq!(args.len(), 3);
            assert!(matches!(args[0].kind, ExprKind::Literal(Literal::Number(n)) if n == 41.0));
        } else {
            panic!("expected call");
        }

        // member chains are valid targets
        assert!(parse("x |> std.min(2)").is_ok());
        // literals are not
        assert!(parse("x |> 1").is_err());
        assert!(parse("x |> true").is_err());
    }

    #[test]
    fn parse_comments_as_trivia() {
        assert!(parse("1 + /* inline */ 2").is_ok());
        assert!(parse("// leading\n 1 + 2 // trailing").is_ok());
        assert!(parse("/* unterminated").is_err());
    }

    #[test]
    fn spans_exclude_trivia() {
        let source = "  1 + 2  // done";
        let expr = parse(source).unwrap();
        assert_eq!(&source[expr.span.range()], "1 + 2");

        let source = " ( 1 + 2 ) ";
        let expr = parse(source).unwrap();
        assert_eq!(&source[expr.span.range()], "( 1 + 2 )");

        let source = "[1, 2]  ";
        let expr = parse(source).unwrap();
        assert_eq!(&source[expr.span.range()], "[1, 2]");
    }

    #[test]
    fn trailing_commas_rejected() {
        assert!(parse("[1, 2,]").is_err());
        assert!(parse("f(1,)").is_err());
    }

    #[test]
    fn trailing_input_rejected() {
        let err = parse("1 + 2 3").unwrap_err();
        assert_eq!(err.index, 6);
        assert!(parse("").is_err());
    }

    #[test]
    fn error_index_near_end_for_open_paren() {
        let err = parse("(").unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn string_escape_error_offsets() {
        // Error at the backslash of the offending escape.
        let err = parse(r#"  "ab\3cd"  "#).unwrap_err();
        assert_eq!(err.index, 5);
        // First invalid hex digit.
        let err = parse(r#""\xZ1""#).unwrap_err();
        assert_eq!(err.index, 3);
    }
}
