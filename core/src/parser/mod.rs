//! PEST-based parser for the script subset
//!
//! Produces the AST consumed by the step extractor, with span information for
//! line numbers and error reporting.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::types::ast::{
    AssignOp, BinaryOp, ClassMember, Declarator, Expr, ForLoopKind, FunctionBody, Pattern,
    Program, Span, Stmt, SwitchCase, UnaryOp, UpdateOp, VarKind,
};

#[cfg(test)]
mod tests;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/script.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    PestError(String, Option<Span>),
    #[error("{0}")]
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => (line, col),
            pest::error::LineColLocation::Span((line, col), _) => (line, col),
        };
        let span = Span {
            start: 0,
            end: 0,
            start_line: line.saturating_sub(1),
            start_col: col.saturating_sub(1),
            end_line: line.saturating_sub(1),
            end_col: col,
        };
        let message = format!(
            "SyntaxError at line {}, column {}: {}",
            line,
            col,
            err.variant.message()
        );
        ParseError::PestError(message, Some(span))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Byte offset → (line, column) lookup for one source text
struct SourceMap<'s> {
    text: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> SourceMap<'s> {
    fn new(text: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(idx, _)| idx + 1),
        );
        Self { text, line_starts }
    }

    /// Convert byte offset to (line, column) - 0-indexed
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        let col = self
            .text
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line, col)
    }

    /// Convert a PEST pair's span to our Span type
    fn span(&self, pair: &Pair<Rule>) -> Span {
        let pest_span = pair.as_span();
        let (start_line, start_col) = self.line_col(pest_span.start());
        let (end_line, end_col) = self.line_col(pest_span.end());
        Span::new(
            pest_span.start(),
            pest_span.end(),
            start_line,
            start_col,
            end_line,
            end_col,
        )
    }
}

/* ===================== Public API ===================== */

/// Parse a script source string into a program
///
/// Empty or comment-only input yields a program with no statements.
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let map = SourceMap::new(source);
    let mut pairs = ScriptParser::parse(Rule::program, source)?;

    let program = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("Parser produced no program".to_string(), None))?;
    let span = map.span(&program);

    let mut body = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::statement => body.push(build_statement(pair, &map)?),
            Rule::EOI => {}
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected program content: {:?}", other),
                    Some(map.span(&pair)),
                ))
            }
        }
    }

    Ok(Program { body, span })
}

/* ===================== AST Builder ===================== */

/// Keyword tokens carry no information beyond their presence
fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_return
            | Rule::kw_throw
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_new
            | Rule::kw_await
            | Rule::kw_switch
            | Rule::kw_case
            | Rule::kw_default
            | Rule::kw_class
            | Rule::kw_extends
    )
}

/// Inner pairs of a rule with keyword tokens removed
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn expect_next<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    span: Span,
    what: &str,
) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("Missing {}", what), Some(span)))
}

fn build_block(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let statements: Result<Vec<Stmt>, ParseError> = pair
        .into_inner()
        .map(|stmt_pair| build_statement(stmt_pair, map))
        .collect();

    Ok(Stmt::Block {
        body: statements?,
        span,
    })
}

fn build_params(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Vec<Pattern>> {
    pair.into_inner()
        .map(|param| build_pattern(param, map))
        .collect()
}

/* ===================== Binding Patterns ===================== */

fn build_pattern(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Pattern> {
    let span = map.span(&pair);

    match pair.as_rule() {
        Rule::identifier => Ok(Pattern::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::binding_target | Rule::param => {
            let mut inner = pair.into_inner();
            build_pattern(expect_next(&mut inner, span, "binding")?, map)
        }
        Rule::binding_element | Rule::pattern_shorthand => {
            let mut inner = pair.into_inner();
            let target = build_pattern(expect_next(&mut inner, span, "binding")?, map)?;
            match inner.next() {
                Some(value) => Ok(Pattern::Default {
                    target: Box::new(target),
                    value: Box::new(build_expression(value, map)?),
                    span,
                }),
                None => Ok(target),
            }
        }
        Rule::rest_element => {
            let mut inner = pair.into_inner();
            let target = build_pattern(expect_next(&mut inner, span, "rest target")?, map)?;
            Ok(Pattern::Rest {
                target: Box::new(target),
                span,
            })
        }
        Rule::array_pattern => {
            let mut elements = pair
                .into_inner()
                .map(|slot| match slot.into_inner().next() {
                    Some(element) => build_pattern(element, map).map(Some),
                    None => Ok(None),
                })
                .collect::<ParseResult<Vec<_>>>()?;
            // `[]` and `[a,]` end in an empty slot that is not a hole
            if matches!(elements.last(), Some(None)) {
                elements.pop();
            }
            Ok(Pattern::Array { elements, span })
        }
        Rule::object_pattern => {
            let properties = pair
                .into_inner()
                .map(|prop| build_pattern_property(prop, map))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Pattern::Object { properties, span })
        }
        other => Err(ParseError::BuildError(
            format!("Unexpected binding rule: {:?}", other),
            Some(span),
        )),
    }
}

fn build_pattern_property(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<(String, Pattern)> {
    let span = map.span(&pair);
    let mut outer = pair.into_inner();
    let inner = expect_next(&mut outer, span, "pattern property")?;

    match inner.as_rule() {
        Rule::rest_element => Ok(("...".to_string(), build_pattern(inner, map)?)),
        Rule::pattern_pair => {
            let inner_span = map.span(&inner);
            let mut parts = inner.into_inner();
            let key = property_key(expect_next(&mut parts, inner_span, "property key")?);
            let target = build_pattern(expect_next(&mut parts, inner_span, "property target")?, map)?;
            Ok((key, target))
        }
        Rule::pattern_shorthand => {
            let target = build_pattern(inner, map)?;
            let key = target.names().first().map(|name| name.to_string());
            let key = key.ok_or_else(|| {
                ParseError::BuildError("Shorthand property requires a name".to_string(), Some(span))
            })?;
            Ok((key, target))
        }
        other => Err(ParseError::BuildError(
            format!("Unexpected pattern property rule: {:?}", other),
            Some(span),
        )),
    }
}

fn build_function_decl(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut is_async = false;
    let mut name = None;
    let mut params = Vec::new();
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::param_list => params = build_params(part, map)?,
            Rule::block => body = Some(build_block(part, map)?),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        ParseError::BuildError("Function declaration requires a name".to_string(), Some(span))
    })?;
    let body = body.ok_or_else(|| {
        ParseError::BuildError("Function declaration requires a body".to_string(), Some(span))
    })?;

    Ok(Stmt::FunctionDecl {
        name,
        params,
        is_async,
        body: Box::new(body),
        span,
    })
}

fn build_var_kind(pair: &Pair<Rule>, map: &SourceMap) -> ParseResult<VarKind> {
    match pair.as_str() {
        "let" => Ok(VarKind::Let),
        "const" => Ok(VarKind::Const),
        "var" => Ok(VarKind::Var),
        other => Err(ParseError::BuildError(
            format!("Expected 'let', 'const' or 'var', got: {}", other),
            Some(map.span(pair)),
        )),
    }
}

fn build_var_decl(pair: Pair<Rule>, map: &SourceMap, span: Span) -> ParseResult<Stmt> {
    let mut inner = pair.into_inner();

    let kind_pair = expect_next(&mut inner, span, "declaration keyword")?;
    let var_kind = build_var_kind(&kind_pair, map)?;

    let mut declarators = Vec::new();
    for declarator_pair in inner {
        let decl_span = map.span(&declarator_pair);
        let mut parts = declarator_pair.into_inner();
        let target = build_pattern(expect_next(&mut parts, decl_span, "declared name")?, map)?;
        let init = match parts.next() {
            Some(expr_pair) => Some(build_expression(expr_pair, map)?),
            None => None,
        };
        declarators.push(Declarator {
            target,
            init,
            span: decl_span,
        });
    }

    Ok(Stmt::Declare {
        var_kind,
        declarators,
        span,
    })
}

fn build_if_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut inner = significant(pair);

    let test = build_expression(expect_next(&mut inner, span, "if condition")?, map)?;
    let then_s = build_statement(expect_next(&mut inner, span, "if body")?, map)?;

    let else_s = match inner.next() {
        Some(else_clause) => {
            let mut else_inner = significant(else_clause);
            let else_stmt = expect_next(&mut else_inner, span, "else body")?;
            Some(Box::new(build_statement(else_stmt, map)?))
        }
        None => None,
    };

    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
        span,
    })
}

fn build_while_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut inner = significant(pair);

    let test = build_expression(expect_next(&mut inner, span, "while condition")?, map)?;
    let body = build_statement(expect_next(&mut inner, span, "while body")?, map)?;

    Ok(Stmt::While {
        test,
        body: Box::new(body),
        span,
    })
}

fn build_do_while_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut inner = significant(pair);

    let body = build_statement(expect_next(&mut inner, span, "do body")?, map)?;
    let test = build_expression(expect_next(&mut inner, span, "do-while condition")?, map)?;

    Ok(Stmt::DoWhile {
        body: Box::new(body),
        test,
        span,
    })
}

fn build_for_loop_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut var_kind = None;
    let mut binding = None;
    let mut kind = None;
    let mut iterable = None;
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::decl_kind => var_kind = Some(build_var_kind(&part, map)?),
            Rule::binding_target => binding = Some(build_pattern(part, map)?),
            Rule::for_kind => {
                kind = Some(if part.as_str() == "of" {
                    ForLoopKind::Of
                } else {
                    ForLoopKind::In
                })
            }
            Rule::expression => iterable = Some(build_expression(part, map)?),
            Rule::statement => body = Some(build_statement(part, map)?),
            _ => {}
        }
    }

    let missing = |what: &str| ParseError::BuildError(format!("Missing {}", what), Some(span));
    let binding = binding.ok_or_else(|| missing("loop binding"))?;

    Ok(Stmt::ForLoop {
        kind: kind.ok_or_else(|| missing("'of' or 'in'"))?,
        var_kind,
        binding,
        iterable: iterable.ok_or_else(|| missing("loop iterable"))?,
        body: Box::new(body.ok_or_else(|| missing("loop body"))?),
        span,
    })
}

fn build_for_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut init = None;
    let mut test = None;
    let mut update = None;
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::for_init => {
                if let Some(init_pair) = part.into_inner().next() {
                    let init_span = map.span(&init_pair);
                    let stmt = match init_pair.as_rule() {
                        Rule::var_decl => build_var_decl(init_pair, map, init_span)?,
                        _ => Stmt::Expr {
                            expr: build_expression(init_pair, map)?,
                            span: init_span,
                        },
                    };
                    init = Some(Box::new(stmt));
                }
            }
            Rule::for_test => {
                if let Some(expr_pair) = part.into_inner().next() {
                    test = Some(build_expression(expr_pair, map)?);
                }
            }
            Rule::for_update => {
                if let Some(expr_pair) = part.into_inner().next() {
                    update = Some(build_expression(expr_pair, map)?);
                }
            }
            Rule::statement => body = Some(build_statement(part, map)?),
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        ParseError::BuildError("Missing for loop body".to_string(), Some(span))
    })?;

    Ok(Stmt::For {
        init,
        test,
        update,
        body: Box::new(body),
        span,
    })
}

fn build_try_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut body = None;
    let mut catch_var = None;
    let mut catch_body = None;
    let mut finally_body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::block => body = Some(build_block(part, map)?),
            Rule::catch_clause => {
                for catch_part in significant(part) {
                    match catch_part.as_rule() {
                        Rule::identifier => catch_var = Some(catch_part.as_str().to_string()),
                        Rule::block => catch_body = Some(Box::new(build_block(catch_part, map)?)),
                        _ => {}
                    }
                }
            }
            Rule::finally_clause => {
                if let Some(block) = significant(part).next() {
                    finally_body = Some(Box::new(build_block(block, map)?));
                }
            }
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        ParseError::BuildError("Missing try block".to_string(), Some(span))
    })?;

    Ok(Stmt::Try {
        body: Box::new(body),
        catch_var,
        catch_body,
        finally_body,
        span,
    })
}

fn build_switch_stmt(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut inner = significant(pair);

    let discriminant = build_expression(expect_next(&mut inner, span, "switch value")?, map)?;
    let cases = inner
        .map(|case_pair| build_switch_case(case_pair, map))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Stmt::Switch {
        discriminant,
        cases,
        span,
    })
}

fn build_switch_case(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<SwitchCase> {
    let span = map.span(&pair);
    let mut test = None;
    let mut body = Vec::new();

    for part in significant(pair) {
        match part.as_rule() {
            Rule::expression => test = Some(build_expression(part, map)?),
            Rule::statement => body.push(build_statement(part, map)?),
            _ => {}
        }
    }

    Ok(SwitchCase { test, body, span })
}

fn build_class_decl(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);
    let mut name = None;
    let mut superclass = None;
    let mut members = Vec::new();

    for part in significant(pair) {
        match part.as_rule() {
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::class_heritage => {
                let heritage_span = map.span(&part);
                let mut heritage = significant(part);
                let base = expect_next(&mut heritage, heritage_span, "superclass")?;
                superclass = Some(build_expression(base, map)?);
            }
            Rule::class_member => {
                if let Some(member) = build_class_member(part, map)? {
                    members.push(member);
                }
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        ParseError::BuildError("Class declaration requires a name".to_string(), Some(span))
    })?;

    Ok(Stmt::ClassDecl {
        name,
        superclass,
        members,
        span,
    })
}

/// `None` for stray semicolons in the class body
fn build_class_member(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Option<ClassMember>> {
    let span = map.span(&pair);
    let mut outer = pair.into_inner();
    let inner = expect_next(&mut outer, span, "class member")?;

    match inner.as_rule() {
        Rule::method_def => {
            let (name, is_static, function) = build_method(inner, map)?;
            Ok(Some(ClassMember::Method {
                name,
                is_static,
                function,
            }))
        }
        Rule::class_field => {
            let field_span = map.span(&inner);
            let mut is_static = false;
            let mut name = None;
            let mut value = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::kw_static => is_static = true,
                    Rule::identifier_name => name = Some(part.as_str().to_string()),
                    _ => value = Some(build_expression(part, map)?),
                }
            }
            let name = name.ok_or_else(|| {
                ParseError::BuildError("Class field requires a name".to_string(), Some(field_span))
            })?;
            Ok(Some(ClassMember::Field {
                name,
                is_static,
                value,
                span: field_span,
            }))
        }
        _ => Ok(None),
    }
}

/// Method of a class or object literal, as `(name, is_static, function)`
fn build_method(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<(String, bool, Expr)> {
    let span = map.span(&pair);
    let mut is_static = false;
    let mut is_async = false;
    let mut name = None;
    let mut params = Vec::new();
    let mut body = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_static => is_static = true,
            Rule::kw_async => is_async = true,
            Rule::property_key => name = Some(property_key(part)),
            Rule::param_list => params = build_params(part, map)?,
            Rule::block => body = Some(build_block(part, map)?),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        ParseError::BuildError("Method requires a name".to_string(), Some(span))
    })?;
    let body = body.ok_or_else(|| {
        ParseError::BuildError("Method requires a body".to_string(), Some(span))
    })?;

    let function = Expr::Function {
        name: Some(name.clone()),
        params,
        is_async,
        is_arrow: false,
        body: FunctionBody::Block {
            body: Box::new(body),
        },
        span,
    };
    Ok((name, is_static, function))
}

fn build_statement(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Stmt> {
    let span = map.span(&pair);

    match pair.as_rule() {
        Rule::statement => {
            let mut inner = pair.into_inner();
            build_statement(expect_next(&mut inner, span, "statement")?, map)
        }
        Rule::block => build_block(pair, map),
        Rule::empty_stmt => Ok(Stmt::Empty { span }),
        Rule::function_decl => build_function_decl(pair, map),
        Rule::declare_stmt => {
            let mut inner = pair.into_inner();
            build_var_decl(expect_next(&mut inner, span, "declaration")?, map, span)
        }
        Rule::if_stmt => build_if_stmt(pair, map),
        Rule::switch_stmt => build_switch_stmt(pair, map),
        Rule::class_decl => build_class_decl(pair, map),
        Rule::for_loop_stmt => build_for_loop_stmt(pair, map),
        Rule::for_stmt => build_for_stmt(pair, map),
        Rule::while_stmt => build_while_stmt(pair, map),
        Rule::do_while_stmt => build_do_while_stmt(pair, map),
        Rule::return_stmt => {
            let value = match significant(pair).next() {
                Some(expr_pair) => Some(build_expression(expr_pair, map)?),
                None => None,
            };
            Ok(Stmt::Return { value, span })
        }
        Rule::throw_stmt => {
            let mut inner = significant(pair);
            let value = build_expression(expect_next(&mut inner, span, "thrown value")?, map)?;
            Ok(Stmt::Throw { value, span })
        }
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::continue_stmt => Ok(Stmt::Continue { span }),
        Rule::try_stmt => build_try_stmt(pair, map),
        Rule::labeled_stmt => {
            let mut inner = pair.into_inner();
            let label = expect_next(&mut inner, span, "label")?.as_str().to_string();
            let body = build_statement(expect_next(&mut inner, span, "labeled statement")?, map)?;
            Ok(Stmt::Labeled {
                label,
                body: Box::new(body),
                span,
            })
        }
        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            let expr = build_expression(expect_next(&mut inner, span, "expression")?, map)?;
            Ok(Stmt::Expr { expr, span })
        }
        Rule::unknown_stmt => Ok(Stmt::Unknown {
            text: pair.as_str().trim_end_matches(';').trim_end().to_string(),
            span,
        }),
        _ => Err(ParseError::BuildError(
            format!("Unexpected statement rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_binary_expr(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let inner_pairs: Vec<_> = pair.into_inner().collect();

    if inner_pairs.is_empty() {
        return Err(ParseError::BuildError(
            "Empty binary expression".to_string(),
            Some(span),
        ));
    }

    let mut left = build_expression(inner_pairs[0].clone(), map)?;

    let mut i = 1;
    while i < inner_pairs.len() {
        let op_rule = inner_pairs[i].as_rule();

        i += 1;
        if i >= inner_pairs.len() {
            return Err(ParseError::BuildError(
                "Missing right operand after operator".to_string(),
                Some(span),
            ));
        }

        let right = build_expression(inner_pairs[i].clone(), map)?;
        let new_span = left.span().merge(&right.span());

        let op = match op_rule {
            Rule::op_nullish => BinaryOp::Nullish,
            Rule::op_or => BinaryOp::Or,
            Rule::op_and => BinaryOp::And,
            Rule::op_seq => BinaryOp::StrictEq,
            Rule::op_sne => BinaryOp::StrictNe,
            Rule::op_eq => BinaryOp::Eq,
            Rule::op_ne => BinaryOp::Ne,
            Rule::op_lte => BinaryOp::Lte,
            Rule::op_gte => BinaryOp::Gte,
            Rule::op_lt => BinaryOp::Lt,
            Rule::op_gt => BinaryOp::Gt,
            Rule::op_add => BinaryOp::Add,
            Rule::op_sub => BinaryOp::Sub,
            Rule::op_mul => BinaryOp::Mul,
            Rule::op_pow => BinaryOp::Pow,
            Rule::op_instanceof => BinaryOp::InstanceOf,
            Rule::op_in => BinaryOp::In,
            Rule::op_div => BinaryOp::Div,
            Rule::op_mod => BinaryOp::Mod,
            _ => {
                return Err(ParseError::BuildError(
                    format!(
                        "Expected operator rule at index {}, got {:?}",
                        i - 1,
                        op_rule
                    ),
                    Some(span),
                ))
            }
        };

        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: new_span,
        };

        i += 1;
    }

    Ok(left)
}

fn build_unary_expr(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let mut inner = pair.into_inner();
    let first = expect_next(&mut inner, span, "unary operand")?;

    let op = match first.as_rule() {
        Rule::op_inc | Rule::op_dec => {
            let update_op = if first.as_rule() == Rule::op_inc {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            let target = build_expression(expect_next(&mut inner, span, "update target")?, map)?;
            return Ok(Expr::Update {
                op: update_op,
                prefix: true,
                target: Box::new(target),
                span,
            });
        }
        Rule::op_not => UnaryOp::Not,
        Rule::op_neg => UnaryOp::Neg,
        Rule::op_plus => UnaryOp::Plus,
        Rule::op_typeof => UnaryOp::Typeof,
        _ => return build_expression(first, map),
    };

    let operand = build_expression(expect_next(&mut inner, span, "unary operand")?, map)?;
    Ok(Expr::Unary {
        op,
        operand: Box::new(operand),
        span,
    })
}

fn build_call_expr(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let mut inner = pair.into_inner();
    let primary_pair = expect_next(&mut inner, span, "call target")?;
    let mut expr = build_expression(primary_pair, map)?;

    for postfix_pair in inner {
        let postfix_span = map.span(&postfix_pair);
        let mut postfix_inner = postfix_pair.into_inner();
        let suffix = expect_next(&mut postfix_inner, postfix_span, "postfix")?;
        let new_span = expr.span().merge(&postfix_span);

        expr = match suffix.as_rule() {
            Rule::call_suffix => {
                let args = match suffix.into_inner().next() {
                    Some(arg_list_pair) => build_arg_list(arg_list_pair, map)?,
                    None => vec![],
                };
                Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: new_span,
                }
            }
            Rule::optional_access | Rule::regular_access => {
                let optional = suffix.as_rule() == Rule::optional_access;
                let mut access_inner = suffix.into_inner();
                let prop_pair = expect_next(&mut access_inner, postfix_span, "property name")?;
                Expr::Member {
                    object: Box::new(expr),
                    property: prop_pair.as_str().to_string(),
                    property_span: map.span(&prop_pair),
                    optional,
                    span: new_span,
                }
            }
            Rule::index_access => {
                let mut access_inner = suffix.into_inner();
                let index_pair = expect_next(&mut access_inner, postfix_span, "index")?;
                Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(build_expression(index_pair, map)?),
                    span: new_span,
                }
            }
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected postfix rule: {:?}", other),
                    Some(postfix_span),
                ))
            }
        };
    }

    Ok(expr)
}

fn build_new_expr(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let mut callee = None;
    let mut args = Vec::new();

    for part in significant(pair) {
        match part.as_rule() {
            Rule::new_callee => {
                let callee_span = map.span(&part);
                let mut segments = part.into_inner();
                let head = expect_next(&mut segments, callee_span, "constructor name")?;
                let mut expr = Expr::Ident {
                    name: head.as_str().to_string(),
                    span: map.span(&head),
                };
                for access in segments {
                    let access_span = map.span(&access);
                    let mut access_inner = access.into_inner();
                    let prop_pair = expect_next(&mut access_inner, access_span, "property name")?;
                    expr = Expr::Member {
                        span: expr.span().merge(&access_span),
                        object: Box::new(expr),
                        property: prop_pair.as_str().to_string(),
                        property_span: map.span(&prop_pair),
                        optional: false,
                    };
                }
                callee = Some(expr);
            }
            Rule::call_suffix => {
                if let Some(arg_list_pair) = part.into_inner().next() {
                    args = build_arg_list(arg_list_pair, map)?;
                }
            }
            _ => {}
        }
    }

    let callee = callee.ok_or_else(|| {
        ParseError::BuildError("'new' requires a constructor".to_string(), Some(span))
    })?;

    Ok(Expr::New {
        callee: Box::new(callee),
        args,
        span,
    })
}

fn build_function_expr(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let is_arrow = pair.as_rule() == Rule::arrow_function;
    let mut is_async = false;
    let mut name = None;
    let mut params = Vec::new();
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::param_list => params = build_params(part, map)?,
            Rule::arrow_params => {
                for param in part.into_inner() {
                    match param.as_rule() {
                        Rule::identifier => params.push(build_pattern(param, map)?),
                        Rule::param_list => params = build_params(param, map)?,
                        _ => {}
                    }
                }
            }
            Rule::block => {
                body = Some(FunctionBody::Block {
                    body: Box::new(build_block(part, map)?),
                })
            }
            Rule::arrow_body => {
                let body_span = map.span(&part);
                let mut body_inner = part.into_inner();
                let body_pair = expect_next(&mut body_inner, body_span, "arrow body")?;
                body = Some(match body_pair.as_rule() {
                    Rule::block => FunctionBody::Block {
                        body: Box::new(build_block(body_pair, map)?),
                    },
                    _ => FunctionBody::Expr {
                        expr: Box::new(build_expression(body_pair, map)?),
                    },
                });
            }
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        ParseError::BuildError("Function requires a body".to_string(), Some(span))
    })?;

    Ok(Expr::Function {
        name,
        params,
        is_async,
        is_arrow,
        body,
        span,
    })
}

fn build_expression(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);

    match pair.as_rule() {
        Rule::assign_expr | Rule::primary | Rule::literal | Rule::paren_expr => {
            let mut inner = pair.into_inner();
            build_expression(expect_next(&mut inner, span, "expression")?, map)
        }
        Rule::expression => {
            let mut exprs = pair
                .into_inner()
                .map(|expr_pair| build_expression(expr_pair, map))
                .collect::<ParseResult<Vec<_>>>()?;
            match exprs.len() {
                0 => Err(ParseError::BuildError(
                    "Empty expression".to_string(),
                    Some(span),
                )),
                1 => Ok(exprs.remove(0)),
                _ => Ok(Expr::Sequence { exprs, span }),
            }
        }
        Rule::spread_element => {
            let mut inner = pair.into_inner();
            let spread = build_expression(expect_next(&mut inner, span, "spread value")?, map)?;
            Ok(Expr::Spread {
                inner: Box::new(spread),
                span,
            })
        }
        Rule::assignment => {
            let mut inner = pair.into_inner();
            let target = build_expression(expect_next(&mut inner, span, "assignment target")?, map)?;
            let op = match expect_next(&mut inner, span, "assignment operator")?.as_str() {
                "+=" => AssignOp::AddAssign,
                "-=" => AssignOp::SubAssign,
                "*=" => AssignOp::MulAssign,
                "/=" => AssignOp::DivAssign,
                _ => AssignOp::Assign,
            };
            let value = build_expression(expect_next(&mut inner, span, "assigned value")?, map)?;
            Ok(Expr::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
                span,
            })
        }
        Rule::arrow_function | Rule::function_expr => build_function_expr(pair, map),
        Rule::ternary_expr => {
            let mut inner = pair.into_inner();
            let condition = build_expression(expect_next(&mut inner, span, "condition")?, map)?;

            if let Some(consequent_pair) = inner.next() {
                let consequent = build_expression(consequent_pair, map)?;
                let alternate =
                    build_expression(expect_next(&mut inner, span, "ternary alternate")?, map)?;
                Ok(Expr::Ternary {
                    condition: Box::new(condition),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                    span,
                })
            } else {
                Ok(condition)
            }
        }
        Rule::nullish_expr
        | Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr
        | Rule::exponent_expr => build_binary_expr(pair, map),
        Rule::unary_expr => build_unary_expr(pair, map),
        Rule::await_expr => {
            let mut inner = significant(pair);
            let inner_expr = build_expression(expect_next(&mut inner, span, "awaited value")?, map)?;
            Ok(Expr::Await {
                inner: Box::new(inner_expr),
                span,
            })
        }
        Rule::postfix_expr => {
            let mut inner = pair.into_inner();
            let target = build_expression(expect_next(&mut inner, span, "expression")?, map)?;
            match inner.next() {
                Some(suffix) => Ok(Expr::Update {
                    op: if suffix.as_str() == "++" {
                        UpdateOp::Inc
                    } else {
                        UpdateOp::Dec
                    },
                    prefix: false,
                    target: Box::new(target),
                    span,
                }),
                None => Ok(target),
            }
        }
        Rule::call_expr => build_call_expr(pair, map),
        Rule::new_expr => build_new_expr(pair, map),
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::number => {
            let num_str = pair.as_str();
            let v = number_value(num_str).map_err(|e| {
                ParseError::BuildError(
                    format!("Failed to parse number '{}': {}", num_str, e),
                    Some(span),
                )
            })?;
            Ok(Expr::LitNum { v, span })
        }
        Rule::regex => {
            let mut pattern = String::new();
            let mut flags = String::new();
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::regex_body => pattern = part.as_str().to_string(),
                    Rule::regex_flags => flags = part.as_str().to_string(),
                    _ => {}
                }
            }
            Ok(Expr::LitRegex {
                pattern,
                flags,
                span,
            })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
            span,
        }),
        Rule::string => {
            let content = pair
                .into_inner()
                .next()
                .map(|p| unescape(p.as_str()))
                .unwrap_or_default();
            Ok(Expr::LitStr { v: content, span })
        }
        Rule::null_lit => Ok(Expr::LitNull { span }),
        Rule::template => build_template(pair, map),
        Rule::array_lit => {
            let elements: Result<Vec<Expr>, ParseError> = pair
                .into_inner()
                .map(|element| build_expression(element, map))
                .collect();
            Ok(Expr::LitList {
                elements: elements?,
                span,
            })
        }
        Rule::object_lit => build_object_literal(pair, map),
        _ => Err(ParseError::BuildError(
            format!("Unexpected expression rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_arg_list(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Vec<Expr>> {
    pair.into_inner()
        .map(|expr_pair| build_expression(expr_pair, map))
        .collect()
}

fn build_template(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let mut quasis = vec![String::new()];
    let mut exprs = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::template_chars => {
                if let Some(last) = quasis.last_mut() {
                    last.push_str(&unescape(part.as_str()));
                }
            }
            Rule::template_sub => {
                let sub_span = map.span(&part);
                let mut sub_inner = part.into_inner();
                exprs.push(build_expression(
                    expect_next(&mut sub_inner, sub_span, "template expression")?,
                    map,
                )?);
                quasis.push(String::new());
            }
            _ => {}
        }
    }

    Ok(Expr::LitTemplate {
        quasis,
        exprs,
        span,
    })
}

fn build_object_literal(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<Expr> {
    let span = map.span(&pair);
    let properties: Result<Vec<_>, ParseError> = pair
        .into_inner()
        .map(|property_pair| build_property(property_pair, map))
        .collect();

    Ok(Expr::LitObj {
        properties: properties?,
        span,
    })
}

fn build_property(pair: Pair<Rule>, map: &SourceMap) -> ParseResult<(String, Span, Expr)> {
    let span = map.span(&pair);
    let mut outer = pair.into_inner();
    let inner = expect_next(&mut outer, span, "property")?;
    let inner_span = map.span(&inner);

    match inner.as_rule() {
        Rule::property_pair => {
            let mut inner_pairs = inner.into_inner();
            let key_pair = expect_next(&mut inner_pairs, inner_span, "property key")?;
            let key_span = map.span(&key_pair);
            let key = property_key(key_pair);
            let value_pair = expect_next(&mut inner_pairs, inner_span, "property value")?;
            let value = build_expression(value_pair, map)?;
            Ok((key, key_span, value))
        }
        Rule::spread_element => {
            let value = build_expression(inner, map)?;
            Ok(("...".to_string(), inner_span, value))
        }
        Rule::method_def => {
            let (name, _, function) = build_method(inner, map)?;
            Ok((name, inner_span, function))
        }
        Rule::property_shorthand => {
            let key = inner.as_str().to_string();
            let value = Expr::Ident {
                name: key.clone(),
                span: inner_span,
            };
            Ok((key, inner_span, value))
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected property rule: {:?}", inner.as_rule()),
            Some(inner_span),
        )),
    }
}

fn property_key(pair: Pair<Rule>) -> String {
    let text = pair.as_str().to_string();
    match pair.into_inner().next() {
        Some(key) if key.as_rule() == Rule::string => key
            .into_inner()
            .next()
            .map(|content| unescape(content.as_str()))
            .unwrap_or_default(),
        Some(key) => key.as_str().to_string(),
        None => text,
    }
}

/// Value of a number token; radix prefixes and `_` separators are allowed
fn number_value(raw: &str) -> Result<f64, std::num::ParseFloatError> {
    let digits: String = raw.chars().filter(|ch| *ch != '_').collect();
    let radix = match digits.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0b" | "0B") => 2,
        Some("0o" | "0O") => 8,
        _ => return digits.parse::<f64>(),
    };
    Ok(digits[2..]
        .chars()
        .filter_map(|ch| ch.to_digit(radix))
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(digit)))
}

/// Resolve backslash escapes in string and template content
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
