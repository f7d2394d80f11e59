//! Syntax step extractor
//!
//! Pre-order, document-order walk over a parsed program. The walk threads an
//! [`Extraction`] context by value: every visit takes the context and returns
//! it with any new steps, declared functions and bound variables added.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::classifier::{classify, nested_action, Ancestor, Node};
use super::{render, Step};
use crate::parser::parse_program;
use crate::types::ast::{ClassMember, Expr, FunctionBody, Pattern, Program, Stmt};
use crate::types::Val;

/// Entry in the declared-function table (display only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<String>,
    pub is_async: bool,
    pub source_line: usize,
}

/// Accumulated result of a walk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub steps: Vec<Step>,
    pub functions: BTreeMap<String, FunctionInfo>,
    pub variables: BTreeMap<String, Val>,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `node` against the current tables and append the step
    fn emit(mut self, node: Node<'_>, ancestry: &[Ancestor]) -> Self {
        let step = classify(node, ancestry, &self);
        for (name, value) in &step.bound_variables {
            self.variables.insert(name.clone(), value.clone());
        }
        self.steps.push(step);
        self
    }

    fn declare_function(mut self, info: FunctionInfo) -> Self {
        self.functions.insert(info.name.clone(), info);
        self
    }
}

/* ===================== Public API ===================== */

/// Compile source text into its ordered list of steps
///
/// Never fails: unparseable input yields a single `Error` step carrying the
/// parser message, empty input yields no steps.
pub fn parse_code_to_steps(source: &str) -> Vec<Step> {
    extract_program(source).steps
}

/// Compile source text, keeping the function and variable tables
pub fn extract_program(source: &str) -> Extraction {
    match parse_program(source) {
        Ok(program) => extract(&program),
        Err(err) => {
            let line = err.span().map(|span| span.line()).unwrap_or(1);
            tracing::debug!(line, error = %err, "Source failed to parse");
            Extraction {
                steps: vec![Step::parse_error(err.message(), line)],
                ..Extraction::default()
            }
        }
    }
}

/// Walk an already parsed program
pub fn extract(program: &Program) -> Extraction {
    let mut ancestry = Vec::new();
    let cx = program
        .body
        .iter()
        .fold(Extraction::new(), |cx, stmt| visit_stmt(cx, stmt, &mut ancestry));
    tracing::debug!(
        steps = cx.steps.len(),
        functions = cx.functions.len(),
        "Extracted steps"
    );
    cx
}

/* ===================== Statements ===================== */

fn visit_stmt(cx: Extraction, stmt: &Stmt, ancestry: &mut Vec<Ancestor>) -> Extraction {
    match stmt {
        Stmt::Block { body, .. } => body
            .iter()
            .fold(cx, |cx, child| visit_stmt(cx, child, ancestry)),
        Stmt::Empty { .. } => cx,
        Stmt::Declare { declarators, .. } => {
            let mut cx = cx;
            for declarator in declarators {
                if let (
                    Some(name),
                    Some(Expr::Function {
                        params, is_async, ..
                    }),
                ) = (declarator.target.as_ident(), &declarator.init)
                {
                    cx = cx.declare_function(FunctionInfo {
                        name: name.to_string(),
                        params: params.iter().map(render::pattern).collect(),
                        is_async: *is_async,
                        source_line: declarator.span.line(),
                    });
                }
            }
            let mut cx = cx.emit(Node::Stmt(stmt), ancestry);
            for declarator in declarators {
                cx = visit_pattern_defaults(cx, &declarator.target, ancestry);
                cx = match (declarator.target.as_ident(), &declarator.init) {
                    (Some(name), Some(Expr::Function { body, .. })) => within(
                        cx,
                        ancestry,
                        Ancestor::Function(name.to_string()),
                        |cx, ancestry| visit_function_body(cx, body, ancestry),
                    ),
                    (_, Some(init)) => visit_expr(cx, init, ancestry),
                    (_, None) => cx,
                };
            }
            cx
        }
        Stmt::FunctionDecl {
            name,
            params,
            is_async,
            body,
            span,
        } => {
            let cx = cx
                .declare_function(FunctionInfo {
                    name: name.clone(),
                    params: params.iter().map(render::pattern).collect(),
                    is_async: *is_async,
                    source_line: span.line(),
                })
                .emit(Node::Stmt(stmt), ancestry);
            within(cx, ancestry, Ancestor::Function(name.clone()), |cx, ancestry| {
                visit_stmt(cx, body, ancestry)
            })
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            let cx = visit_expr(cx, test, ancestry);
            within(cx, ancestry, Ancestor::Conditional, |cx, ancestry| {
                let cx = visit_stmt(cx, then_s, ancestry);
                match else_s {
                    Some(else_s) => visit_stmt(cx, else_s, ancestry),
                    None => cx,
                }
            })
        }
        Stmt::While { test, body, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            let cx = visit_expr(cx, test, ancestry);
            within(cx, ancestry, Ancestor::Loop, |cx, ancestry| {
                visit_stmt(cx, body, ancestry)
            })
        }
        Stmt::DoWhile { body, test, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            let cx = within(cx, ancestry, Ancestor::Loop, |cx, ancestry| {
                visit_stmt(cx, body, ancestry)
            });
            visit_expr(cx, test, ancestry)
        }
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            let mut cx = cx.emit(Node::Stmt(stmt), ancestry);
            if let Some(init) = init {
                cx = visit_stmt(cx, init, ancestry);
            }
            if let Some(test) = test {
                cx = visit_expr(cx, test, ancestry);
            }
            if let Some(update) = update {
                cx = visit_expr(cx, update, ancestry);
            }
            within(cx, ancestry, Ancestor::Loop, |cx, ancestry| {
                visit_stmt(cx, body, ancestry)
            })
        }
        Stmt::ForLoop { iterable, body, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            let cx = visit_expr(cx, iterable, ancestry);
            within(cx, ancestry, Ancestor::Loop, |cx, ancestry| {
                visit_stmt(cx, body, ancestry)
            })
        }
        Stmt::Return { value, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            match value {
                Some(value) => visit_expr(cx, value, ancestry),
                None => cx,
            }
        }
        Stmt::Throw { value, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            visit_expr(cx, value, ancestry)
        }
        Stmt::Break { .. } | Stmt::Continue { .. } => cx.emit(Node::Stmt(stmt), ancestry),
        Stmt::Try {
            body,
            catch_body,
            finally_body,
            ..
        } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            within(cx, ancestry, Ancestor::Try, |cx, ancestry| {
                let mut cx = visit_stmt(cx, body, ancestry);
                if let Some(catch_body) = catch_body {
                    cx = visit_stmt(cx, catch_body, ancestry);
                }
                if let Some(finally_body) = finally_body {
                    cx = visit_stmt(cx, finally_body, ancestry);
                }
                cx
            })
        }
        Stmt::Switch {
            discriminant,
            cases,
            ..
        } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            let cx = visit_expr(cx, discriminant, ancestry);
            within(cx, ancestry, Ancestor::Conditional, |cx, ancestry| {
                cases.iter().fold(cx, |cx, case| {
                    let cx = match &case.test {
                        Some(test) => visit_expr(cx, test, ancestry),
                        None => cx,
                    };
                    case.body
                        .iter()
                        .fold(cx, |cx, child| visit_stmt(cx, child, ancestry))
                })
            })
        }
        Stmt::ClassDecl {
            name,
            superclass,
            members,
            ..
        } => {
            let mut cx = cx.emit(Node::Stmt(stmt), ancestry);
            if let Some(base) = superclass {
                cx = visit_expr(cx, base, ancestry);
            }
            members.iter().fold(cx, |cx, member| match member {
                ClassMember::Method {
                    name: method,
                    function: Expr::Function { body, .. },
                    ..
                } => within(
                    cx,
                    ancestry,
                    Ancestor::Function(format!("{}.{}", name, method)),
                    |cx, ancestry| visit_function_body(cx, body, ancestry),
                ),
                ClassMember::Method { function, .. } => visit_expr(cx, function, ancestry),
                ClassMember::Field {
                    value: Some(value), ..
                } => visit_expr(cx, value, ancestry),
                ClassMember::Field { value: None, .. } => cx,
            })
        }
        Stmt::Labeled { body, .. } => visit_stmt(cx, body, ancestry),
        Stmt::Unknown { .. } => cx.emit(Node::Stmt(stmt), ancestry),
        Stmt::Expr { expr, .. } => {
            let cx = cx.emit(Node::Stmt(stmt), ancestry);
            visit_expr_children(cx, expr, ancestry)
        }
    }
}

/// Walk the default values inside a binding pattern
fn visit_pattern_defaults(
    cx: Extraction,
    pattern: &Pattern,
    ancestry: &mut Vec<Ancestor>,
) -> Extraction {
    match pattern {
        Pattern::Ident { .. } => cx,
        Pattern::Array { elements, .. } => elements
            .iter()
            .flatten()
            .fold(cx, |cx, element| visit_pattern_defaults(cx, element, ancestry)),
        Pattern::Object { properties, .. } => properties
            .iter()
            .fold(cx, |cx, (_, target)| visit_pattern_defaults(cx, target, ancestry)),
        Pattern::Rest { target, .. } => visit_pattern_defaults(cx, target, ancestry),
        Pattern::Default { target, value, .. } => {
            let cx = visit_pattern_defaults(cx, target, ancestry);
            visit_expr(cx, value, ancestry)
        }
    }
}

/* ===================== Expressions ===================== */

/// Emit a step for `expr` if it is scheduling-relevant, then walk its children
fn visit_expr(cx: Extraction, expr: &Expr, ancestry: &mut Vec<Ancestor>) -> Extraction {
    let cx = if nested_action(expr, &cx).is_some() {
        cx.emit(Node::Expr(expr), ancestry)
    } else {
        cx
    };
    visit_expr_children(cx, expr, ancestry)
}

fn visit_expr_children(cx: Extraction, expr: &Expr, ancestry: &mut Vec<Ancestor>) -> Extraction {
    match expr {
        Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull { .. }
        | Expr::LitRegex { .. }
        | Expr::Ident { .. } => cx,
        Expr::LitTemplate { exprs, .. } => visit_all(cx, exprs, ancestry),
        Expr::LitList { elements, .. } => visit_all(cx, elements, ancestry),
        Expr::LitObj { properties, .. } => properties
            .iter()
            .fold(cx, |cx, (_, _, value)| visit_expr(cx, value, ancestry)),
        Expr::Member { object, .. } => visit_expr(cx, object, ancestry),
        Expr::Index { object, index, .. } => {
            let cx = visit_expr(cx, object, ancestry);
            visit_expr(cx, index, ancestry)
        }
        Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
            let cx = visit_expr(cx, callee, ancestry);
            let owner = callback_owner(callee);
            args.iter().fold(cx, |cx, arg| match arg {
                Expr::Function { body, .. } => within(
                    cx,
                    ancestry,
                    Ancestor::Callback { of: owner.clone() },
                    |cx, ancestry| visit_function_body(cx, body, ancestry),
                ),
                _ => visit_expr(cx, arg, ancestry),
            })
        }
        Expr::Await { inner, .. } => visit_expr(cx, inner, ancestry),
        Expr::Function { name, body, .. } => {
            let label = name.clone().unwrap_or_else(|| "anonymous".to_string());
            within(cx, ancestry, Ancestor::Function(label), |cx, ancestry| {
                visit_function_body(cx, body, ancestry)
            })
        }
        Expr::Unary { operand, .. } => visit_expr(cx, operand, ancestry),
        Expr::Update { target, .. } => visit_expr(cx, target, ancestry),
        Expr::BinaryOp { left, right, .. } => {
            let cx = visit_expr(cx, left, ancestry);
            visit_expr(cx, right, ancestry)
        }
        Expr::Assign { target, value, .. } => {
            let cx = visit_expr(cx, target, ancestry);
            visit_expr(cx, value, ancestry)
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            let cx = visit_expr(cx, condition, ancestry);
            let cx = visit_expr(cx, consequent, ancestry);
            visit_expr(cx, alternate, ancestry)
        }
        Expr::Spread { inner, .. } => visit_expr(cx, inner, ancestry),
        Expr::Sequence { exprs, .. } => visit_all(cx, exprs, ancestry),
    }
}

fn visit_all(cx: Extraction, exprs: &[Expr], ancestry: &mut Vec<Ancestor>) -> Extraction {
    exprs
        .iter()
        .fold(cx, |cx, expr| visit_expr(cx, expr, ancestry))
}

fn visit_function_body(
    cx: Extraction,
    body: &FunctionBody,
    ancestry: &mut Vec<Ancestor>,
) -> Extraction {
    match body {
        FunctionBody::Block { body } => visit_stmt(cx, body, ancestry),
        FunctionBody::Expr { expr } => visit_expr(cx, expr, ancestry),
    }
}

/// Run `visit` with `ancestor` pushed onto the ancestry
fn within<F>(
    cx: Extraction,
    ancestry: &mut Vec<Ancestor>,
    ancestor: Ancestor,
    visit: F,
) -> Extraction
where
    F: FnOnce(Extraction, &mut Vec<Ancestor>) -> Extraction,
{
    ancestry.push(ancestor);
    let cx = visit(cx, ancestry);
    ancestry.pop();
    cx
}

/// Name used to label callbacks passed to a call
fn callback_owner(callee: &Expr) -> String {
    match callee {
        Expr::Member { property, .. } => match callee.dotted_name() {
            Some(name) => name,
            None => format!(".{}", property),
        },
        other => other.dotted_name().unwrap_or_else(|| "anonymous".to_string()),
    }
}

