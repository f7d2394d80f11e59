//! Step classifier
//!
//! Pure mapping from a syntax node (plus the constructs enclosing it) to step
//! metadata. Classification is structural: callee names and node shapes are
//! inspected, nothing is evaluated except arithmetic on two numeric literals.

use std::collections::BTreeMap;

use super::extractor::Extraction;
use super::render;
use super::{ActionTag, NodeKind, Priority, QueueId, Step};
use crate::types::ast::{
    AssignOp, BinaryOp, Declarator, Expr, ForLoopKind, Stmt, UnaryOp, UpdateOp,
};
use crate::types::values::{format_num, Val};

/// Delay used when a timer's delay argument is missing or not a usable literal
pub const DEFAULT_TIMER_DELAY_MS: u64 = 1000;

/// Simulated latency of a network request
pub const NETWORK_DELAY_MS: u64 = 2000;

const CONSOLE_METHODS: &[&str] = &["log", "info", "warn", "error", "debug", "table"];
const TIMER_FUNCTIONS: &[&str] = &["setTimeout", "setInterval"];
const NETWORK_FUNCTIONS: &[&str] = &["fetch"];
const DEFERRED_FUNCTIONS: &[&str] = &["queueMicrotask", "process.nextTick"];
const PROMISE_CONTINUATIONS: &[&str] = &["then", "catch", "finally"];
const GLOBAL_PREFIXES: &[&str] = &["window.", "globalThis.", "global."];

const EXCERPT_CHARS: usize = 60;

/// Node handed to the classifier
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

/// Construct enclosing the node being classified, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestor {
    Function(String),
    Callback { of: String },
    Conditional,
    Loop,
    Try,
}

impl Ancestor {
    fn describe(&self) -> String {
        match self {
            Ancestor::Function(name) => format!("in {}()", name),
            Ancestor::Callback { of } => format!("in {} callback", of),
            Ancestor::Conditional => "in conditional branch".to_string(),
            Ancestor::Loop => "in loop body".to_string(),
            Ancestor::Try => "in try block".to_string(),
        }
    }
}

/// Classify a node into a step
///
/// Total over every node kind: anything without a dedicated rule becomes a
/// generic `statement` step on the call stack. `known` is only read, for the
/// literal variable table and the declared function names.
pub fn classify(node: Node<'_>, ancestry: &[Ancestor], known: &Extraction) -> Step {
    let mut step = match node {
        Node::Stmt(stmt) => classify_stmt(stmt, known),
        Node::Expr(expr) => classify_expr(expr, known, expr_kind(expr)),
    };

    if let Some(context) = ancestry.last() {
        step.description = format!("{} ({})", step.description, context.describe());
    }
    step
}

/// Action a nested expression would get, if it is worth its own step
///
/// Only scheduling-relevant calls, suspensions and calls to declared functions
/// qualify.
pub fn nested_action(expr: &Expr, known: &Extraction) -> Option<ActionTag> {
    match call_shape(expr, known) {
        Some(CallShape::Other) | None => None,
        Some(shape) => Some(shape.action()),
    }
}

fn expr_kind(expr: &Expr) -> NodeKind {
    match expr {
        Expr::Call { .. } => NodeKind::CallExpression,
        Expr::New { .. } => NodeKind::NewExpression,
        Expr::Await { .. } => NodeKind::AwaitExpression,
        _ => NodeKind::ExpressionStatement,
    }
}

fn classify_stmt(stmt: &Stmt, known: &Extraction) -> Step {
    let line = stmt.span().line();

    match stmt {
        Stmt::Declare {
            var_kind,
            declarators,
            ..
        } => {
            // Later declarators see the earlier ones: `let a = 1, b = a`
            let mut scope = known.variables.clone();
            let mut bound = BTreeMap::new();
            let mut parts = Vec::new();
            for declarator in declarators {
                let part = declarator_source(declarator);
                let values = match declarator.target.as_ident() {
                    Some(name) => {
                        let value = match &declarator.init {
                            Some(init) => resolve_value(init, &scope),
                            None => Val::Undefined,
                        };
                        vec![(name, value)]
                    }
                    // Destructured names are never resolved
                    None => declarator
                        .target
                        .names()
                        .into_iter()
                        .map(|name| (name, Val::Opaque(part.clone())))
                        .collect(),
                };
                for (name, value) in values {
                    scope.insert(name.to_string(), value.clone());
                    bound.insert(name.to_string(), value);
                }
                parts.push(part);
            }
            let mut step = Step::sync(
                NodeKind::VariableDeclaration,
                ActionTag::VariableDeclaration,
                line,
                format!("Declare {} {}", var_kind.keyword(), parts.join(", ")),
            );
            step.bound_variables = bound;
            step
        }
        Stmt::FunctionDecl {
            name,
            params,
            is_async,
            ..
        } => Step::sync(
            NodeKind::FunctionDeclaration,
            ActionTag::FunctionDeclaration,
            line,
            format!(
                "Declare {}function {}({})",
                if *is_async { "async " } else { "" },
                name,
                render::param_list(params)
            ),
        ),
        Stmt::If { test, .. } => Step::sync(
            NodeKind::IfStatement,
            ActionTag::Conditional,
            line,
            format!("Check condition: {}", render::expr(test)),
        ),
        Stmt::While { test, .. } => Step::sync(
            NodeKind::WhileStatement,
            ActionTag::Loop,
            line,
            format!("Loop while {}", render::expr(test)),
        ),
        Stmt::DoWhile { test, .. } => Step::sync(
            NodeKind::DoWhileStatement,
            ActionTag::Loop,
            line,
            format!("Loop do … while {}", render::expr(test)),
        ),
        Stmt::For {
            init, test, update, ..
        } => {
            let init = match init.as_deref() {
                Some(Stmt::Declare {
                    var_kind,
                    declarators,
                    ..
                }) => {
                    let parts: Vec<String> = declarators.iter().map(declarator_source).collect();
                    format!("{} {}", var_kind.keyword(), parts.join(", "))
                }
                Some(Stmt::Expr { expr, .. }) => render::expr(expr),
                _ => String::new(),
            };
            let test = test.as_ref().map(render::expr).unwrap_or_default();
            let update = update.as_ref().map(render::expr).unwrap_or_default();
            Step::sync(
                NodeKind::ForStatement,
                ActionTag::Loop,
                line,
                format!("Loop for ({}; {}; {})", init, test, update),
            )
        }
        Stmt::ForLoop {
            kind,
            var_kind,
            binding,
            iterable,
            ..
        } => {
            let (node_kind, word) = match kind {
                ForLoopKind::Of => (NodeKind::ForOfStatement, "of"),
                ForLoopKind::In => (NodeKind::ForInStatement, "in"),
            };
            let binding = match var_kind {
                Some(var_kind) => format!("{} {}", var_kind.keyword(), render::pattern(binding)),
                None => render::pattern(binding),
            };
            Step::sync(
                node_kind,
                ActionTag::Loop,
                line,
                format!("Loop for ({} {} {})", binding, word, render::expr(iterable)),
            )
        }
        Stmt::Return { value, .. } => Step::sync(
            NodeKind::ReturnStatement,
            ActionTag::Statement,
            line,
            match value {
                Some(value) => format!("Return {}", render::expr(value)),
                None => "Return".to_string(),
            },
        ),
        Stmt::Throw { value, .. } => Step::sync(
            NodeKind::ThrowStatement,
            ActionTag::Statement,
            line,
            format!("Throw {}", render::expr(value)),
        ),
        Stmt::Break { .. } => Step::sync(
            NodeKind::BreakStatement,
            ActionTag::Statement,
            line,
            "Break out of loop".to_string(),
        ),
        Stmt::Continue { .. } => Step::sync(
            NodeKind::ContinueStatement,
            ActionTag::Statement,
            line,
            "Continue to next iteration".to_string(),
        ),
        Stmt::Try { catch_var, .. } => Step::sync(
            NodeKind::TryStatement,
            ActionTag::Statement,
            line,
            match catch_var {
                Some(var) => format!("Enter try block (errors caught as {})", var),
                None => "Enter try block".to_string(),
            },
        ),
        Stmt::Block { body, .. } => Step::sync(
            NodeKind::BlockStatement,
            ActionTag::Statement,
            line,
            format!("Enter block of {} statement(s)", body.len()),
        ),
        Stmt::Empty { .. } => Step::sync(
            NodeKind::EmptyStatement,
            ActionTag::Statement,
            line,
            "Empty statement".to_string(),
        ),
        Stmt::Switch {
            discriminant,
            cases,
            ..
        } => Step::sync(
            NodeKind::SwitchStatement,
            ActionTag::Conditional,
            line,
            format!(
                "Switch on {} ({} case(s))",
                render::expr(discriminant),
                cases.len()
            ),
        ),
        Stmt::ClassDecl {
            name, superclass, ..
        } => Step::sync(
            NodeKind::ClassDeclaration,
            ActionTag::FunctionDeclaration,
            line,
            match superclass {
                Some(base) => format!("Declare class {} extends {}", name, render::expr(base)),
                None => format!("Declare class {}", name),
            },
        ),
        // A label only names its statement
        Stmt::Labeled { label, body, .. } => {
            let mut step = classify_stmt(body, known);
            step.description = format!("{}: {}", label, step.description);
            step
        }
        Stmt::Unknown { text, .. } => Step::sync(
            NodeKind::UnsupportedStatement,
            ActionTag::Statement,
            line,
            format!("Unsupported statement: {}", excerpt(text)),
        ),
        Stmt::Expr { expr, .. } => classify_expr(expr, known, NodeKind::ExpressionStatement),
    }
}

fn declarator_source(declarator: &Declarator) -> String {
    let target = render::pattern(&declarator.target);
    match &declarator.init {
        Some(init) => format!("{} = {}", target, render::expr(init)),
        None => target,
    }
}

/// Whitespace-collapsed source, cut to [`EXCERPT_CHARS`]
fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

fn classify_expr(expr: &Expr, known: &Extraction, kind: NodeKind) -> Step {
    let line = expr.span().line();

    match expr {
        Expr::Assign {
            op, target, value, ..
        } => {
            let mut step = Step::sync(
                kind,
                ActionTag::VariableAssignment,
                line,
                format!("Assign {}", render::expr(expr)),
            );
            if let Expr::Ident { name, .. } = target.as_ref() {
                let bound = match op {
                    AssignOp::Assign => resolve_value(value, &known.variables),
                    _ => Val::Opaque(format!(
                        "{} {} {}",
                        name,
                        compound_symbol(*op),
                        render::expr(value)
                    )),
                };
                step.bound_variables.insert(name.clone(), bound);
            }
            step
        }
        Expr::Update { op, target, .. } => {
            let mut step = Step::sync(
                kind,
                ActionTag::VariableAssignment,
                line,
                format!("Update {}", render::expr(expr)),
            );
            if let Expr::Ident { name, .. } = target.as_ref() {
                let symbol = match op {
                    UpdateOp::Inc => "+",
                    UpdateOp::Dec => "-",
                };
                step.bound_variables
                    .insert(name.clone(), Val::Opaque(format!("{} {} 1", name, symbol)));
            }
            step
        }
        _ => match call_shape(expr, known) {
            Some(shape) => shape.into_step(expr, kind, line, known),
            None => Step::sync(
                kind,
                ActionTag::Statement,
                line,
                format!("Evaluate {}", render::expr(expr)),
            ),
        },
    }
}

/* ===================== Call Shapes ===================== */

/// Scheduling-relevant shape of a call-like expression
enum CallShape {
    Console(String),
    Timer(String),
    Network(String),
    Deferred(String),
    Await,
    Declared(String),
    Other,
}

impl CallShape {
    fn action(&self) -> ActionTag {
        match self {
            CallShape::Console(_) => ActionTag::Console,
            CallShape::Timer(_) => ActionTag::Timer,
            CallShape::Network(_) => ActionTag::Network,
            CallShape::Deferred(_) | CallShape::Await => ActionTag::Deferred,
            CallShape::Declared(_) => ActionTag::FunctionCall,
            CallShape::Other => ActionTag::Statement,
        }
    }

    fn into_step(self, expr: &Expr, kind: NodeKind, line: usize, known: &Extraction) -> Step {
        let source = render::expr(expr);
        let action = self.action();

        match self {
            CallShape::Console(_) => {
                let payload = match expr {
                    Expr::Call { args, .. } => console_payload(args, &known.variables),
                    _ => String::new(),
                };
                Step {
                    output_payload: Some(payload),
                    ..Step::sync(kind, action, line, format!("Log {}", source))
                }
            }
            CallShape::Timer(name) => {
                let delay_ms = match expr {
                    Expr::Call { args, .. } => timer_delay(args, &known.variables),
                    _ => DEFAULT_TIMER_DELAY_MS,
                };
                Step {
                    is_async: true,
                    delay_ms,
                    target_queue: QueueId::PendingAsync,
                    ..Step::sync(
                        kind,
                        action,
                        line,
                        format!("Register {} for {}ms", name, delay_ms),
                    )
                }
            }
            CallShape::Network(name) => Step {
                is_async: true,
                delay_ms: NETWORK_DELAY_MS,
                target_queue: QueueId::PendingAsync,
                ..Step::sync(
                    kind,
                    action,
                    line,
                    format!("Start {} request: {}", name, source),
                )
            },
            CallShape::Deferred(_) | CallShape::Await => {
                let description = match expr {
                    Expr::Await { inner, .. } => format!("Await {}", render::expr(inner)),
                    _ => format!("Queue deferred {}", source),
                };
                Step {
                    is_async: true,
                    target_queue: QueueId::DeferredQueue,
                    priority: Priority::High,
                    ..Step::sync(kind, action, line, description)
                }
            }
            CallShape::Declared(name) => {
                Step::sync(kind, action, line, format!("Call {}() : {}", name, source))
            }
            CallShape::Other => Step::sync(kind, action, line, format!("Call {}", source)),
        }
    }
}

fn call_shape(expr: &Expr, known: &Extraction) -> Option<CallShape> {
    match expr {
        Expr::Await { .. } => Some(CallShape::Await),
        Expr::New { callee, .. } => match callee.dotted_name() {
            Some(name) if strip_global(&name) == "Promise" => {
                Some(CallShape::Deferred("new Promise".to_string()))
            }
            _ => Some(CallShape::Other),
        },
        Expr::Call { callee, .. } => {
            if let Expr::Member { property, .. } = callee.as_ref() {
                if PROMISE_CONTINUATIONS.contains(&property.as_str()) {
                    return Some(CallShape::Deferred(format!(".{}", property)));
                }
            }

            let Some(full_name) = callee.dotted_name() else {
                return Some(CallShape::Other);
            };
            let name = strip_global(&full_name);

            let shape = if let Some(method) = name.strip_prefix("console.") {
                if CONSOLE_METHODS.contains(&method) {
                    CallShape::Console(name.to_string())
                } else {
                    CallShape::Other
                }
            } else if TIMER_FUNCTIONS.contains(&name) {
                CallShape::Timer(name.to_string())
            } else if NETWORK_FUNCTIONS.contains(&name) {
                CallShape::Network(name.to_string())
            } else if DEFERRED_FUNCTIONS.contains(&name) || name.starts_with("Promise.") {
                CallShape::Deferred(name.to_string())
            } else if known.functions.contains_key(name) {
                CallShape::Declared(name.to_string())
            } else {
                CallShape::Other
            };
            Some(shape)
        }
        _ => None,
    }
}

fn strip_global(name: &str) -> &str {
    GLOBAL_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/* ===================== Payloads & Values ===================== */

/// Space-joined string form of console arguments
fn console_payload(args: &[Expr], variables: &BTreeMap<String, Val>) -> String {
    args.iter()
        .map(|arg| display_arg(arg, variables))
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_arg(arg: &Expr, variables: &BTreeMap<String, Val>) -> String {
    match arg {
        Expr::LitTemplate { quasis, exprs, .. } => {
            let mut out = String::new();
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(sub) = exprs.get(i) {
                    out.push_str(&display_arg(sub, variables));
                }
            }
            out
        }
        Expr::Ident { name, .. } => match variables.get(name) {
            Some(val) if val.is_literal() => val.to_string(),
            _ => name.clone(),
        },
        other => match literal_value(other) {
            Some(val) => val.to_string(),
            None => render::expr(other),
        },
    }
}

/// Delay from the second argument of a timer call
fn timer_delay(args: &[Expr], variables: &BTreeMap<String, Val>) -> u64 {
    let delay = match args.get(1) {
        Some(Expr::Ident { name, .. }) => variables.get(name).and_then(Val::as_num),
        Some(arg) => literal_value(arg).as_ref().and_then(Val::as_num),
        None => None,
    };
    match delay {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms as u64,
        _ => DEFAULT_TIMER_DELAY_MS,
    }
}

/// Value of a literal expression (a negated number counts as literal)
fn literal_value(expr: &Expr) -> Option<Val> {
    match expr {
        Expr::LitNum { v, .. } => Some(Val::Num(*v)),
        Expr::LitStr { v, .. } => Some(Val::Str(v.clone())),
        Expr::LitBool { v, .. } => Some(Val::Bool(*v)),
        Expr::LitNull { .. } => Some(Val::Null),
        Expr::LitTemplate { quasis, exprs, .. } if exprs.is_empty() => {
            Some(Val::Str(quasis.concat()))
        }
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
            ..
        } => match operand.as_ref() {
            Expr::LitNum { v, .. } => Some(Val::Num(-v)),
            _ => None,
        },
        _ => None,
    }
}

/// Value bound by a declaration or assignment
///
/// Literals resolve to themselves, identifiers through the literal table, and
/// binary arithmetic on two numeric literals is evaluated. Anything else is
/// an opaque placeholder holding the rendered source.
pub fn resolve_value(expr: &Expr, variables: &BTreeMap<String, Val>) -> Val {
    if let Some(val) = literal_value(expr) {
        return val;
    }

    match expr {
        Expr::Ident { name, .. } if name == "undefined" => Val::Undefined,
        Expr::Ident { name, .. } => match variables.get(name) {
            Some(val) if val.is_literal() => val.clone(),
            _ => Val::Opaque(name.clone()),
        },
        Expr::BinaryOp {
            op, left, right, ..
        } if op.is_arithmetic() => {
            let operands = (
                literal_value(left).as_ref().and_then(Val::as_num),
                literal_value(right).as_ref().and_then(Val::as_num),
            );
            match operands {
                (Some(l), Some(r)) => match arithmetic(*op, l, r) {
                    Some(n) => Val::Num(n),
                    None => Val::Opaque(render::expr(expr)),
                },
                _ => Val::Opaque(render::expr(expr)),
            }
        }
        _ => Val::Opaque(render::expr(expr)),
    }
}

fn arithmetic(op: BinaryOp, l: f64, r: f64) -> Option<f64> {
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Mod => l % r,
        BinaryOp::Pow => l.powf(r),
        _ => return None,
    };
    result.is_finite().then_some(result)
}

fn compound_symbol(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::AddAssign => "+",
        AssignOp::SubAssign => "-",
        AssignOp::MulAssign => "*",
        AssignOp::DivAssign => "/",
    }
}

/// Display form of a literal-table value for descriptions
pub fn describe_value(val: &Val) -> String {
    match val {
        Val::Str(s) => render::quote(s),
        Val::Num(n) => format_num(*n),
        other => other.to_string(),
    }
}
