//! Compact source rendering of expressions
//!
//! Used for step descriptions and for the opaque placeholders recorded when a
//! bound value cannot be resolved without executing anything. Function bodies
//! are elided.

use crate::types::ast::{BinaryOp, Expr, FunctionBody, Pattern, UpdateOp};
use crate::types::values::format_num;

pub fn expr(e: &Expr) -> String {
    match e {
        Expr::LitBool { v, .. } => v.to_string(),
        Expr::LitNum { v, .. } => format_num(*v),
        Expr::LitStr { v, .. } => quote(v),
        Expr::LitNull { .. } => "null".to_string(),
        Expr::LitTemplate { quasis, exprs, .. } => {
            let mut out = String::from("`");
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(sub) = exprs.get(i) {
                    out.push_str("${");
                    out.push_str(&expr(sub));
                    out.push('}');
                }
            }
            out.push('`');
            out
        }
        Expr::LitRegex { pattern, flags, .. } => format!("/{}/{}", pattern, flags),
        Expr::LitList { elements, .. } => format!("[{}]", list(elements)),
        Expr::LitObj { properties, .. } => {
            if properties.is_empty() {
                return "{}".to_string();
            }
            let fields: Vec<String> = properties
                .iter()
                .map(|(key, _, value)| match value {
                    Expr::Ident { name, .. } if name == key => key.clone(),
                    Expr::Spread { .. } => expr(value),
                    _ => format!("{}: {}", key, expr(value)),
                })
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
        Expr::Ident { name, .. } => name.clone(),
        Expr::Member {
            object,
            property,
            optional,
            ..
        } => {
            let dot = if *optional { "?." } else { "." };
            format!("{}{}{}", operand(object), dot, property)
        }
        Expr::Index { object, index, .. } => format!("{}[{}]", operand(object), expr(index)),
        Expr::Call { callee, args, .. } => format!("{}({})", operand(callee), list(args)),
        Expr::New { callee, args, .. } => format!("new {}({})", expr(callee), list(args)),
        Expr::Await { inner, .. } => format!("await {}", operand(inner)),
        Expr::Function {
            name,
            params,
            is_async,
            is_arrow,
            body,
            ..
        } => {
            let prefix = if *is_async { "async " } else { "" };
            let body = match body {
                FunctionBody::Block { .. } => "{ … }".to_string(),
                FunctionBody::Expr { expr: body_expr } => expr(body_expr),
            };
            if *is_arrow {
                format!("{}({}) => {}", prefix, param_list(params), body)
            } else {
                format!(
                    "{}function{}({}) {}",
                    prefix,
                    name.as_deref().map(|n| format!(" {}", n)).unwrap_or_default(),
                    param_list(params),
                    body
                )
            }
        }
        Expr::Unary { op, operand: inner, .. } => format!("{}{}", op.symbol(), operand(inner)),
        Expr::Update {
            op, prefix, target, ..
        } => {
            let symbol = match op {
                UpdateOp::Inc => "++",
                UpdateOp::Dec => "--",
            };
            if *prefix {
                format!("{}{}", symbol, operand(target))
            } else {
                format!("{}{}", operand(target), symbol)
            }
        }
        Expr::BinaryOp {
            op, left, right, ..
        } => {
            let level = precedence(*op);
            format!(
                "{} {} {}",
                binary_side(left, level, false),
                op.symbol(),
                binary_side(right, level, true)
            )
        }
        Expr::Assign {
            op, target, value, ..
        } => format!("{} {} {}", expr(target), op.symbol(), expr(value)),
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => format!(
            "{} ? {} : {}",
            expr(condition),
            expr(consequent),
            expr(alternate)
        ),
        Expr::Spread { inner, .. } => format!("...{}", operand(inner)),
        Expr::Sequence { exprs, .. } => list(exprs),
    }
}

/// Binding pattern as written in a declaration or parameter list
pub fn pattern(p: &Pattern) -> String {
    match p {
        Pattern::Ident { name, .. } => name.clone(),
        Pattern::Array { elements, .. } => {
            let slots: Vec<String> = elements
                .iter()
                .map(|slot| slot.as_ref().map(pattern).unwrap_or_default())
                .collect();
            format!("[{}]", slots.join(", "))
        }
        Pattern::Object { properties, .. } => {
            if properties.is_empty() {
                return "{}".to_string();
            }
            let fields: Vec<String> = properties
                .iter()
                .map(|(key, target)| match target {
                    Pattern::Ident { name, .. } if name == key => key.clone(),
                    Pattern::Default { target: inner, value, .. }
                        if inner.as_ident() == Some(key.as_str()) =>
                    {
                        format!("{} = {}", key, expr(value))
                    }
                    Pattern::Rest { .. } => pattern(target),
                    _ => format!("{}: {}", key, pattern(target)),
                })
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
        Pattern::Rest { target, .. } => format!("...{}", pattern(target)),
        Pattern::Default { target, value, .. } => {
            format!("{} = {}", pattern(target), expr(value))
        }
    }
}

pub fn param_list(params: &[Pattern]) -> String {
    params.iter().map(pattern).collect::<Vec<_>>().join(", ")
}

/// Comma-separated rendering of call arguments or list elements
pub fn list(items: &[Expr]) -> String {
    items
        .iter()
        .map(|item| match item {
            Expr::Sequence { .. } => format!("({})", expr(item)),
            _ => expr(item),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a string literal the way it would be written in source
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Nullish => 1,
        BinaryOp::Or => 2,
        BinaryOp::And => 3,
        BinaryOp::Eq | BinaryOp::StrictEq | BinaryOp::Ne | BinaryOp::StrictNe => 4,
        BinaryOp::Lt
        | BinaryOp::Lte
        | BinaryOp::Gt
        | BinaryOp::Gte
        | BinaryOp::InstanceOf
        | BinaryOp::In => 5,
        BinaryOp::Add | BinaryOp::Sub => 6,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 7,
        BinaryOp::Pow => 8,
    }
}

fn binary_side(side: &Expr, parent: u8, is_right: bool) -> String {
    // `**` groups to the right, everything else to the left
    let grouped_side = if parent == precedence(BinaryOp::Pow) {
        !is_right
    } else {
        is_right
    };
    match side {
        Expr::BinaryOp { op, .. } => {
            let level = precedence(*op);
            if level < parent || (grouped_side && level == parent) {
                format!("({})", expr(side))
            } else {
                expr(side)
            }
        }
        Expr::Ternary { .. } | Expr::Assign { .. } | Expr::Function { .. } => {
            format!("({})", expr(side))
        }
        _ => expr(side),
    }
}

/// Wrap low-binding expressions used as a callee, object or operand
fn operand(e: &Expr) -> String {
    match e {
        Expr::BinaryOp { .. }
        | Expr::Ternary { .. }
        | Expr::Assign { .. }
        | Expr::Function { .. }
        | Expr::Await { .. }
        | Expr::Unary { .. }
        | Expr::Sequence { .. } => format!("({})", expr(e)),
        _ => expr(e),
    }
}
