//! Tests for the script parser

use super::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn parse(source: &str) -> Program {
    parse_program(source).expect("Parse should succeed")
}

fn first_stmt(source: &str) -> Stmt {
    parse(source)
        .body
        .into_iter()
        .next()
        .expect("Program should have a statement")
}

fn first_expr(source: &str) -> Expr {
    match first_stmt(source) {
        Stmt::Expr { expr, .. } => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

// ============================================================================
// Program Structure
// ============================================================================

#[test]
fn test_empty_program() {
    assert!(parse("").body.is_empty());
    assert!(parse("   \n\t\n").body.is_empty());
    assert!(parse("// only a comment\n/* and a block */").body.is_empty());
}

#[test]
fn test_statements_without_semicolons() {
    let program = parse("let a = 1\nlet b = 2\nconsole.log(a, b)");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_statement_lines_are_zero_indexed_in_span() {
    let program = parse("let a = 1;\n\nconsole.log(a);");
    assert_eq!(program.body[0].span().start_line, 0);
    assert_eq!(program.body[1].span().start_line, 2);
    assert_eq!(program.body[1].span().line(), 3);
}

// ============================================================================
// Declarations
// ============================================================================

#[test]
fn test_const_declaration() {
    match first_stmt("const x = 2 + 2;") {
        Stmt::Declare {
            var_kind,
            declarators,
            ..
        } => {
            assert_eq!(var_kind, VarKind::Const);
            assert_eq!(declarators.len(), 1);
            assert_eq!(declarators[0].target.as_ident(), Some("x"));
            match &declarators[0].init {
                Some(Expr::BinaryOp { op, .. }) => assert_eq!(*op, BinaryOp::Add),
                other => panic!("Expected binary init, got {:?}", other),
            }
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_multiple_declarators() {
    match first_stmt("let a = 1, b, c = 'three'") {
        Stmt::Declare { declarators, .. } => {
            let names: Vec<_> = declarators.iter().filter_map(|d| d.target.as_ident()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert!(declarators[1].init.is_none());
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_identifier_with_keyword_prefix() {
    match first_stmt("let constant = 1") {
        Stmt::Declare { declarators, .. } => {
            assert_eq!(declarators[0].target.as_ident(), Some("constant"))
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_async_function_declaration() {
    match first_stmt("async function load(url, opts) { await fetch(url); }") {
        Stmt::FunctionDecl {
            name,
            params,
            is_async,
            body,
            ..
        } => {
            assert_eq!(name, "load");
            let names: Vec<_> = params.iter().filter_map(Pattern::as_ident).collect();
            assert_eq!(names, vec!["url", "opts"]);
            assert!(is_async);
            assert!(matches!(*body, Stmt::Block { ref body, .. } if body.len() == 1));
        }
        other => panic!("Expected function declaration, got {:?}", other),
    }
}

// ============================================================================
// Control Flow
// ============================================================================

#[test]
fn test_if_else() {
    match first_stmt("if (x > 1) { a() } else b()") {
        Stmt::If { test, else_s, .. } => {
            assert!(matches!(test, Expr::BinaryOp { op: BinaryOp::Gt, .. }));
            assert!(else_s.is_some());
        }
        other => panic!("Expected if, got {:?}", other),
    }
}

#[test]
fn test_classic_for_loop() {
    match first_stmt("for (let i = 0; i < 3; i++) { console.log(i) }") {
        Stmt::For {
            init, test, update, ..
        } => {
            assert!(matches!(init.as_deref(), Some(Stmt::Declare { .. })));
            assert!(test.is_some());
            assert!(matches!(
                update,
                Some(Expr::Update {
                    op: UpdateOp::Inc,
                    prefix: false,
                    ..
                })
            ));
        }
        other => panic!("Expected for loop, got {:?}", other),
    }
}

#[test]
fn test_empty_for_header() {
    match first_stmt("for (;;) { break }") {
        Stmt::For {
            init, test, update, ..
        } => {
            assert!(init.is_none());
            assert!(test.is_none());
            assert!(update.is_none());
        }
        other => panic!("Expected for loop, got {:?}", other),
    }
}

#[test]
fn test_for_of_loop() {
    match first_stmt("for (const item of items) console.log(item)") {
        Stmt::ForLoop {
            kind,
            var_kind,
            binding,
            ..
        } => {
            assert_eq!(kind, ForLoopKind::Of);
            assert_eq!(var_kind, Some(VarKind::Const));
            assert_eq!(binding.as_ident(), Some("item"));
        }
        other => panic!("Expected for-of loop, got {:?}", other),
    }
}

#[test]
fn test_while_and_do_while() {
    assert!(matches!(first_stmt("while (n > 0) n--"), Stmt::While { .. }));
    assert!(matches!(
        first_stmt("do { n++ } while (n < 3);"),
        Stmt::DoWhile { .. }
    ));
}

#[test]
fn test_try_catch_finally() {
    match first_stmt("try { risky() } catch (e) { console.error(e) } finally { done() }") {
        Stmt::Try {
            catch_var,
            catch_body,
            finally_body,
            ..
        } => {
            assert_eq!(catch_var.as_deref(), Some("e"));
            assert!(catch_body.is_some());
            assert!(finally_body.is_some());
        }
        other => panic!("Expected try, got {:?}", other),
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_member_call() {
    match first_expr("console.log('hi', 2)") {
        Expr::Call { callee, args, .. } => {
            assert_eq!(callee.dotted_name().as_deref(), Some("console.log"));
            assert_eq!(args.len(), 2);
            assert!(matches!(&args[0], Expr::LitStr { v, .. } if v == "hi"));
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_then_catch_chain_uses_keyword_property_names() {
    match first_expr("p.then(v => v).catch(e => e).finally(() => {})") {
        Expr::Call { callee, .. } => match *callee {
            Expr::Member { property, .. } => assert_eq!(property, "finally"),
            other => panic!("Expected member callee, got {:?}", other),
        },
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_new_promise_with_arrow_executor() {
    match first_expr("new Promise((resolve) => setTimeout(resolve, 10))") {
        Expr::New { callee, args, .. } => {
            assert_eq!(callee.dotted_name().as_deref(), Some("Promise"));
            assert!(matches!(
                &args[0],
                Expr::Function {
                    is_arrow: true,
                    body: FunctionBody::Expr { .. },
                    ..
                }
            ));
        }
        other => panic!("Expected new expression, got {:?}", other),
    }
}

#[test]
fn test_await_expression() {
    match first_stmt("const res = await fetch('/api')") {
        Stmt::Declare { declarators, .. } => {
            assert!(matches!(declarators[0].init, Some(Expr::Await { .. })));
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    match first_expr("1 + 2 * 3") {
        Expr::BinaryOp { op, right, .. } => {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(*right, Expr::BinaryOp { op: BinaryOp::Mul, .. }));
        }
        other => panic!("Expected binary op, got {:?}", other),
    }
}

#[test]
fn test_compound_assignment() {
    match first_expr("total += 5") {
        Expr::Assign { op, target, .. } => {
            assert_eq!(op, AssignOp::AddAssign);
            assert!(matches!(*target, Expr::Ident { ref name, .. } if name == "total"));
        }
        other => panic!("Expected assignment, got {:?}", other),
    }
}

#[test]
fn test_equality_is_not_assignment() {
    assert!(matches!(
        first_expr("a === b"),
        Expr::BinaryOp {
            op: BinaryOp::StrictEq,
            ..
        }
    ));
}

#[test]
fn test_template_literal() {
    match first_expr("`count: ${n} items`") {
        Expr::LitTemplate { quasis, exprs, .. } => {
            assert_eq!(quasis, vec!["count: ".to_string(), " items".to_string()]);
            assert_eq!(exprs.len(), 1);
        }
        other => panic!("Expected template, got {:?}", other),
    }
}

#[test]
fn test_string_escapes() {
    match first_expr(r#""a\"b\n""#) {
        Expr::LitStr { v, .. } => assert_eq!(v, "a\"b\n"),
        other => panic!("Expected string, got {:?}", other),
    }
}

#[test]
fn test_object_and_array_literals() {
    match first_stmt("const cfg = { a: 1, 'b': [1, 2], c }") {
        Stmt::Declare { declarators, .. } => match &declarators[0].init {
            Some(Expr::LitObj { properties, .. }) => {
                let keys: Vec<_> = properties.iter().map(|(k, _, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b", "c"]);
                assert!(matches!(properties[1].2, Expr::LitList { .. }));
            }
            other => panic!("Expected object literal, got {:?}", other),
        },
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_async_arrow_function() {
    match first_stmt("const go = async () => { await sleep(1) }") {
        Stmt::Declare { declarators, .. } => {
            assert!(matches!(
                declarators[0].init,
                Some(Expr::Function {
                    is_async: true,
                    is_arrow: true,
                    ..
                })
            ));
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_exponent_is_right_associative() {
    match first_expr("2 ** 3 ** 2") {
        Expr::BinaryOp { op, left, right, .. } => {
            assert_eq!(op, BinaryOp::Pow);
            assert!(matches!(*left, Expr::LitNum { v, .. } if v == 2.0));
            assert!(matches!(*right, Expr::BinaryOp { op: BinaryOp::Pow, .. }));
        }
        other => panic!("Expected binary op, got {:?}", other),
    }
}

#[test]
fn test_instanceof_and_in() {
    assert!(matches!(
        first_expr("err instanceof TypeError"),
        Expr::BinaryOp {
            op: BinaryOp::InstanceOf,
            ..
        }
    ));
    assert!(matches!(
        first_expr("'key' in cache"),
        Expr::BinaryOp { op: BinaryOp::In, .. }
    ));
}

#[test]
fn test_number_forms() {
    let number = |source: &str| match first_expr(source) {
        Expr::LitNum { v, .. } => v,
        other => panic!("Expected number, got {:?}", other),
    };
    assert_eq!(number("0xff"), 255.0);
    assert_eq!(number("0b101"), 5.0);
    assert_eq!(number("0o17"), 15.0);
    assert_eq!(number("1_000"), 1000.0);
    assert_eq!(number("1.5e3"), 1500.0);
    assert_eq!(number(".5"), 0.5);
}

#[test]
fn test_number_does_not_run_into_identifier() {
    assert!(matches!(first_stmt("let x = 1abc"), Stmt::Unknown { .. }));
    assert_eq!(parse("1abc").body.len(), 1);
}

#[test]
fn test_regex_literal() {
    match first_stmt("const re = /a[/]b+/gi") {
        Stmt::Declare { declarators, .. } => match &declarators[0].init {
            Some(Expr::LitRegex { pattern, flags, .. }) => {
                assert_eq!(pattern, "a[/]b+");
                assert_eq!(flags, "gi");
            }
            other => panic!("Expected regex, got {:?}", other),
        },
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_sequence_in_for_update() {
    match first_stmt("for (let i = 0, j = 10; i < j; i++, j--) {}") {
        Stmt::For { init, update, .. } => {
            assert!(matches!(
                init.as_deref(),
                Some(Stmt::Declare { declarators, .. }) if declarators.len() == 2
            ));
            assert!(matches!(update, Some(Expr::Sequence { ref exprs, .. }) if exprs.len() == 2));
        }
        other => panic!("Expected for loop, got {:?}", other),
    }
}

#[test]
fn test_spread_arguments_and_array_items() {
    match first_expr("f(...args, [...rest, 1])") {
        Expr::Call { args, .. } => {
            assert!(matches!(args[0], Expr::Spread { .. }));
            match &args[1] {
                Expr::LitList { elements, .. } => {
                    assert!(matches!(elements[0], Expr::Spread { .. }));
                    assert_eq!(elements.len(), 2);
                }
                other => panic!("Expected array, got {:?}", other),
            }
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_object_spread_and_method() {
    match first_stmt("const o = { ...base, run() { return 1 } }") {
        Stmt::Declare { declarators, .. } => match &declarators[0].init {
            Some(Expr::LitObj { properties, .. }) => {
                let keys: Vec<_> = properties.iter().map(|(k, _, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["...", "run"]);
                assert!(matches!(properties[0].2, Expr::Spread { .. }));
                assert!(matches!(properties[1].2, Expr::Function { is_arrow: false, .. }));
            }
            other => panic!("Expected object literal, got {:?}", other),
        },
        other => panic!("Expected declaration, got {:?}", other),
    }
}

// ============================================================================
// Binding Patterns
// ============================================================================

#[test]
fn test_array_destructuring_declaration() {
    match first_stmt("const [a, b] = await Promise.all([p, q])") {
        Stmt::Declare { declarators, .. } => {
            assert!(matches!(declarators[0].target, Pattern::Array { .. }));
            assert_eq!(declarators[0].target.names(), vec!["a", "b"]);
            assert!(matches!(declarators[0].init, Some(Expr::Await { .. })));
        }
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_array_pattern_holes() {
    match first_stmt("let [, second, ] = pair") {
        Stmt::Declare { declarators, .. } => match &declarators[0].target {
            Pattern::Array { elements, .. } => {
                assert_eq!(elements.len(), 2);
                assert!(elements[0].is_none());
                assert!(matches!(&elements[1], Some(Pattern::Ident { name, .. }) if name == "second"));
            }
            other => panic!("Expected array pattern, got {:?}", other),
        },
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_object_destructuring_with_rename_default_and_rest() {
    match first_stmt("const { a, b: c = 1, ...rest } = obj") {
        Stmt::Declare { declarators, .. } => match &declarators[0].target {
            Pattern::Object { properties, .. } => {
                let keys: Vec<_> = properties.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b", "..."]);
                assert!(matches!(properties[1].1, Pattern::Default { .. }));
                assert!(matches!(properties[2].1, Pattern::Rest { .. }));
                assert_eq!(declarators[0].target.names(), vec!["a", "c", "rest"]);
            }
            other => panic!("Expected object pattern, got {:?}", other),
        },
        other => panic!("Expected declaration, got {:?}", other),
    }
}

#[test]
fn test_default_and_rest_params() {
    match first_stmt("function f(first, size = 10, ...others) {}") {
        Stmt::FunctionDecl { params, .. } => {
            assert_eq!(params.len(), 3);
            assert!(matches!(params[1], Pattern::Default { .. }));
            assert!(matches!(params[2], Pattern::Rest { .. }));
        }
        other => panic!("Expected function declaration, got {:?}", other),
    }

    match first_expr("(a = 1) => a") {
        Expr::Function { params, is_arrow, .. } => {
            assert!(is_arrow);
            assert!(matches!(params[0], Pattern::Default { .. }));
        }
        other => panic!("Expected arrow function, got {:?}", other),
    }
}

#[test]
fn test_for_of_with_destructuring() {
    match first_stmt("for (const [key, value] of entries) {}") {
        Stmt::ForLoop { binding, .. } => assert_eq!(binding.names(), vec!["key", "value"]),
        other => panic!("Expected for-of loop, got {:?}", other),
    }
}

// ============================================================================
// Switch, Classes and Labels
// ============================================================================

#[test]
fn test_switch_cases() {
    match first_stmt("switch (x) { case 1: a(); break; case 2: default: b() }") {
        Stmt::Switch { cases, .. } => {
            assert_eq!(cases.len(), 3);
            assert!(cases[0].test.is_some());
            assert_eq!(cases[0].body.len(), 2);
            assert!(cases[1].body.is_empty());
            assert!(cases[2].test.is_none());
            assert_eq!(cases[2].body.len(), 1);
        }
        other => panic!("Expected switch, got {:?}", other),
    }
}

#[test]
fn test_class_with_method_is_one_statement() {
    let program = parse("class A { run() {} }");
    assert_eq!(program.body.len(), 1);
    match &program.body[0] {
        Stmt::ClassDecl { name, members, .. } => {
            assert_eq!(name, "A");
            assert!(matches!(&members[..], [ClassMember::Method { name, .. }] if name == "run"));
        }
        other => panic!("Expected class, got {:?}", other),
    }
}

#[test]
fn test_class_heritage_fields_and_accessors() {
    match first_stmt("class B extends A { static create() { return new B() } count = 0; get size() { return 1 } }") {
        Stmt::ClassDecl {
            superclass,
            members,
            ..
        } => {
            assert_eq!(
                superclass.and_then(|base| base.dotted_name()).as_deref(),
                Some("A")
            );
            assert_eq!(members.len(), 3);
            assert!(matches!(&members[0], ClassMember::Method { is_static: true, .. }));
            assert!(matches!(&members[1], ClassMember::Field { name, value: Some(_), .. } if name == "count"));
            assert!(matches!(&members[2], ClassMember::Method { name, .. } if name == "size"));
        }
        other => panic!("Expected class, got {:?}", other),
    }
}

#[test]
fn test_labeled_loop() {
    match first_stmt("outer: for (const x of xs) { continue }") {
        Stmt::Labeled { label, body, .. } => {
            assert_eq!(label, "outer");
            assert!(matches!(*body, Stmt::ForLoop { .. }));
        }
        other => panic!("Expected labeled statement, got {:?}", other),
    }
}

// ============================================================================
// Unsupported Syntax
// ============================================================================

#[test]
fn test_unknown_statement_keeps_neighbours() {
    let program = parse("console.log('a');\nconst el = <div>hi</div>;\nconsole.log('b');");
    assert_eq!(program.body.len(), 3);
    match &program.body[1] {
        Stmt::Unknown { text, span } => {
            assert_eq!(text, "const el = <div>hi</div>");
            assert_eq!(span.line(), 2);
        }
        other => panic!("Expected unknown statement, got {:?}", other),
    }
    assert!(matches!(program.body[2], Stmt::Expr { .. }));
}

#[test]
fn test_unknown_statement_with_balanced_groups() {
    let program = parse("@decorate({ a: [1, 2] })\nrun()");
    assert_eq!(program.body.len(), 2);
    assert!(matches!(&program.body[0], Stmt::Unknown { text, .. } if text == "@decorate({ a: [1, 2] })"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_syntax_error_reports_line() {
    let err = parse_program("let a = 1;\nfoo(1, ;").expect_err("Parse should fail");
    assert!(matches!(err, ParseError::PestError(..)));
    let span = err.span().expect("Pest errors carry a span");
    assert_eq!(span.line(), 2);
    assert!(err.message().contains("line 2"));
}

#[test]
fn test_unterminated_block_fails() {
    assert!(parse_program("function f() {").is_err());
}
