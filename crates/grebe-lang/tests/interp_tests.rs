use grebe_lang::interp::Value;

fn run(src: &str) -> Value {
    grebe_lang::eval_source(src).expect("eval failed")
}

#[test]
fn forward_reference_evaluates() {
    assert_eq!(run("pub b = a + 1\npub a = 10\nb"), Value::Int(11));
}

#[test]
fn arithmetic() {
    assert_eq!(run("1 + 2 * 3"), Value::Int(7));
    assert_eq!(run("10 - 3"), Value::Int(7));
    assert_eq!(run("7 / 2"), Value::Int(3));
    assert_eq!(run("-5 + 2"), Value::Int(-3));
}

#[test]
fn string_concatenation() {
    assert_eq!(
        run(r#""foo" + "bar""#),
        Value::Str("foobar".to_string())
    );
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(run("1 < 2 && true"), Value::Bool(true));
    assert_eq!(run("2 >= 3 || false"), Value::Bool(false));
    assert_eq!(run("1 == 1"), Value::Bool(true));
    assert_eq!(run(r#""a" != "b""#), Value::Bool(true));
}

#[test]
fn null_coalescing() {
    assert_eq!(run("null ?? 5"), Value::Int(5));
    assert_eq!(run("pub x = 3\nx ?? 5"), Value::Int(3));
}

#[test]
fn zero_arity_bindings_auto_call() {
    assert_eq!(
        run("pub f: Int! { 42 }\nassert f == 42\nassert f() == 42\nf"),
        Value::Int(42)
    );
}

#[test]
fn functions_with_required_args_stay_values() {
    let value = run("pub g(x: Int!): Int! { x }\ng");
    assert!(matches!(value, Value::Fun(_)));
}

#[test]
fn zero_form_block_is_null() {
    assert_eq!(run("{ }"), Value::Null);
}

#[test]
fn defaults_see_earlier_arguments() {
    assert_eq!(
        run("pub f(a: Int! = 2, b: Int! = a + 1): Int! { b }\nf()"),
        Value::Int(3)
    );
    assert_eq!(
        run("pub f(a: Int! = 2, b: Int! = a + 1): Int! { b }\nf(10)"),
        Value::Int(11)
    );
}

#[test]
fn named_and_positional_arguments() {
    let src = "pub sub(a: Int!, b: Int!): Int! { a - b }\n";
    assert_eq!(run(&format!("{src}sub(10, 4)")), Value::Int(6));
    assert_eq!(run(&format!("{src}sub(10, b: 4)")), Value::Int(6));
    assert_eq!(run(&format!("{src}sub(b: 4, a: 10)")), Value::Int(6));
}

#[test]
fn assertion_failure_carries_location() {
    let err = grebe_lang::eval_source("assert 1 == 2").unwrap_err();
    assert!(matches!(
        err.kind,
        grebe_lang::errors::ErrorKind::Assertion(_)
    ));
    assert!(err.span.is_some());
}

#[test]
fn lists_concatenate_and_measure() {
    assert_eq!(run("pub xs = [1, 2] + [3]\nxs.length"), Value::Int(3));
    assert_eq!(run("[1, 2, 3].length"), Value::Int(3));
}

#[test]
fn string_builtin_methods() {
    assert_eq!(run(r#""hello".length"#), Value::Int(5));
    assert_eq!(run(r#""a,b,c".split(",").length"#), Value::Int(3));
}

#[test]
fn json_builtin_encodes_values() {
    assert_eq!(run("json([1, 2])"), Value::Str("[1,2]".to_string()));
    assert_eq!(
        run(r#"json("hi")"#),
        Value::Str("\"hi\"".to_string())
    );
}

#[test]
fn object_literals_infer_anonymous_modules() {
    assert_eq!(run("pub o = { pub x = 1 }\no.x"), Value::Int(1));
}

#[test]
fn block_scopes_do_not_leak() {
    assert_eq!(
        run("pub x = 1\n{ let x = 2\nassert x == 2 }\nx"),
        Value::Int(1)
    );
}

#[test]
fn lambdas_bind_and_call() {
    assert_eq!(
        run("pub inc = fn(x: Int!): Int! { x + 1 }\ninc(41)"),
        Value::Int(42)
    );
}

#[test]
fn variable_reassignment() {
    assert_eq!(run("pub x = 1\nx = 5\nx"), Value::Int(5));
    assert_eq!(run("pub x = 1\nx += 4\nx"), Value::Int(5));
}

#[test]
fn division_by_zero_is_an_error() {
    let err = grebe_lang::eval_source("1 / 0").unwrap_err();
    assert!(matches!(err.kind, grebe_lang::errors::ErrorKind::Eval(_)));
}
