use grebe_lang::errors::{Error, ErrorKind};

fn check(src: &str) -> Result<(), Error> {
    let forms = grebe_lang::parse(src).expect("parse failed");
    grebe_lang::check_program(&forms).map(|_| ())
}

#[test]
fn forward_reference_type_checks() {
    check("pub b = a + 1\npub a = 10").expect("forward reference should check");
}

#[test]
fn forward_reference_to_function_checks() {
    check("pub a = f()\npub f(): Int! { 10 }").expect("forward call should check");
}

#[test]
fn mutual_recursion_between_functions_checks() {
    check(
        r#"
        pub even(n: Int!): Boolean! { n == 0 || odd(n - 1) }
        pub odd(n: Int!): Boolean! { n != 0 && even(n - 1) }
        "#,
    )
    .expect("mutually recursive functions should check");
}

#[test]
fn circular_variable_dependency_rejected() {
    let err = check("pub x = y + 1\npub y = x + 1").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CircularDependency(_)));
}

#[test]
fn conflicting_redefinition_rejected() {
    let err = check("pub x = 1\npub x = \"two\"").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Redeclaration { .. }));
}

#[test]
fn redefinition_with_same_type_allowed() {
    check("pub x = 1\npub x = 2").expect("same-typed redefinition is not a conflict");
}

#[test]
fn undeclared_name_reported() {
    let err = check("pub a = nosuch").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UndeclaredName(name) if name == "nosuch"));
}

#[test]
fn missing_required_argument_rejected() {
    let err = check("pub g(x: Int!): Int! { x }\ng()").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingArgument(name) if name == "x"));
}

#[test]
fn defaulted_argument_is_optional() {
    check("pub g(x: Int! = 3): Int! { x }\npub r = g()").expect("default fills the argument");
}

#[test]
fn type_mismatch_carries_both_sides_and_a_span() {
    let err = check("pub a = 1 + \"s\"").unwrap_err();
    match err.kind {
        ErrorKind::Unification { have, want } => {
            assert_eq!(have.to_string(), "String!");
            assert_eq!(want.to_string(), "Int!");
        }
        other => panic!("expected a unification error, got {other:?}"),
    }
    assert!(err.span.is_some(), "inference errors carry a source span");
}

#[test]
fn declared_type_must_accept_value() {
    let err = check("pub x: String! = 1").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unification { .. }));
}

#[test]
fn non_null_value_fits_nullable_declaration() {
    check("pub x: Int = 1").expect("Int! is assignable to Int");
}

#[test]
fn nullable_argument_rejected_for_non_null_parameter() {
    let err = check("pub maybe: Int\npub g(x: Int!): Int! { x }\npub r = g(maybe)").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unification { .. }));
}

#[test]
fn declared_return_type_checked_against_body() {
    let err = check("pub f(): Int! { \"nope\" }").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unification { .. }));
}

#[test]
fn zero_form_block_checks_as_null() {
    check("{ }").expect("an empty block behaves as a null literal");
}

#[test]
fn assert_requires_a_boolean() {
    let err = check("assert 1 + 1").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unification { .. }));
}

#[test]
fn unknown_directive_rejected() {
    let err = check("@nosuch pub a = 1").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UndeclaredName(name) if name == "@nosuch"));
}

#[test]
fn declared_directive_accepted() {
    check("directive @tag(name: String!) on OBJECT\n@tag(name: \"x\") pub a = 1")
        .expect("declared directives validate");
}
