use grebe_lang::interp::Value;

fn run(src: &str) -> Value {
    grebe_lang::eval_source(src).expect("eval failed")
}

#[test]
fn fields_default_from_earlier_fields() {
    assert_eq!(
        run(r#"
            type T {
              pub name = "test"
              pub greeting = "Hi " + name
            }
            assert T.greeting == "Hi test"
            T("Alice").greeting
        "#),
        Value::Str("Hi Alice".to_string())
    );
}

#[test]
fn methods_mutate_a_clone_not_the_receiver() {
    assert_eq!(
        run(r#"
            type C {
              pub v: Int!
              pub incr: C! {
                self.v += 1
                self
              }
            }
            pub a = C(1)
            pub b = a.incr
            assert a.v == 1
            b.v
        "#),
        Value::Int(2)
    );
}

#[test]
fn method_chains_accumulate_on_the_clone() {
    assert_eq!(
        run(r#"
            type C {
              pub v: Int!
              pub incr: C! {
                self.v += 1
                self
              }
            }
            pub a = C(1)
            pub b = a.incr.incr
            assert a.v == 1
            b.v
        "#),
        Value::Int(3)
    );
}

#[test]
fn nested_assignment_clones_only_the_touched_spine() {
    assert_eq!(
        run(r#"
            type Inner { pub value: Int! }
            type Outer {
              pub inner: Inner!
              pub other: Inner!
            }
            pub i1 = Inner(1)
            pub i2 = Inner(5)
            pub o = Outer(i1, i2)
            o.inner.value = 42
            assert o.inner.value == 42
            assert i1.value == 1
            assert o.other == i2
            o.inner.value
        "#),
        Value::Int(42)
    );
}

#[test]
fn parameters_shadow_receiver_fields() {
    assert_eq!(
        run(r#"
            pub name = "outer"
            type P {
              pub name = "field"
              pub hello(name: String!): String! { "Hi " + name }
              pub field_hello: String! { "Yo " + name }
            }
            pub p = P()
            assert p.hello("arg") == "Hi arg"
            p.field_hello
        "#),
        Value::Str("Yo field".to_string())
    );
}

#[test]
fn methods_take_arguments_against_fields() {
    assert_eq!(
        run(r#"
            type P {
              pub base: Int!
              pub add(n: Int!): Int! { base + n }
            }
            pub p = P(10)
            p.add(5)
        "#),
        Value::Int(15)
    );
}

#[test]
fn constructors_fill_positional_then_named() {
    assert_eq!(
        run(r#"
            type Pair {
              pub first: Int!
              pub second: Int!
            }
            pub p = Pair(1, second: 2)
            p.first + p.second
        "#),
        Value::Int(3)
    );
}

#[test]
fn classes_reference_each_other() {
    assert_eq!(
        run(r#"
            type A {
              pub partner: B
              pub tag: Int!
            }
            type B {
              pub tag: Int!
            }
            pub b = B(2)
            pub a = A(b, 1)
            a.partner.tag ?? 0
        "#),
        Value::Int(2)
    );
}

#[test]
fn null_receiver_propagates() {
    assert_eq!(
        run(r#"
            type Inner { pub value: Int! }
            pub maybe: Inner = null
            maybe.value ?? 7
        "#),
        Value::Int(7)
    );
}

#[test]
fn constructors_with_all_defaults_auto_call() {
    assert_eq!(
        run(r#"
            type Counter { pub start = 10 }
            Counter.start
        "#),
        Value::Int(10)
    );
}

#[test]
fn enum_declarations_bind_values() {
    assert_eq!(
        run(r#"
            enum Color { RED GREEN }
            assert Color.RED == Color.RED
            assert Color.RED != Color.GREEN
            Color.values.length
        "#),
        Value::Int(2)
    );
}

#[test]
fn required_method_local_slot_without_value_errors() {
    let err = grebe_lang::eval_source(
        r#"
        pub m: Int! {
          let q: Int!
          1
        }
        m
        "#,
    )
    .unwrap_err();
    assert!(matches!(
        err.kind,
        grebe_lang::errors::ErrorKind::RequiredSlot { .. }
    ));
}

#[test]
fn missing_required_constructor_argument_rejected() {
    let err = grebe_lang::eval_source("type R { pub v: Int! }\npub r = R()").unwrap_err();
    assert!(matches!(
        err.kind,
        grebe_lang::errors::ErrorKind::MissingArgument(_)
    ));
}
