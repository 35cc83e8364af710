use std::rc::Rc;

use grebe_lang::interp::remote::{RemoteClient, SelectionStep};
use grebe_lang::interp::Value;
use grebe_lang::schema::Schema;
use grebe_lang::types::Type;
use serde_json::json;

fn test_schema() -> Schema {
    Schema::from_json(
        r#"{
            "queryType": { "name": "Query" },
            "types": [
                {
                    "name": "Query",
                    "kind": "OBJECT",
                    "fields": [
                        {
                            "name": "version",
                            "args": [],
                            "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "String" } }
                        },
                        {
                            "name": "user",
                            "args": [
                                { "name": "id", "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "Int" } } }
                            ],
                            "type": { "kind": "OBJECT", "name": "User" }
                        }
                    ]
                },
                {
                    "name": "User",
                    "kind": "OBJECT",
                    "interfaces": [ { "name": "Node" } ],
                    "fields": [
                        {
                            "name": "name",
                            "args": [],
                            "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "String" } }
                        }
                    ]
                },
                {
                    "name": "Node",
                    "kind": "INTERFACE",
                    "fields": [
                        {
                            "name": "id",
                            "args": [],
                            "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "Int" } }
                        }
                    ]
                },
                {
                    "name": "Role",
                    "kind": "ENUM",
                    "enumValues": [ { "name": "ADMIN" }, { "name": "MEMBER" } ]
                },
                {
                    "name": "CreateUserInput",
                    "kind": "INPUT_OBJECT",
                    "inputFields": [
                        { "name": "name", "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "String" } } }
                    ]
                }
            ]
        }"#,
    )
    .expect("schema parses")
}

struct FakeClient;

impl RemoteClient for FakeClient {
    fn invoke(
        &self,
        path: &[SelectionStep],
        _ret: &Type,
    ) -> Result<serde_json::Value, String> {
        match path.last().map(|step| step.field.as_str()) {
            Some("version") => Ok(json!("0.1")),
            Some("name") => Ok(json!("ok")),
            other => Err(format!("unexpected field {other:?}")),
        }
    }
}

fn run(src: &str) -> Value {
    grebe_lang::eval_source_with_schema(src, &test_schema(), Rc::new(FakeClient))
        .expect("eval failed")
}

#[test]
fn schema_types_become_nominal_modules() {
    let forms = grebe_lang::parse("pub u: User").unwrap();
    let (_, env) = grebe_lang::check_program_with_schema(&forms, &test_schema()).unwrap();
    assert!(env.named_type("User").is_some());
    assert!(env.named_type("Node").is_some());
}

#[test]
fn query_fields_resolve_unqualified() {
    let forms = grebe_lang::parse("pub v = version\npub u = user(id: 1)").unwrap();
    grebe_lang::check_program_with_schema(&forms, &test_schema())
        .expect("query fields should be in scope");
}

#[test]
fn remote_scalar_fields_decode_by_static_type() {
    assert_eq!(run("version"), Value::Str("0.1".to_string()));
}

#[test]
fn remote_object_chains_defer_then_invoke() {
    assert_eq!(run("user(id: 1).name ?? \"\""), Value::Str("ok".to_string()));
}

#[test]
fn schema_enums_bind_values() {
    let value = run("Role.ADMIN");
    assert!(matches!(value, Value::Enum(e) if e.name == "ADMIN"));
}

#[test]
fn input_objects_construct_module_values() {
    assert_eq!(
        run(r#"CreateUserInput(name: "x").name ?? """#),
        Value::Str("x".to_string())
    );
}

#[test]
fn classes_conform_to_schema_interfaces() {
    let forms = grebe_lang::parse("type U implements Node { pub id: Int! }").unwrap();
    grebe_lang::check_program_with_schema(&forms, &test_schema())
        .expect("conforming class should check");
}

#[test]
fn missing_interface_field_rejected() {
    let forms = grebe_lang::parse("type V implements Node { pub other: Int! }").unwrap();
    let err = grebe_lang::check_program_with_schema(&forms, &test_schema()).unwrap_err();
    assert!(matches!(
        err.kind,
        grebe_lang::errors::ErrorKind::InterfaceConformance(_)
    ));
}
