use schemars::schema::{RootSchema, Schema};
use schemars::schema_for;
use serde_json::json;

use crate::NimbusConfig;

/// JSON schema for `nimbus.toml`, for editor integration and CI validation.
#[must_use]
pub fn json_schema() -> RootSchema {
    let mut schema = schema_for!(NimbusConfig);
    apply_value_sets(&mut schema);
    apply_semantic_constraints(&mut schema);
    schema
}

/// The enum-valued fields are plain strings as far as the derive is concerned.
fn apply_value_sets(schema: &mut RootSchema) {
    let sets = [
        ("CacheSettings", "mode", json!(["default", "alwaysUseCache", "neverUseCache"])),
        (
            "CacheSettings",
            "path_policy",
            json!(["nestedDirectory", "oneDirectory", "nestedTruncate"]),
        ),
        ("CollectionConfig", "partition", json!(["none", "directory", "file", "all"])),
        (
            "CollectionConfig",
            "update",
            json!(["always", "never", "nocheck", "test", "testIndexOnly"]),
        ),
    ];
    for (definition, property, values) in sets {
        set_property(
            schema,
            definition,
            property,
            schema_from_json(json!({ "type": "string", "enum": values })),
        );
    }
}

fn apply_semantic_constraints(schema: &mut RootSchema) {
    // `nestedTruncate` is meaningless without the prefix to drop.
    push_all_of(
        schema,
        schema_from_json(json!({
            "if": {
                "required": ["cache"],
                "properties": {
                    "cache": {
                        "required": ["path_policy"],
                        "properties": { "path_policy": { "const": "nestedTruncate" } }
                    }
                }
            },
            "then": {
                "properties": {
                    "cache": {
                        "required": ["path_policy_param"],
                        "properties": {
                            "path_policy_param": { "type": "string", "minLength": 1 }
                        }
                    }
                }
            }
        })),
    );
}

fn push_all_of(root: &mut RootSchema, schema: Schema) {
    let subschemas = root.schema.subschemas();
    subschemas.all_of.get_or_insert_with(Vec::new).push(schema);
}

fn schema_from_json(value: serde_json::Value) -> Schema {
    serde_json::from_value(value).expect("valid json schema")
}

fn set_property(schema: &mut RootSchema, definition_name: &str, property_name: &str, property: Schema) {
    let Some(Schema::Object(definition)) = schema.definitions.get_mut(definition_name) else {
        return;
    };
    definition
        .object()
        .properties
        .insert(property_name.to_owned(), property);
}
