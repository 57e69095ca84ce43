use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// A field or fragment spread argument, as emitted by the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Argument {
    Literal {
        name: String,
        value: Value,
    },
    Variable {
        name: String,
        #[serde(rename = "variableName")]
        variable_name: String,
    },
    ObjectValue {
        name: String,
        fields: Vec<Argument>,
    },
    ListValue {
        name: String,
        items: Vec<Option<Argument>>,
    },
}

impl Argument {
    pub fn name(&self) -> &str {
        match self {
            Argument::Literal { name, .. }
            | Argument::Variable { name, .. }
            | Argument::ObjectValue { name, .. }
            | Argument::ListValue { name, .. } => name,
        }
    }

    /// The value of this argument with variables substituted. Unknown variables are null.
    pub fn value(&self, variables: &Object) -> Value {
        match self {
            Argument::Literal { value, .. } => value.clone(),
            Argument::Variable { variable_name, .. } => variables
                .get(variable_name.as_str())
                .cloned()
                .unwrap_or_default(),
            Argument::ObjectValue { fields, .. } => Value::Object(argument_values(fields, variables)),
            Argument::ListValue { items, .. } => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        item.as_ref()
                            .map(|item| item.value(variables))
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
        }
    }
}

/// Evaluates a list of arguments into an object, in declaration order.
pub(crate) fn argument_values(args: &[Argument], variables: &Object) -> Object {
    args.iter()
        .map(|arg| (ByteString::from(arg.name()), arg.value(variables)))
        .collect()
}

/// Computes the key a field is stored under in a record.
///
/// A precomputed `storage_key` is used when the compiler emitted one (all arguments are
/// literals), otherwise the key is `name(arg:value,...)` over the non-null argument values, each
/// serialized with sorted object keys.
pub(crate) fn storage_key(
    name: &str,
    args: Option<&[Argument]>,
    precomputed: Option<&str>,
    variables: &Object,
) -> String {
    if let Some(precomputed) = precomputed {
        return precomputed.to_string();
    }
    let Some(args) = args.filter(|args| !args.is_empty()) else {
        return name.to_string();
    };
    let values = args
        .iter()
        .filter_map(|arg| {
            let value = arg.value(variables);
            (!value.is_null()).then(|| format!("{}:{}", arg.name(), value.to_stable_string()))
        })
        .collect::<Vec<_>>();
    if values.is_empty() {
        name.to_string()
    } else {
        format!("{name}({})", values.join(","))
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn args(value: serde_json_bytes::Value) -> Vec<Argument> {
        serde_json_bytes::from_value(value).unwrap()
    }

    #[test]
    fn key_without_arguments_is_the_name() {
        assert_eq!(storage_key("text", None, None, &Object::new()), "text");
        assert_eq!(storage_key("text", Some(&[][..]), None, &Object::new()), "text");
    }

    #[test]
    fn precomputed_key_wins() {
        let args = args(json!([{ "kind": "Literal", "name": "first", "value": 10 }]));
        assert_eq!(
            storage_key("todos", Some(args.as_slice()), Some("todos(first:10)"), &Object::new()),
            "todos(first:10)"
        );
    }

    #[test]
    fn variables_are_substituted() {
        let args = args(json!([
            { "kind": "Variable", "name": "first", "variableName": "count" },
            { "kind": "Literal", "name": "orderBy", "value": { "field": "DATE", "direction": "ASC" } },
            { "kind": "Variable", "name": "after", "variableName": "cursor" }
        ]));
        let variables = json!({ "count": 5 });
        let variables = variables.as_object().unwrap();

        // `after` is null so it does not take part in the key
        assert_eq!(
            storage_key("todos", Some(args.as_slice()), None, variables),
            r#"todos(first:5,orderBy:{"direction":"ASC","field":"DATE"})"#
        );
    }

    #[test]
    fn nested_argument_values() {
        let args = args(json!([
            {
                "kind": "ObjectValue",
                "name": "filter",
                "fields": [
                    { "kind": "Variable", "name": "status", "variableName": "status" },
                    {
                        "kind": "ListValue",
                        "name": "tags",
                        "items": [
                            { "kind": "Literal", "name": "0", "value": "home" },
                            null
                        ]
                    }
                ]
            }
        ]));
        let variables = json!({ "status": "DONE" });
        assert_eq!(
            Value::Object(argument_values(&args, variables.as_object().unwrap())),
            json!({ "filter": { "status": "DONE", "tags": ["home", null] } })
        );
    }
}
