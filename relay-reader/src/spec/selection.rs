use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use super::arguments::storage_key;
use super::Argument;
use crate::json_ext::Object;

/// One unit of work in a reader fragment.
///
/// Deserialized from the JSON form of the compiler output, dispatched on its `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    ScalarField(ScalarField),
    LinkedField(LinkedField),
    #[serde(alias = "ResolverField")]
    RelayResolver(ResolverField),
    ClientExtension(ClientExtension),
    ClientEdgeToClientObject(ClientEdgeToClientObject),
    Condition(Condition),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
    CatchField(CatchField),
}

impl Selection {
    /// The key this selection writes in the result, for field-like selections.
    pub fn response_key(&self) -> Option<&ByteString> {
        match self {
            Selection::ScalarField(field) => Some(field.response_key()),
            Selection::LinkedField(field) => Some(field.response_key()),
            Selection::RelayResolver(field) => Some(field.response_key()),
            Selection::ClientEdgeToClientObject(edge) => Some(edge.linked_field.response_key()),
            Selection::CatchField(catch) => catch.field.response_key(),
            Selection::ClientExtension(_)
            | Selection::Condition(_)
            | Selection::InlineFragment(_)
            | Selection::FragmentSpread(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    #[serde(default)]
    pub alias: Option<ByteString>,
    pub name: ByteString,
    #[serde(default)]
    pub args: Option<Vec<Argument>>,
    #[serde(default)]
    pub storage_key: Option<String>,
}

impl ScalarField {
    pub fn response_key(&self) -> &ByteString {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub fn storage_key(&self, variables: &Object) -> String {
        storage_key(
            self.name.as_str(),
            self.args.as_deref(),
            self.storage_key.as_deref(),
            variables,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedField {
    #[serde(default)]
    pub alias: Option<ByteString>,
    pub name: ByteString,
    #[serde(default)]
    pub args: Option<Vec<Argument>>,
    #[serde(default)]
    pub concrete_type: Option<String>,
    #[serde(default)]
    pub plural: bool,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub storage_key: Option<String>,
}

impl LinkedField {
    pub fn response_key(&self) -> &ByteString {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub fn storage_key(&self, variables: &Object) -> String {
        storage_key(
            self.name.as_str(),
            self.args.as_deref(),
            self.storage_key.as_deref(),
            variables,
        )
    }
}

/// A field computed by a user resolver function from the data of its dependency fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverField {
    #[serde(default)]
    pub alias: Option<ByteString>,
    pub name: ByteString,
    #[serde(default)]
    pub args: Option<Vec<Argument>>,
    /// The data the resolver declares it needs.
    pub fragment: FragmentSpread,
    pub resolver_module: ResolverModule,
    /// Location of the field in the fragment, for diagnostics.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub normalization_info: Option<NormalizationInfo>,
}

impl ResolverField {
    pub fn response_key(&self) -> &ByteString {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub fn storage_key(&self, variables: &Object) -> String {
        storage_key(self.name.as_str(), self.args.as_deref(), None, variables)
    }

    /// The resolver returns a list of values.
    pub fn is_output_plural(&self) -> bool {
        self.normalization_info
            .as_ref()
            .map(|info| info.plural)
            .unwrap_or_default()
            || self
                .resolver_module
                .weak_object_wrapper
                .as_ref()
                .map(|wrapper| wrapper.plural)
                .unwrap_or_default()
    }

    /// The resolver output is wrapped into an object that can be traversed further.
    pub fn wraps_identity(&self) -> bool {
        self.resolver_module.weak_object_wrapper.is_some()
    }

    /// The type of the derived objects produced by this resolver, if known.
    pub fn concrete_type(&self) -> Option<&str> {
        self.normalization_info
            .as_ref()
            .and_then(|info| info.concrete_type.as_deref())
    }
}

/// Where the resolver function is registered, and how its input and output are adapted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverModule {
    /// The module path the resolver is exported from.
    pub path: String,
    /// The exported function name.
    pub export: String,
    /// When set, the resolver is called with this field of the fragment data rather than with
    /// the whole fragment data.
    #[serde(default)]
    pub inject_fragment_data: Option<String>,
    #[serde(default)]
    pub weak_object_wrapper: Option<WeakObjectWrapper>,
}

/// Wraps resolver outputs into derived records, under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakObjectWrapper {
    pub key: String,
    #[serde(default)]
    pub plural: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationInfo {
    #[serde(default)]
    pub concrete_type: Option<String>,
    #[serde(default)]
    pub plural: bool,
    /// Name of the normalization artifact for the resolver output. Not used by the reader.
    #[serde(default)]
    pub normalization_node: Option<String>,
}

/// Selections that only exist on the client. They are read like any other selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientExtension {
    pub selections: Vec<Selection>,
}

/// An edge to an object derived by a resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEdgeToClientObject {
    #[serde(default)]
    pub concrete_type: Option<String>,
    /// The resolver producing the derived object.
    pub backing_field: ResolverField,
    /// The selections applied to the derived object.
    pub linked_field: LinkedField,
}

/// `@include` / `@skip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Name of the boolean variable.
    pub condition: String,
    pub passing_value: bool,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    #[serde(rename = "type")]
    pub type_condition: String,
    #[serde(default)]
    pub abstract_key: Option<String>,
    pub selections: Vec<Selection>,
}

/// A reference to a named fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpread {
    pub name: String,
    #[serde(default)]
    pub args: Option<Vec<Argument>>,
}

/// `@catch`: resolver errors raised while reading `field` become data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchField {
    pub field: Box<Selection>,
    #[serde(default)]
    pub to: CatchTo,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatchTo {
    /// `{ "ok": true, "value": ... }` or `{ "ok": false, "errors": [...] }`
    #[default]
    #[serde(rename = "RESULT")]
    Result,
    /// The field value, or null on error.
    #[serde(rename = "NULL")]
    Null,
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn resolver_field_flags() {
        let field: ResolverField = serde_json_bytes::from_value(json!({
            "alias": null,
            "args": null,
            "fragment": {
                "args": null,
                "kind": "FragmentSpread",
                "name": "TodoModel____relay_model_instance"
            },
            "kind": "RelayResolver",
            "name": "fancy_description",
            "resolverModule": {
                "path": "relay-runtime/store/__tests__/resolvers/TodoModel",
                "export": "fancy_description",
                "injectFragmentData": "__relay_model_instance",
                "weakObjectWrapper": { "key": "__relay_model_instance", "plural": false }
            },
            "path": "fancy_description",
            "normalizationInfo": {
                "concreteType": "TodoDescription",
                "plural": false,
                "normalizationNode": "TodoModel__fancy_description$normalization.graphql"
            }
        }))
        .unwrap();

        assert!(field.wraps_identity());
        assert!(!field.is_output_plural());
        assert_eq!(field.concrete_type(), Some("TodoDescription"));
        assert_eq!(field.response_key().as_str(), "fancy_description");
        assert_eq!(field.storage_key(&Object::new()), "fancy_description");
    }

    #[test]
    fn aliases_decide_the_response_key() {
        let selection: Selection = serde_json_bytes::from_value(json!({
            "alias": "identifier",
            "args": null,
            "kind": "ScalarField",
            "name": "id",
            "storageKey": null
        }))
        .unwrap();
        assert_eq!(
            selection.response_key().map(|key| key.as_str()),
            Some("identifier")
        );
    }

    #[test]
    fn catch_defaults_to_result() {
        let selection: Selection = serde_json_bytes::from_value(json!({
            "kind": "CatchField",
            "field": { "kind": "ScalarField", "name": "id" },
            "path": "id"
        }))
        .unwrap();
        let Selection::CatchField(catch) = selection else {
            panic!("expected a catch field");
        };
        assert_eq!(catch.to, CatchTo::Result);
    }
}
