use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::error::ConfigurationError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Selection;

/// A compiled reader fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderFragment {
    pub name: String,
    #[serde(rename = "type")]
    pub type_condition: String,
    #[serde(default)]
    pub abstract_key: Option<String>,
    #[serde(default)]
    pub argument_definitions: Vec<ArgumentDefinition>,
    #[serde(default)]
    pub metadata: Option<FragmentMetadata>,
    pub selections: Vec<Selection>,
    /// Build checksum of the artifact. Not used at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArgumentDefinition {
    /// `@argumentDefinitions`, with its default value.
    LocalArgument {
        name: String,
        #[serde(rename = "defaultValue", default)]
        default_value: Value,
    },
    /// An operation variable used by the fragment.
    RootArgument { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FragmentMetadata {
    pub has_client_edges: bool,
    /// The fragment is read against a list of records.
    pub plural: bool,
}

impl ReaderFragment {
    /// Parses the JSON form of a generated artifact.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(s).map_err(|error| ConfigurationError::InvalidFragment {
            reason: error.to_string(),
        })
    }

    pub fn is_plural(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.plural)
            .unwrap_or_default()
    }

    /// Computes the variables visible inside this fragment.
    ///
    /// Local arguments take their default value, root arguments are taken from
    /// `root_variables` when defined there, and `arguments` passed to the spread override both.
    pub fn variables(&self, root_variables: &Object, arguments: &Object) -> Object {
        let mut variables = Object::new();
        for definition in &self.argument_definitions {
            match definition {
                ArgumentDefinition::LocalArgument {
                    name,
                    default_value,
                } => {
                    variables.insert(ByteString::from(name.as_str()), default_value.clone());
                }
                ArgumentDefinition::RootArgument { name } => {
                    if let Some(value) = root_variables.get(name.as_str()) {
                        variables.insert(ByteString::from(name.as_str()), value.clone());
                    }
                }
            }
        }
        for (name, value) in arguments.iter() {
            variables.insert(name.clone(), value.clone());
        }
        variables
    }
}

/// The set of reader fragments known to a reader, by name.
#[derive(Debug, Clone, Default)]
pub struct Fragments {
    map: HashMap<String, Arc<ReaderFragment>>,
}

impl Fragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one fragment artifact, or an array of them.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigurationError> {
        let mut fragments = Self::new();
        fragments.load_json_str(s)?;
        Ok(fragments)
    }

    /// Adds the fragments of a JSON document holding one fragment artifact or an array of them.
    pub fn load_json_str(&mut self, s: &str) -> Result<(), ConfigurationError> {
        let invalid = |error: serde_json::Error| ConfigurationError::InvalidFragment {
            reason: error.to_string(),
        };
        let document: serde_json::Value = serde_json::from_str(s).map_err(invalid)?;
        let fragments = match document {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value::<ReaderFragment>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?,
            other => vec![serde_json::from_value::<ReaderFragment>(other).map_err(invalid)?],
        };
        for fragment in fragments {
            self.insert(fragment)?;
        }
        Ok(())
    }

    /// Registers a fragment. Names are unique.
    pub fn insert(&mut self, fragment: ReaderFragment) -> Result<(), ConfigurationError> {
        if self.map.contains_key(&fragment.name) {
            return Err(ConfigurationError::DuplicateFragment(fragment.name));
        }
        self.map.insert(fragment.name.clone(), Arc::new(fragment));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ReaderFragment>, ConfigurationError> {
        self.map
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownFragment(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Checks that every fragment referenced by a spread or a resolver exists, and that no
    /// fragment includes itself.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut done = HashSet::new();
        let mut names = self.map.keys().map(String::as_str).collect::<Vec<_>>();
        // deterministic error reporting
        names.sort_unstable();
        for name in names {
            self.visit(name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visiting: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), ConfigurationError> {
        if done.contains(name) {
            return Ok(());
        }
        if visiting.contains(&name) {
            return Err(ConfigurationError::FragmentCycle(name.to_string()));
        }
        let fragment = self.get(name)?;
        visiting.push(name);
        let mut references = Vec::new();
        collect_references(&fragment.selections, &mut references);
        for reference in references {
            self.visit(reference, visiting, done)?;
        }
        visiting.pop();
        done.insert(name);
        Ok(())
    }
}

fn collect_references<'a>(selections: &'a [Selection], references: &mut Vec<&'a str>) {
    for selection in selections {
        match selection {
            Selection::ScalarField(_) => {}
            Selection::LinkedField(field) => collect_references(&field.selections, references),
            Selection::RelayResolver(field) => references.push(&field.fragment.name),
            Selection::ClientExtension(extension) => {
                collect_references(&extension.selections, references)
            }
            Selection::ClientEdgeToClientObject(edge) => {
                references.push(&edge.backing_field.fragment.name);
                collect_references(&edge.linked_field.selections, references);
            }
            Selection::Condition(condition) => {
                collect_references(&condition.selections, references)
            }
            Selection::InlineFragment(fragment) => {
                collect_references(&fragment.selections, references)
            }
            Selection::FragmentSpread(spread) => references.push(&spread.name),
            Selection::CatchField(catch) => {
                collect_references(std::slice::from_ref(catch.field.as_ref()), references)
            }
        }
    }
}
