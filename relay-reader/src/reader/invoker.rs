use super::ReadContext;
use crate::cache::CacheKey;
use crate::cache::InputHash;
use crate::cache::ResolverValue;
use crate::cache::WrapperArena;
use crate::error::ReaderError;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::spec::argument_values;
use crate::spec::ClientEdgeToClientObject;
use crate::spec::FragmentSpread;
use crate::spec::ResolverField;
use crate::spec::Selection;
use crate::store::Record;

impl ReadContext<'_> {
    pub(super) fn read_resolver_field(
        &mut self,
        field: &ResolverField,
        record: &Record,
    ) -> Result<Value, ReaderError> {
        Ok(self.evaluate_resolver(field, record, None)?.to_value())
    }

    /// Reads the object produced by the backing resolver of a client edge.
    ///
    /// A `null` resolver output makes the whole edge `null`: the selections of the linked field
    /// are not read.
    pub(super) fn read_client_edge(
        &mut self,
        edge: &ClientEdgeToClientObject,
        record: &Record,
    ) -> Result<Value, ReaderError> {
        let typename = edge
            .concrete_type
            .as_deref()
            .or(edge.linked_field.concrete_type.as_deref());
        let output = self.evaluate_resolver(&edge.backing_field, record, typename)?;
        let selections = &edge.linked_field.selections;
        match output {
            ResolverValue::Object(object) => Ok(Value::Object(
                self.traverse_selections(selections, object.record())?,
            )),
            ResolverValue::List(objects) => objects
                .iter()
                .enumerate()
                .map(|(index, object)| {
                    self.in_index(index, |context| match object {
                        Some(object) => Ok(Value::Object(
                            context.traverse_selections(selections, object.record())?,
                        )),
                        None => Ok(Value::Null),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ResolverValue::Value(Value::Null) => Ok(Value::Null),
            ResolverValue::Value(Value::Array(targets))
                if edge.backing_field.is_output_plural() =>
            {
                targets
                    .iter()
                    .enumerate()
                    .map(|(index, target)| {
                        self.in_index(index, |context| {
                            context.read_edge_target(&edge.backing_field, target, selections)
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            ResolverValue::Value(target) => {
                self.read_edge_target(&edge.backing_field, &target, selections)
            }
        }
    }

    /// Reads a record referenced by a resolver output: its id, or an object with an `id`.
    fn read_edge_target(
        &mut self,
        field: &ResolverField,
        target: &Value,
        selections: &[Selection],
    ) -> Result<Value, ReaderError> {
        let data_id = match target {
            Value::Null => return Ok(Value::Null),
            Value::String(data_id) => data_id.as_str(),
            Value::Object(object) => match object.get("id").and_then(|id| id.as_str()) {
                Some(data_id) => data_id,
                None => {
                    return Err(invalid_output(
                        field,
                        &self.path,
                        "expected an object with an 'id'".to_string(),
                    ));
                }
            },
            other => {
                return Err(invalid_output(
                    field,
                    &self.path,
                    format!("expected a record id, got {}", kind(other)),
                ));
            }
        };
        self.read_record(data_id, selections)
    }

    /// Computes a resolver field, going through the resolver output cache.
    ///
    /// `edge_type` is the type of the derived objects when the field backs a client edge.
    pub(super) fn evaluate_resolver(
        &mut self,
        field: &ResolverField,
        record: &Record,
        edge_type: Option<&str>,
    ) -> Result<ResolverValue, ReaderError> {
        let reader = self.reader;
        let module = &field.resolver_module;
        let registered = reader.resolvers.lookup(&module.path, &module.export)?;

        let data = self.read_dependency(&field.fragment, record)?;
        let args = argument_values(field.args.as_deref().unwrap_or_default(), &self.variables);
        let key = CacheKey {
            resolver: registered.id,
            owner: record.data_id().unwrap_or_default().to_string(),
            storage_key: field.storage_key(&self.variables),
            input: InputHash::new(&data, &args),
        };
        let input = match &module.inject_fragment_data {
            Some(injected) => data
                .as_object()
                .and_then(|data| data.get(injected.as_str()))
                .cloned()
                .unwrap_or_default(),
            None => data,
        };
        let typename = field
            .concrete_type()
            .or(edge_type)
            .unwrap_or(field.name.as_str());

        let path = &self.path;
        reader.cache.get_or_try_insert_with(
            key,
            || {
                tracing::debug!(resolver = %field.name.as_str(), %path, "invoking resolver");
                registered
                    .resolver
                    .resolve(&input, &args)
                    .map_err(|error| ReaderError::ResolverExecution {
                        resolver: field.name.as_str().to_string(),
                        path: path.clone(),
                        message: error.message,
                    })
            },
            |output, arena| normalize_output(field, typename, output, arena, path),
        )
    }

    /// Reads the dependency fragment of a resolver.
    ///
    /// The fragment is read with its own variables: its argument defaults, overridden by the
    /// arguments of the spread.
    fn read_dependency(
        &mut self,
        spread: &FragmentSpread,
        record: &Record,
    ) -> Result<Value, ReaderError> {
        let reader = self.reader;
        let fragment = reader.fragments.get(&spread.name)?;
        let arguments = argument_values(spread.args.as_deref().unwrap_or_default(), &self.variables);
        let scope = fragment.variables(&self.variables, &arguments);

        let outer = std::mem::replace(&mut self.variables, scope);
        let data = self.traverse_selections(&fragment.selections, record);
        self.variables = outer;
        Ok(Value::Object(data?))
    }
}

/// Applies the output conventions of a resolver field: plural outputs must be lists, and wrapped
/// outputs become derived records.
fn normalize_output(
    field: &ResolverField,
    typename: &str,
    output: Value,
    arena: &mut WrapperArena,
    path: &Path,
) -> Result<ResolverValue, ReaderError> {
    let wrapper = field.resolver_module.weak_object_wrapper.as_ref();
    if field.is_output_plural() {
        return match output {
            Value::Null => Ok(ResolverValue::Value(Value::Null)),
            Value::Array(items) => Ok(match wrapper {
                Some(wrapper) => ResolverValue::List(
                    items
                        .into_iter()
                        .map(|item| {
                            (!item.is_null()).then(|| arena.wrap(typename, &wrapper.key, item))
                        })
                        .collect(),
                ),
                None => ResolverValue::Value(Value::Array(items)),
            }),
            other => Err(invalid_output(
                field,
                path,
                format!("expected a list, got {}", kind(&other)),
            )),
        };
    }
    match wrapper {
        Some(wrapper) if !output.is_null() => Ok(ResolverValue::Object(arena.wrap(
            typename,
            &wrapper.key,
            output,
        ))),
        _ => Ok(ResolverValue::Value(output)),
    }
}

fn invalid_output(field: &ResolverField, path: &Path, reason: String) -> ReaderError {
    ReaderError::InvalidResolverOutput {
        resolver: field.name.as_str().to_string(),
        path: path.clone(),
        reason,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
