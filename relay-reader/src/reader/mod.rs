//! Reads fragments out of a record source, invoking resolvers for derived fields.

use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::cache::CacheStats;
use crate::cache::ResolverOutputCache;
use crate::cache::ResolverValue;
use crate::configuration::Configuration;
use crate::error::ConfigurationError;
use crate::error::ReaderError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::resolvers::Resolver;
use crate::resolvers::ResolverId;
use crate::resolvers::ResolverRegistry;
use crate::spec::argument_values;
use crate::spec::CatchField;
use crate::spec::CatchTo;
use crate::spec::FragmentSpread;
use crate::spec::Fragments;
use crate::spec::InlineFragment;
use crate::spec::LinkedField;
use crate::spec::ResolverField;
use crate::spec::ScalarField;
use crate::spec::Selection;
use crate::store::DataId;
use crate::store::Link;
use crate::store::Record;
use crate::store::RecordSource;
use crate::store::RecordState;
use crate::store::ID_KEY;

mod invoker;

const FRAGMENTS_KEY: &str = "__fragments";

/// The result of reading a fragment on a record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The fragment name.
    pub fragment: String,
    /// The root record.
    pub data_id: DataId,
    /// The fragment data, `null` when the root record does not exist.
    pub data: Value,
    /// Some records or fields read were missing from the record source.
    pub is_missing_data: bool,
}

/// Reads fragments, computing resolver fields with registered resolvers and caching their
/// outputs.
///
/// A reader is `Send + Sync`: reads may run in parallel and share the resolver output cache.
pub struct Reader {
    fragments: Fragments,
    resolvers: ResolverRegistry,
    configuration: Configuration,
    cache: ResolverOutputCache,
}

#[buildstructor::buildstructor]
impl Reader {
    /// Returns a builder for a [`Reader`].
    ///
    /// Builder methods:
    ///
    /// * `.fragments(`[`Fragments`]`)`
    ///   Required.
    ///
    /// * `.resolvers(`[`ResolverRegistry`]`)`
    ///   Optional, defaults to an empty registry.
    ///
    /// * `.configuration(`[`Configuration`]`)`
    ///   Optional.
    #[builder(visibility = "pub")]
    fn new(
        fragments: Fragments,
        resolvers: Option<ResolverRegistry>,
        configuration: Option<Configuration>,
    ) -> Self {
        let configuration = configuration.unwrap_or_default();
        let cache = ResolverOutputCache::new(configuration.eviction());
        Self {
            fragments,
            resolvers: resolvers.unwrap_or_default(),
            configuration,
            cache,
        }
    }
}

impl Reader {
    /// Reads `fragment` on the record `data_id`.
    #[tracing::instrument(skip_all, level = "trace", fields(fragment = %fragment, data_id = %data_id))]
    pub fn read(
        &self,
        source: &dyn RecordSource,
        fragment: &str,
        data_id: &str,
        variables: &Object,
    ) -> Result<Snapshot, ReaderError> {
        let reader_fragment = self.fragments.get(fragment)?;
        let mut context =
            ReadContext::new(self, source, reader_fragment.variables(variables, variables));
        let data = context.read_record(data_id, &reader_fragment.selections)?;
        Ok(Snapshot {
            fragment: fragment.to_string(),
            data_id: data_id.to_string(),
            data,
            is_missing_data: context.is_missing_data,
        })
    }

    /// Reads `fragment` on each record of `data_ids`, in order.
    #[tracing::instrument(skip_all, level = "trace", fields(fragment = %fragment, records = data_ids.len()))]
    pub fn read_plural(
        &self,
        source: &dyn RecordSource,
        fragment: &str,
        data_ids: &[&str],
        variables: &Object,
    ) -> Result<Vec<Snapshot>, ReaderError> {
        data_ids
            .iter()
            .map(|data_id| self.read(source, fragment, data_id, variables))
            .collect()
    }

    /// Reads `selections` on `record`. Linked records are looked up in `source`.
    pub fn resolve(
        &self,
        source: &dyn RecordSource,
        record: &Record,
        selections: &[Selection],
        variables: &Object,
    ) -> Result<Object, ReaderError> {
        ReadContext::new(self, source, variables.clone()).traverse_selections(selections, record)
    }

    /// Computes the resolver field `field` on `record`, going through the resolver output
    /// cache.
    pub fn invoke(
        &self,
        source: &dyn RecordSource,
        field: &ResolverField,
        record: &Record,
        variables: &Object,
    ) -> Result<ResolverValue, ReaderError> {
        ReadContext::new(self, source, variables.clone()).evaluate_resolver(field, record, None)
    }

    /// Registers a resolver. Outputs cached for a previous registration of the same export are
    /// never used again.
    pub fn register_resolver<R>(
        &mut self,
        module: impl Into<String>,
        export: impl Into<String>,
        resolver: R,
    ) -> ResolverId
    where
        R: Resolver + 'static,
    {
        let module = module.into();
        let export = export.into();
        if let Ok(previous) = self.resolvers.id(&module, &export) {
            self.cache.invalidate_resolver(previous);
        }
        self.resolvers.register(module, export, resolver)
    }

    /// Drops every cached output of a resolver.
    pub fn invalidate_resolver(&self, module: &str, export: &str) -> Result<(), ConfigurationError> {
        let id = self.resolvers.id(module, export)?;
        self.cache.invalidate_resolver(id);
        Ok(())
    }

    pub fn clear_resolver_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The cached outputs of a resolver.
    pub fn cached_entries(
        &self,
        module: &str,
        export: &str,
    ) -> Result<Vec<ResolverValue>, ConfigurationError> {
        Ok(self.cache.entries_for(self.resolvers.id(module, export)?))
    }

    pub fn resolver_cache(&self) -> &ResolverOutputCache {
        &self.cache
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

/// The state of a single read.
struct ReadContext<'a> {
    reader: &'a Reader,
    source: &'a dyn RecordSource,
    variables: Object,
    path: Path,
    depth: usize,
    is_missing_data: bool,
}

impl<'a> ReadContext<'a> {
    fn new(reader: &'a Reader, source: &'a dyn RecordSource, variables: Object) -> Self {
        Self {
            reader,
            source,
            variables,
            path: Path::default(),
            depth: 0,
            is_missing_data: false,
        }
    }

    fn traverse_selections(
        &mut self,
        selections: &[Selection],
        record: &Record,
    ) -> Result<Object, ReaderError> {
        let mut data = Object::new();
        self.traverse_into(selections, record, &mut data)?;
        Ok(data)
    }

    fn traverse_into(
        &mut self,
        selections: &[Selection],
        record: &Record,
        data: &mut Object,
    ) -> Result<(), ReaderError> {
        let limit = self.reader.configuration.recursion_limit();
        if self.depth >= limit {
            return Err(ReaderError::RecursionLimitExceeded(limit));
        }
        self.depth += 1;
        let result = selections
            .iter()
            .try_for_each(|selection| self.read_selection(selection, record, data));
        self.depth -= 1;
        result
    }

    fn read_selection(
        &mut self,
        selection: &Selection,
        record: &Record,
        data: &mut Object,
    ) -> Result<(), ReaderError> {
        match selection {
            Selection::ScalarField(field) => {
                let value = self.read_scalar(field, record);
                data.insert(field.response_key().clone(), value);
            }
            Selection::LinkedField(field) => {
                let key = field.response_key();
                let value = self.in_field(key, |context| context.read_linked_field(field, record))?;
                data.insert(key.clone(), value);
            }
            Selection::RelayResolver(field) => {
                let key = field.response_key();
                let value =
                    self.in_field(key, |context| context.read_resolver_field(field, record))?;
                data.insert(key.clone(), value);
            }
            Selection::ClientEdgeToClientObject(edge) => {
                let key = edge.linked_field.response_key();
                let value = self.in_field(key, |context| context.read_client_edge(edge, record))?;
                data.insert(key.clone(), value);
            }
            Selection::ClientExtension(extension) => {
                self.traverse_into(&extension.selections, record, data)?;
            }
            Selection::Condition(condition) => {
                let value = self
                    .variables
                    .get(condition.condition.as_str())
                    .map(|value| value.is_truthy())
                    .unwrap_or_default();
                if value == condition.passing_value {
                    self.traverse_into(&condition.selections, record, data)?;
                }
            }
            Selection::InlineFragment(fragment) => {
                if self.matches_type(fragment, record) {
                    self.traverse_into(&fragment.selections, record, data)?;
                }
            }
            Selection::FragmentSpread(spread) => {
                self.create_fragment_pointer(spread, record, data)?;
            }
            Selection::CatchField(catch) => {
                self.read_catch_field(catch, record, data)?;
            }
        }
        Ok(())
    }

    fn in_field<T>(
        &mut self,
        key: &ByteString,
        read: impl FnOnce(&mut Self) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        self.path.push(PathElement::Key(key.as_str().to_string()));
        let result = read(self);
        self.path.pop();
        result
    }

    fn in_index<T>(
        &mut self,
        index: usize,
        read: impl FnOnce(&mut Self) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        self.path.push(PathElement::Index(index));
        let result = read(self);
        self.path.pop();
        result
    }

    fn read_scalar(&mut self, field: &ScalarField, record: &Record) -> Value {
        let storage_key = field.storage_key(&self.variables);
        match record.read_field(&storage_key) {
            Some(value) => value.clone(),
            None => {
                self.is_missing_data = true;
                Value::Null
            }
        }
    }

    fn read_linked_field(
        &mut self,
        field: &LinkedField,
        record: &Record,
    ) -> Result<Value, ReaderError> {
        let storage_key = field.storage_key(&self.variables);
        if field.plural {
            match record.read_linked_records(&storage_key) {
                Link::Missing => {
                    self.is_missing_data = true;
                    Ok(Value::Null)
                }
                Link::Null => Ok(Value::Null),
                Link::Present(data_ids) => data_ids
                    .into_iter()
                    .enumerate()
                    .map(|(index, data_id)| {
                        self.in_index(index, |context| match data_id {
                            Some(data_id) => context.read_record(data_id, &field.selections),
                            None => Ok(Value::Null),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
            }
        } else {
            match record.read_linked_record(&storage_key) {
                Link::Missing => {
                    self.is_missing_data = true;
                    Ok(Value::Null)
                }
                Link::Null => Ok(Value::Null),
                Link::Present(data_id) => self.read_record(data_id, &field.selections),
            }
        }
    }

    /// Reads `selections` on the record `data_id` of the record source.
    fn read_record(
        &mut self,
        data_id: &str,
        selections: &[Selection],
    ) -> Result<Value, ReaderError> {
        let source = self.source;
        match source.get(data_id) {
            RecordState::Existent(record) => {
                Ok(Value::Object(self.traverse_selections(selections, record)?))
            }
            RecordState::Nonexistent => Ok(Value::Null),
            RecordState::Unknown => {
                self.is_missing_data = true;
                Ok(Value::Null)
            }
        }
    }

    fn matches_type(&mut self, fragment: &InlineFragment, record: &Record) -> bool {
        if record.typename() == Some(fragment.type_condition.as_str()) {
            return true;
        }
        let Some(abstract_key) = &fragment.abstract_key else {
            return false;
        };
        match record.read_field(abstract_key) {
            Some(value) => value.is_truthy(),
            None => {
                self.is_missing_data = true;
                false
            }
        }
    }

    /// Masks a fragment spread: the result only references the fragment and its arguments.
    fn create_fragment_pointer(
        &mut self,
        spread: &FragmentSpread,
        record: &Record,
        data: &mut Object,
    ) -> Result<(), ReaderError> {
        self.reader.fragments.get(&spread.name)?;
        let arguments = argument_values(spread.args.as_deref().unwrap_or_default(), &self.variables);
        if let Some(data_id) = record.data_id() {
            data.insert(ID_KEY, Value::String(ByteString::from(data_id)));
        }
        if !data.contains_key(FRAGMENTS_KEY) {
            data.insert(FRAGMENTS_KEY, Value::Object(Object::new()));
        }
        if let Some(Value::Object(fragments)) = data.get_mut(FRAGMENTS_KEY) {
            fragments.insert(ByteString::from(spread.name.as_str()), Value::Object(arguments));
        }
        Ok(())
    }

    fn read_catch_field(
        &mut self,
        catch: &CatchField,
        record: &Record,
        data: &mut Object,
    ) -> Result<(), ReaderError> {
        let mut caught = Object::new();
        match self.traverse_into(std::slice::from_ref(catch.field.as_ref()), record, &mut caught) {
            Ok(()) => {
                for (key, value) in caught {
                    let value = match catch.to {
                        CatchTo::Result => {
                            let mut result = Object::new();
                            result.insert("ok", Value::Bool(true));
                            result.insert("value", value);
                            Value::Object(result)
                        }
                        CatchTo::Null => value,
                    };
                    data.insert(key, value);
                }
            }
            Err(error) if error.is_field_error() => {
                tracing::debug!(path = %self.path, %error, "caught field error");
                if let Some(key) = catch.field.response_key() {
                    let value = match catch.to {
                        CatchTo::Result => {
                            let error =
                                serde_json_bytes::to_value(error.to_graphql_error()).unwrap_or_default();
                            let mut result = Object::new();
                            result.insert("ok", Value::Bool(false));
                            result.insert("errors", Value::Array(vec![error]));
                            Value::Object(result)
                        }
                        CatchTo::Null => Value::Null,
                    };
                    data.insert(key.clone(), value);
                }
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }
}
