use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use relay_reader::Configuration;
use relay_reader::ConfigurationError;
use relay_reader::Fragments;
use relay_reader::InMemoryRecordSource;
use relay_reader::Reader;
use relay_reader::ReaderError;
use relay_reader::ResolverError;
use relay_reader::ResolverRegistry;
use relay_reader::json_ext::Object;
use relay_reader::json_ext::Path;
use relay_reader::resolver_module;
use serde_json_bytes::Value;
use serde_json_bytes::json;
use test_log::test;

const TODO_MODEL: &str = "relay-runtime/store/__tests__/resolvers/TodoModel";
const TODO_DESCRIPTION: &str = "relay-runtime/store/__tests__/resolvers/TodoDescription";
const FRAGMENT: &str = "RelayResolverModelTestFragment";

#[derive(Default)]
struct Calls {
    model: AtomicUsize,
    fancy_description: AtomicUsize,
    text: AtomicUsize,
    color: AtomicUsize,
}

impl Calls {
    /// Invocation counts of `TodoModel`, `fancy_description`, `text` and `color`.
    fn counts(&self) -> [usize; 4] {
        [
            self.model.load(Ordering::SeqCst),
            self.fancy_description.load(Ordering::SeqCst),
            self.text.load(Ordering::SeqCst),
            self.color.load(Ordering::SeqCst),
        ]
    }
}

fn field<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    data.as_object()?.get(key)
}

fn resolvers(calls: &Arc<Calls>) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    resolver_module!(registry, TODO_MODEL, {
        TodoModel => {
            let calls = calls.clone();
            move |data: &Value, _: &Object| -> Result<Value, ResolverError> {
                calls.model.fetch_add(1, Ordering::SeqCst);
                Ok(data.clone())
            }
        },
        fancy_description => {
            let calls = calls.clone();
            move |model: &Value, _: &Object| -> Result<Value, ResolverError> {
                calls.fancy_description.fetch_add(1, Ordering::SeqCst);
                match field(model, "description") {
                    None | Some(Value::Null) => Ok(Value::Null),
                    Some(description) => Ok(json!({
                        "text": description.clone(),
                        "color": field(model, "color").cloned().unwrap_or_default(),
                    })),
                }
            }
        },
    });
    resolver_module!(registry, TODO_DESCRIPTION, {
        text => {
            let calls = calls.clone();
            move |description: &Value, _: &Object| -> Result<Value, ResolverError> {
                calls.text.fetch_add(1, Ordering::SeqCst);
                Ok(field(description, "text").cloned().unwrap_or_default())
            }
        },
        color => {
            let calls = calls.clone();
            move |description: &Value, _: &Object| -> Result<Value, ResolverError> {
                calls.color.fetch_add(1, Ordering::SeqCst);
                match field(description, "color") {
                    None | Some(Value::Null) => Err("todo has no color".into()),
                    Some(color) => Ok(color.clone()),
                }
            }
        },
    });
    registry
}

fn fragments() -> Fragments {
    Fragments::from_json_str(include_str!("../testdata/todo_fragments.json")).unwrap()
}

fn store() -> InMemoryRecordSource {
    serde_json::from_str(include_str!("../testdata/todo_store.json")).unwrap()
}

fn reader(calls: &Arc<Calls>, configuration: Option<Configuration>) -> Reader {
    Reader::builder()
        .fragments(fragments())
        .resolvers(resolvers(calls))
        .and_configuration(configuration)
        .build()
}

#[test]
fn fixtures_are_consistent() {
    let fragments = fragments();
    assert_eq!(fragments.len(), 5);
    fragments.validate().unwrap();

    let fragment = fragments.get(FRAGMENT).unwrap();
    assert_eq!(fragment.type_condition, "TodoModel");
    assert!(fragment.metadata.as_ref().unwrap().has_client_edges);
    assert!(!fragment.is_plural());
}

#[test]
fn reads_fields_derived_from_a_model_instance() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);

    let snapshot = reader
        .read(&store(), FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    insta::assert_json_snapshot!(snapshot, @r#"
    {
      "fragment": "RelayResolverModelTestFragment",
      "dataId": "todo:1",
      "data": {
        "fancy_description": {
          "text": "Buy milk",
          "color": "red"
        },
        "id": "todo:1"
      },
      "isMissingData": false
    }
    "#);
    assert_eq!(calls.counts(), [1, 1, 1, 1]);
    assert_eq!(reader.cache_stats().live_wrappers, 1);
}

#[test]
fn null_edges_skip_their_selections() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);

    let snapshot = reader
        .read(&store(), FRAGMENT, "todo:3", &Object::new())
        .unwrap();
    assert_eq!(
        snapshot.data,
        json!({ "fancy_description": null, "id": "todo:3" })
    );
    assert!(!snapshot.is_missing_data);
    assert_eq!(calls.counts(), [1, 1, 0, 0]);
    assert_eq!(reader.cache_stats().live_wrappers, 0);
}

#[test]
fn reads_are_idempotent() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);
    let source = store();

    let first = reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    let second = reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.counts(), [1, 1, 1, 1]);

    let stats = reader.cache_stats();
    assert_eq!((stats.entries, stats.hits, stats.misses), (4, 4, 4));
}

#[test]
fn changed_inputs_recompute_under_single_slot() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);
    let mut source = store();
    let mut read = |description: &str| {
        source
            .get_mut("todo:1")
            .unwrap()
            .set_value("description", description);
        reader
            .read(&source, FRAGMENT, "todo:1", &Object::new())
            .unwrap()
            .data
    };

    assert_eq!(
        read("Buy milk"),
        json!({ "fancy_description": { "text": "Buy milk", "color": "red" }, "id": "todo:1" })
    );
    assert_eq!(
        read("Walk cat"),
        json!({ "fancy_description": { "text": "Walk cat", "color": "red" }, "id": "todo:1" })
    );
    assert_eq!(
        read("Buy milk"),
        json!({ "fancy_description": { "text": "Buy milk", "color": "red" }, "id": "todo:1" })
    );
    // the second read of "Buy milk" replaced the "Walk cat" entry of its field instance
    assert_eq!(calls.counts()[..2], [3, 3]);
    assert_eq!(reader.cache_stats().live_wrappers, 1);
}

#[test]
fn fields_of_replaced_descriptions_are_dropped() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);
    let mut source = store();

    for revision in 0..100 {
        source
            .get_mut("todo:1")
            .unwrap()
            .set_value("description", format!("Buy milk #{revision}"));
        reader
            .read(&source, FRAGMENT, "todo:1", &Object::new())
            .unwrap();
    }
    assert_eq!(calls.counts(), [100, 100, 100, 100]);

    let stats = reader.cache_stats();
    assert_eq!((stats.entries, stats.live_wrappers), (4, 1));
    assert_eq!(
        reader.cached_entries(TODO_DESCRIPTION, "text").unwrap().len(),
        1
    );
}

#[test]
fn unbounded_cache_keeps_previous_inputs() {
    let calls = Arc::new(Calls::default());
    let configuration: Configuration = "resolver_cache:\n  eviction: unbounded\n"
        .parse()
        .unwrap();
    let reader = reader(&calls, Some(configuration));
    let mut source = store();

    for description in ["Buy milk", "Walk cat", "Buy milk"] {
        source
            .get_mut("todo:1")
            .unwrap()
            .set_value("description", description);
        let snapshot = reader
            .read(&source, FRAGMENT, "todo:1", &Object::new())
            .unwrap();
        assert_eq!(
            snapshot.data,
            json!({ "fancy_description": { "text": description, "color": "red" }, "id": "todo:1" })
        );
    }
    assert_eq!(calls.counts()[..2], [2, 2]);
    assert_eq!(reader.cache_stats().live_wrappers, 2);
}

#[test]
fn plural_reads_keep_the_order_of_records() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);

    let snapshots = reader
        .read_plural(
            &store(),
            FRAGMENT,
            &["todo:2", "todo:1", "todo:3", "todo:4"],
            &Object::new(),
        )
        .unwrap();
    assert_eq!(
        snapshots
            .iter()
            .map(|snapshot| (snapshot.data.clone(), snapshot.is_missing_data))
            .collect::<Vec<_>>(),
        vec![
            (
                json!({ "fancy_description": { "text": "Walk dog", "color": "green" }, "id": "todo:2" }),
                false
            ),
            (
                json!({ "fancy_description": { "text": "Buy milk", "color": "red" }, "id": "todo:1" }),
                false
            ),
            (
                json!({ "fancy_description": null, "id": "todo:3" }),
                false
            ),
            (Value::Null, true),
        ]
    );
}

#[test]
fn resolver_errors_are_surfaced_and_not_cached() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);
    let mut source = store();
    source
        .get_mut("todo:1")
        .unwrap()
        .set_value("color", Value::Null);

    let error = reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap_err();
    assert_eq!(
        error,
        ReaderError::ResolverExecution {
            resolver: "color".to_string(),
            path: Path::from_slice(&["fancy_description", "color"]),
            message: "todo has no color".to_string(),
        }
    );
    assert_eq!(
        error.to_string(),
        "resolver 'color' failed at '/fancy_description/color': todo has no color"
    );
    assert_eq!(
        reader.cached_entries(TODO_DESCRIPTION, "color").unwrap(),
        vec![]
    );

    assert!(
        reader
            .read(&source, FRAGMENT, "todo:1", &Object::new())
            .is_err()
    );
    assert_eq!(calls.counts()[3], 2);

    source
        .get_mut("todo:1")
        .unwrap()
        .set_value("color", "blue");
    let snapshot = reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    assert_eq!(
        snapshot.data,
        json!({ "fancy_description": { "text": "Buy milk", "color": "blue" }, "id": "todo:1" })
    );
    assert_eq!(calls.counts()[3], 3);
}

#[test]
fn catch_turns_errors_into_results() {
    let calls = Arc::new(Calls::default());
    let reader = reader(&calls, None);
    let mut source = store();

    let snapshot = reader
        .read(&source, "RelayResolverModelCatchFragment", "todo:1", &Object::new())
        .unwrap();
    assert_eq!(
        snapshot.data,
        json!({
            "fancy_description": { "ok": true, "value": { "color": "red" } },
            "id": "todo:1"
        })
    );

    source
        .get_mut("todo:1")
        .unwrap()
        .set_value("color", Value::Null);
    let snapshot = reader
        .read(&source, "RelayResolverModelCatchFragment", "todo:1", &Object::new())
        .unwrap();
    insta::assert_json_snapshot!(snapshot.data, @r#"
    {
      "fancy_description": {
        "ok": false,
        "errors": [
          {
            "message": "resolver 'color' failed at '/fancy_description/color': todo has no color",
            "path": [
              "fancy_description",
              "color"
            ],
            "extensions": {
              "code": "RESOLVER_EXECUTION_ERROR",
              "resolver": "color"
            }
          }
        ]
      },
      "id": "todo:1"
    }
    "#);
}

#[test]
fn replacing_a_resolver_drops_its_outputs() {
    let calls = Arc::new(Calls::default());
    let mut reader = reader(&calls, None);
    let source = store();
    reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    assert_eq!(reader.cached_entries(TODO_DESCRIPTION, "text").unwrap().len(), 1);

    reader.register_resolver(
        TODO_DESCRIPTION,
        "text",
        |description: &Value, _: &Object| -> Result<Value, ResolverError> {
            Ok(field(description, "text")
                .and_then(|text| text.as_str())
                .map(|text| json!(text.to_uppercase()))
                .unwrap_or_default())
        },
    );
    let snapshot = reader
        .read(&source, FRAGMENT, "todo:1", &Object::new())
        .unwrap();
    assert_eq!(
        snapshot.data,
        json!({ "fancy_description": { "text": "BUY MILK", "color": "red" }, "id": "todo:1" })
    );
    assert_eq!(calls.counts()[2], 1);

    reader.invalidate_resolver(TODO_MODEL, "fancy_description").unwrap();
    assert_eq!(
        reader.cached_entries(TODO_MODEL, "fancy_description").unwrap(),
        vec![]
    );
    assert_eq!(
        reader.invalidate_resolver(TODO_MODEL, "title"),
        Err(ConfigurationError::UnknownResolver {
            module: TODO_MODEL.to_string(),
            export: "title".to_string(),
        })
    );
}

#[test]
fn missing_resolvers_fail_the_read() {
    let reader = Reader::builder().fragments(fragments()).build();
    assert_eq!(
        reader.read(&store(), FRAGMENT, "todo:1", &Object::new()),
        Err(ReaderError::Configuration(
            ConfigurationError::UnknownResolver {
                module: TODO_MODEL.to_string(),
                export: "fancy_description".to_string(),
            }
        ))
    );
}

#[test]
fn readers_are_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Reader>();

    let calls = Arc::new(Calls::default());
    let reader = Arc::new(reader(&calls, None));
    let source = Arc::new(store());
    let handles = ["todo:1", "todo:2", "todo:1", "todo:2"]
        .into_iter()
        .map(|data_id| {
            let reader = reader.clone();
            let source = source.clone();
            std::thread::spawn(move || {
                reader
                    .read(source.as_ref(), FRAGMENT, data_id, &Object::new())
                    .unwrap()
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        let snapshot = handle.join().unwrap();
        assert!(!snapshot.is_missing_data);
    }
    // each todo computes its description once
    assert_eq!(calls.counts()[..2], [2, 2]);
}
