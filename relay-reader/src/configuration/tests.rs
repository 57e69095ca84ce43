use std::num::NonZeroUsize;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn defaults() {
    let configuration = Configuration::default();
    assert_eq!(configuration.eviction(), &EvictionPolicy::SingleSlot);
    assert_eq!(configuration.recursion_limit(), 512);
}

#[test]
fn empty_map_uses_defaults() {
    let configuration: Configuration = "{}".parse().unwrap();
    assert_eq!(configuration, Configuration::default());
}

#[test]
fn lru_eviction_from_yaml() {
    let configuration: Configuration = r#"
resolver_cache:
  eviction:
    lru:
      capacity: 64
recursion_limit: 32
"#
    .parse()
    .unwrap();

    assert_eq!(
        configuration,
        Configuration::builder()
            .resolver_cache(
                ResolverCache::builder()
                    .eviction(EvictionPolicy::Lru {
                        capacity: NonZeroUsize::new(64).unwrap(),
                    })
                    .build()
            )
            .recursion_limit(32)
            .build()
    );
}

#[test]
fn unbounded_eviction_from_yaml() {
    let configuration: Configuration = r#"
resolver_cache:
  eviction: unbounded
"#
    .parse()
    .unwrap();
    assert_eq!(configuration.eviction(), &EvictionPolicy::Unbounded);
}

#[test]
fn zero_lru_capacity_is_rejected() {
    let result = r#"
resolver_cache:
  eviction:
    lru:
      capacity: 0
"#
    .parse::<Configuration>();
    assert!(result.is_err());
}

#[test]
fn unknown_fields_are_rejected() {
    let result = r#"
resolver_cache:
  eviction: single_slot
  ttl: 30s
"#
    .parse::<Configuration>();
    assert!(result.is_err());
}

#[test]
fn schema_describes_cache_section() {
    let schema = generate_config_schema();
    let properties = schema
        .get("properties")
        .and_then(|properties| properties.as_object())
        .expect("schema has properties");
    assert!(properties.contains_key("resolver_cache"));
    assert!(properties.contains_key("recursion_limit"));
}
