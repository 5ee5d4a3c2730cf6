mod support;

use repokit_core::db::open_db_in_memory;
use repokit_core::lookup::LookupStrategy;
use repokit_core::repo::RepositoryHandle;
use repokit_core::{
    ClassEntry, ClassKind, ClassLookup, ClassRegistry, DependencyOverrides, LookupError,
    RecordClass, RepoError, RepositoryClass, WithSpec,
};
use std::sync::Arc;
use support::{fixture, User, MIGRATIONS};

#[test]
fn built_repositories_are_registered_by_name() {
    let fx = fixture();

    let found = ClassLookup::repository_for("users")
        .call(&fx.registry, None)
        .unwrap();

    assert_eq!(found.kind(), &ClassKind::Repository);
    assert_eq!(found.get::<RepositoryHandle>().unwrap().name(), "UserRepository");
    let record = fx.registry.resolve("PostRepository", &ClassKind::Record);
    assert_eq!(record.get::<RecordClass>().unwrap().table(), "posts");
}

#[test]
fn late_registration_after_a_miss_stays_missing() {
    let conn = open_db_in_memory(MIGRATIONS).unwrap();
    let registry = Arc::new(ClassRegistry::new());
    let users = RepositoryClass::<User>::builder("UserRepository")
        .registry(Arc::clone(&registry))
        .build();

    let early = users.repository().unwrap();
    assert!(matches!(
        early.find(&conn, 1_i64),
        Err(RepoError::Lookup(LookupError::NotFound(_)))
    ));

    RecordClass::new("UserRecord").register(&registry);

    // (UserRepository, Record) was memoized as a miss.
    let fresh = users
        .instance(WithSpec::new(), DependencyOverrides::new())
        .unwrap();
    let err = fresh.find(&conn, 1_i64).unwrap_err();
    assert_eq!(
        err.to_string(),
        "UserRecord was accessed, but it was not found"
    );
    assert!(registry
        .resolve("UserRepository", &ClassKind::Record)
        .is_missing());

    // Pairs never resolved before see the new class.
    assert!(registry.get("UserRecord").is_some());
    assert!(registry.resolve("UserRepo", &ClassKind::Record).is_found());
}

#[test]
fn missing_class_can_source_further_lookups() {
    let registry = ClassRegistry::new();
    registry.register(ClassEntry::new("Account", "account model"));

    let missing_record = registry.resolve("AccountRepository", &ClassKind::Record);
    assert!(missing_record.is_missing());

    let model = registry.resolve(&missing_record, &ClassKind::Model);
    assert_eq!(*model.get::<&str>().unwrap(), "account model");
}

#[test]
fn chained_lookup_reports_every_miss() {
    let registry = ClassRegistry::new();
    let lookup = ClassLookup::new(LookupStrategy::name("LegacyUserRecord"))
        .on_missing(LookupStrategy::transform(|name: &str| format!("{name}Record")));

    let missing = lookup.call(&registry, Some("User")).unwrap();

    match missing.get::<RecordClass>() {
        Err(LookupError::NotFound(missing)) => {
            assert_eq!(missing.class_names(), ["LegacyUserRecord", "UserRecord"]);
            assert_eq!(missing.class_name(), "UserRecord");
        }
        other => panic!("unexpected lookup result: {other:?}"),
    }
}

#[test]
fn wrong_registered_type_is_a_lookup_error() {
    let registry = Arc::new(ClassRegistry::new());
    registry.register(ClassEntry::new("UserRecord", "not a record class"));
    let users = RepositoryClass::<User>::builder("UserRepository")
        .registry(Arc::clone(&registry))
        .build();

    let err = users.repository().unwrap_err();

    assert!(matches!(err, RepoError::Lookup(LookupError::WrongType { .. })));
}
