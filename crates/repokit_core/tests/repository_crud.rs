mod support;

use repokit_core::model::Input;
use repokit_core::repo::{ConfigError, ErrorKind, ExceptionHandler, Finder};
use repokit_core::{
    DependencyDefault, DependencyError, DependencyOverrides, OpenInput, RecordClass, RepoError,
    WithModel, WithSpec,
};
use serde_json::json;
use support::{attrs, fixture, insert_post, insert_user};

fn open(value: serde_json::Value) -> OpenInput {
    OpenInput::new(attrs(value))
}

fn user_count(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn create_returns_model_with_unrequested_bundles_unloaded() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();

    let user = users
        .create(&fx.conn, &mut open(json!({ "email": "a@x", "name": "Ann" })))
        .unwrap()
        .into_value()
        .unwrap();

    assert_eq!(user.email, "a@x");
    assert_eq!(user.name.as_deref(), Some("Ann"));
    assert!(!user.posts.is_loaded());
    assert_eq!(user.posts.get().unwrap_err().to_string(), "<unloaded User#posts> was accessed");
}

#[test]
fn null_column_maps_to_blank_and_marks_input_invalid() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();
    let mut input = open(json!({ "name": "no email" }));

    let outcome = users.create(&fx.conn, &mut input).unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind(), ErrorKind::NotNullViolation);
    assert_eq!(failure.errors.get("email"), ["blank"]);
    assert!(input.is_invalid());
    assert_eq!(input.errors().unwrap().get("email"), ["blank"]);
    assert_eq!(user_count(&fx.conn), 0);
}

#[test]
fn invalid_input_never_reaches_the_database() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();
    let mut input = open(json!({ "email": "  " })).require("email");

    let outcome = users.create(&fx.conn, &mut input).unwrap();

    assert_eq!(outcome.failure().unwrap().kind(), ErrorKind::RecordInvalid);
    assert_eq!(outcome.errors().unwrap().get("email"), ["blank"]);
    assert_eq!(user_count(&fx.conn), 0);
}

#[test]
fn duplicate_values_map_to_taken() {
    let fx = fixture();
    insert_user(&fx.conn, "a@x");
    let users = fx.users.repository().unwrap();

    let outcome = users
        .create(&fx.conn, &mut open(json!({ "email": "a@x" })))
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind(), ErrorKind::RecordNotUnique);
    assert_eq!(failure.errors.get("email"), ["taken"]);
}

#[test]
fn composite_uniqueness_reports_the_scoped_column() {
    let fx = fixture();
    let user_id = insert_user(&fx.conn, "a@x");
    let posts = fx.posts.repository().unwrap();
    let mut first = open(json!({ "user_id": user_id, "title": "One", "slug": "one" }));
    assert!(posts.create(&fx.conn, &mut first).unwrap().is_success());

    let outcome = posts
        .create(
            &fx.conn,
            &mut open(json!({ "user_id": user_id, "title": "Again", "slug": "one" })),
        )
        .unwrap();

    assert_eq!(outcome.errors().unwrap().get("slug"), ["taken in scope user_id"]);
}

#[test]
fn unmapped_constraint_errors_propagate_and_roll_back() {
    let fx = fixture();
    let posts = fx.posts.repository().unwrap();

    let err = posts
        .create(&fx.conn, &mut open(json!({ "user_id": 999, "title": "Orphan" })))
        .unwrap_err();

    assert!(matches!(err, RepoError::ForeignKeyViolation { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidForeignKey);
    let posts_left: i64 = fx
        .conn
        .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
        .unwrap();
    assert_eq!(posts_left, 0);
}

#[test]
fn find_by_key_and_by_attributes() {
    let fx = fixture();
    let id = insert_user(&fx.conn, "a@x");
    let users = fx.users.repository().unwrap();

    let by_key = users.find(&fx.conn, id).unwrap().into_value().unwrap();
    let by_email = users
        .find(&fx.conn, attrs(json!({ "email": "a@x" })))
        .unwrap()
        .into_value()
        .unwrap();

    assert_eq!(by_key, by_email);
    assert_eq!(by_key.id, id);
}

#[test]
fn missing_record_is_a_not_found_failure() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();

    let outcome = users.find(&fx.conn, Finder::Key(42)).unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind(), ErrorKind::RecordNotFound);
    assert_eq!(failure.errors.get("base"), ["not found"]);
    assert_eq!(failure.message(), "not found");
}

#[test]
fn update_changes_only_given_attributes() {
    let fx = fixture();
    let id = insert_user(&fx.conn, "a@x");
    let users = fx.users.repository().unwrap();

    let updated = users
        .update(&fx.conn, id, &mut open(json!({ "name": "Ann" })))
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(updated.email, "a@x");
    assert_eq!(updated.name.as_deref(), Some("Ann"));

    let mut missing = open(json!({ "name": "Bob" }));
    let outcome = users.update(&fx.conn, id + 1, &mut missing).unwrap();
    assert!(outcome.is_failure());
    assert_eq!(missing.errors().unwrap().get("base"), ["not found"]);
}

#[test]
fn failed_edit_keeps_the_model_next_to_the_errors() {
    let fx = fixture();
    insert_user(&fx.conn, "taken@x");
    let id = insert_user(&fx.conn, "ann@x");
    let users = fx.users.repository().unwrap();
    let stored = users.find(&fx.conn, id).unwrap().into_value().unwrap();

    let mut edit = WithModel::new(open(json!({ "email": "taken@x" })), stored);
    let outcome = users.update(&fx.conn, id, &mut edit).unwrap();

    assert!(outcome.is_failure());
    assert_eq!(edit.errors().unwrap().get("email"), ["taken"]);
    assert_eq!(edit.model().email, "ann@x");
    assert_eq!(edit.input().get("email"), Some(&json!("taken@x")));
}

#[test]
fn upsert_creates_then_updates() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();
    let by = attrs(json!({ "email": "a@x" }));

    let created = users
        .upsert(&fx.conn, &by, Some(&mut open(json!({ "name": "Ann" }))))
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(created.email, "a@x");

    let updated = users
        .upsert(&fx.conn, &by, Some(&mut open(json!({ "name": "Anne" }))))
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name.as_deref(), Some("Anne"));
    assert_eq!(user_count(&fx.conn), 1);

    let bare = users
        .upsert(&fx.conn, &attrs(json!({ "email": "b@x" })), None)
        .unwrap();
    assert!(bare.is_success());
    assert_eq!(user_count(&fx.conn), 2);
}

#[test]
fn destroy_returns_the_last_state() {
    let fx = fixture();
    let id = insert_user(&fx.conn, "a@x");
    let users = fx.users.repository().unwrap();

    let destroyed = users.destroy(&fx.conn, id).unwrap().into_value().unwrap();

    assert_eq!(destroyed.email, "a@x");
    assert!(users.find(&fx.conn, id).unwrap().is_failure());
    assert!(users.destroy(&fx.conn, id).unwrap().is_failure());
}

#[test]
fn failed_inner_transaction_rolls_back_everything() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();

    let outcome = users
        .transaction(&fx.conn, |users| {
            let first = users.create(&fx.conn, &mut open(json!({ "email": "a@x" })))?;
            assert!(first.is_success());
            users.transaction(&fx.conn, |users| {
                let second = users.create(&fx.conn, &mut open(json!({ "email": "b@x" })))?;
                assert!(second.is_success());
                users.create(&fx.conn, &mut open(json!({ "name": "no email" })))
            })
        })
        .unwrap();

    assert!(outcome.is_failure());
    assert_eq!(user_count(&fx.conn), 0);
}

#[test]
fn rollback_signal_becomes_a_failure() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();

    let outcome = users
        .transaction(&fx.conn, |users| {
            let created = users.create(&fx.conn, &mut open(json!({ "email": "a@x" })))?;
            assert!(created.is_success());
            users.rollback::<repokit_core::Outcome<()>>()
        })
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind(), ErrorKind::Rollback);
    assert_eq!(failure.errors.get("base"), ["rolled back"]);
    assert_eq!(user_count(&fx.conn), 0);
}

#[test]
fn committed_transaction_keeps_writes() {
    let fx = fixture();
    let users = fx.users.repository().unwrap();

    let outcome = users
        .transaction(&fx.conn, |users| {
            users.create(&fx.conn, &mut open(json!({ "email": "a@x" })))
        })
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(user_count(&fx.conn), 1);
}

#[test]
fn with_is_memoized_and_order_insensitive() {
    let fx = fixture();

    let a = fx.users.with(["posts", "posts_count"]).unwrap();
    let b = fx.users.with(["posts_count", "posts"]).unwrap();
    let plain = fx.users.repository().unwrap();

    assert!(a.same_instance(&b));
    assert!(!a.same_instance(&plain));
    assert!(plain.with("posts").unwrap().same_instance(&fx.users.with("posts").unwrap()));
    assert_eq!(a.to_string(), "UserRepository.with(posts, posts_count)");
    assert_eq!(plain.to_string(), "UserRepository");
}

#[test]
fn unknown_with_key_fails_at_construction() {
    let fx = fixture();

    let err = fx.users.with(["posts", "bogus"]).unwrap_err();

    match err {
        RepoError::Config(ConfigError::UnknownOptional { unknown, known }) => {
            assert_eq!(unknown, ["bogus"]);
            assert_eq!(known, ["posts", "posts_count"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn scoped_narrows_a_throwaway_sibling() {
    let fx = fixture();
    let ann = insert_user(&fx.conn, "ann@x");
    let bob = insert_user(&fx.conn, "bob@x");
    insert_post(&fx.conn, ann, "A1", Some(1));
    insert_post(&fx.conn, ann, "A2", Some(2));
    insert_post(&fx.conn, bob, "B1", Some(1));
    let posts = fx.posts.repository().unwrap();

    let titles = posts
        .scoped(
            |scope| Ok(scope.where_eq("user_id", bob)),
            |narrowed| {
                Ok(narrowed
                    .all(&fx.conn)
                    .to_vec()?
                    .into_iter()
                    .map(|post| post.title)
                    .collect::<Vec<_>>())
            },
        )
        .unwrap();

    assert_eq!(titles, ["B1"]);
    assert_eq!(posts.all(&fx.conn).count().unwrap(), 3);
    let outside = posts
        .scoped(
            |scope| Ok(scope.where_eq("user_id", bob)),
            |narrowed| narrowed.find(&fx.conn, 1_i64),
        )
        .unwrap();
    assert!(outside.is_failure());
}

#[test]
fn subclass_extends_exceptions_without_touching_parent() {
    let fx = fixture();
    insert_user(&fx.conn, "a@x");
    let strict = fx
        .users
        .subclass::<support::User>("StrictUserRepository")
        .record_class(RecordClass::new("UserRecord"))
        .exception(
            ErrorKind::RecordNotUnique,
            ExceptionHandler::constant("email already registered"),
        )
        .build();

    let strict_outcome = strict
        .repository()
        .unwrap()
        .create(&fx.conn, &mut open(json!({ "email": "a@x" })))
        .unwrap();
    let parent_outcome = fx
        .users
        .repository()
        .unwrap()
        .create(&fx.conn, &mut open(json!({ "email": "a@x" })))
        .unwrap();

    assert_eq!(strict_outcome.errors().unwrap().get("base"), ["email already registered"]);
    assert_eq!(parent_outcome.errors().unwrap().get("email"), ["taken"]);
    assert_eq!(strict.config().optional_keys(), ["posts", "posts_count"]);
}

#[test]
fn instance_overrides_replace_overridable_dependencies_only() {
    let fx = fixture();
    let audited = fx
        .users
        .subclass::<support::User>("AuditedUserRepository")
        .record_class(RecordClass::new("UserRecord"))
        .dependency("clock", DependencyDefault::literal("system".to_string()))
        .class_dependency("audit_table", DependencyDefault::literal("audits".to_string()))
        .build();

    let default = audited.repository().unwrap();
    assert_eq!(*default.dependency::<String>("clock").unwrap(), "system");

    let frozen = audited
        .instance(
            WithSpec::new(),
            DependencyOverrides::new().set("clock", "frozen".to_string()),
        )
        .unwrap();
    assert_eq!(*frozen.dependency::<String>("clock").unwrap(), "frozen");
    assert!(!frozen.same_instance(&default));

    let err = audited
        .instance(
            WithSpec::new(),
            DependencyOverrides::new().set("audit_table", "other".to_string()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Dependency(DependencyError::NotOverridable { .. })
    ));
}
