#![allow(dead_code)]

use repokit_core::db::open_db_in_memory;
use repokit_core::repo::AttributeLoader;
use repokit_core::{
    AttributeSet, Attributes, ClassRegistry, Loadable, Migration, Model, ModelError,
    OptionalBundle, Persisted, RecordClass, RecordId, RepositoryClass,
};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT
        );
        CREATE TABLE posts (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            slug TEXT,
            position INTEGER,
            UNIQUE (user_id, slug)
        );
        CREATE TABLE comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL REFERENCES posts(id),
            body TEXT NOT NULL
        );
    ",
}];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: RecordId,
    pub email: String,
    pub name: Option<String>,
    pub posts: Loadable<Vec<Value>>,
    pub posts_count: Loadable<i64>,
}

impl Model for User {
    const NAME: &'static str = "User";

    fn from_attributes(mut attributes: AttributeSet) -> Result<Self, ModelError> {
        Ok(Self {
            id: attributes.take("id")?,
            email: attributes.take("email")?,
            name: attributes.take("name")?,
            posts: attributes.take_loadable("posts")?,
            posts_count: attributes.take_loadable("posts_count")?,
        })
    }
}

impl Persisted for User {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: RecordId,
    pub user_id: RecordId,
    pub title: String,
    pub slug: Option<String>,
    pub position: Option<i64>,
    pub user: Loadable<Option<Value>>,
    pub comments: Loadable<Vec<Value>>,
}

impl Model for Post {
    const NAME: &'static str = "Post";

    fn from_attributes(mut attributes: AttributeSet) -> Result<Self, ModelError> {
        Ok(Self {
            id: attributes.take("id")?,
            user_id: attributes.take("user_id")?,
            title: attributes.take("title")?,
            slug: attributes.take("slug")?,
            position: attributes.take("position")?,
            user: attributes.take_loadable("user")?,
            comments: attributes.take_loadable("comments")?,
        })
    }
}

impl Persisted for Post {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: RecordId,
    pub post_id: RecordId,
    pub body: String,
}

impl Model for Comment {
    const NAME: &'static str = "Comment";

    fn from_attributes(mut attributes: AttributeSet) -> Result<Self, ModelError> {
        Ok(Self {
            id: attributes.take("id")?,
            post_id: attributes.take("post_id")?,
            body: attributes.take("body")?,
        })
    }
}

pub struct Fixture {
    pub conn: Connection,
    pub registry: Arc<ClassRegistry>,
    pub users: RepositoryClass<User>,
    pub posts: RepositoryClass<Post>,
    pub comments: RepositoryClass<Comment>,
}

/// Fresh database plus user/post/comment repositories in a private registry.
pub fn fixture() -> Fixture {
    let conn = open_db_in_memory(MIGRATIONS).unwrap();
    let registry = Arc::new(ClassRegistry::new());
    RecordClass::new("UserRecord").register(&registry);
    RecordClass::new("PostRecord").register(&registry);
    RecordClass::new("CommentRecord").register(&registry);

    let users = RepositoryClass::<User>::builder("UserRepository")
        .registry(Arc::clone(&registry))
        .optional_list("posts", None)
        .optional(
            "posts_count",
            OptionalBundle::new().attribute(
                "posts_count",
                AttributeLoader::nested(|context, record| {
                    let count: i64 = context.conn.query_row(
                        "SELECT COUNT(*) FROM posts WHERE user_id = ?1",
                        [record.id()],
                        |row| row.get(0),
                    )?;
                    Ok(json!(count))
                }),
            ),
        )
        .build();
    let posts = RepositoryClass::<Post>::builder("PostRepository")
        .registry(Arc::clone(&registry))
        .optional_model("user", None)
        .optional_list("comments", None)
        .default_order("position")
        .unwrap()
        .build();
    let comments = RepositoryClass::<Comment>::builder("CommentRepository")
        .registry(Arc::clone(&registry))
        .default_order("id")
        .unwrap()
        .build();

    Fixture {
        conn,
        registry,
        users,
        posts,
        comments,
    }
}

pub fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

pub fn insert_user(conn: &Connection, email: &str) -> RecordId {
    conn.execute("INSERT INTO users (email) VALUES (?1)", [email])
        .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_post(conn: &Connection, user_id: RecordId, title: &str, position: Option<i64>) -> RecordId {
    conn.execute(
        "INSERT INTO posts (user_id, title, position) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, title, position],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_comment(conn: &Connection, post_id: RecordId, body: &str) -> RecordId {
    conn.execute(
        "INSERT INTO comments (post_id, body) VALUES (?1, ?2)",
        rusqlite::params![post_id, body],
    )
    .unwrap();
    conn.last_insert_rowid()
}
