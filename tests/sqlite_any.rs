#![cfg(all(feature = "any", feature = "sqlite"))]

mod common;

use std::sync::Arc;

use sqlx_template_mapper::{
    Configuration, DefaultSqlSession, Error, StatementKind, StatementTemplate, Value,
    db_adapter::any::AnyDbConnection,
    executor::RowBounds,
    mapper,
    mapping::{KeyGeneration, SqlCommandType},
    session::SqlSession,
    template::{Document, Fragment, Property},
};

#[mapper(namespace = "users")]
pub trait UserMapper: Send + Sync {
    #[insert("insert into users(name, age) values (#{name}, #{age})")]
    #[options(use_generated_keys, key_property = "id")]
    fn insert(&self, user: &mut Value) -> Result<u64, Error>;

    #[select("select id, name, age from users where id = #{id}")]
    fn find(&self, id: i64) -> Result<Option<Value>, Error>;

    #[select("select name from users where age >= #{min} order by id")]
    fn names_from_age(&self, min: i64) -> Result<Vec<String>, Error>;

    #[delete("delete from users where id = #{id}")]
    fn delete(&self, id: i64) -> Result<u64, Error>;
}

fn configuration() -> Arc<Configuration> {
    let configuration = Configuration::new().set_variable("table", "users");
    configuration
        .add_statement_template(
            StatementTemplate::from_sql(
                "ddl",
                "create",
                SqlCommandType::Update,
                "create table ${table}(id integer primary key autoincrement, name text not null, age integer)",
            )
            .set_kind(StatementKind::Plain),
        )
        .unwrap();

    let mut columns = Document::new("sql");
    let root = columns.root();
    columns.append_text(root, "${alias}.id, ${alias}.name");
    configuration
        .add_fragment("users.columns", Fragment::from_document(columns))
        .unwrap();
    let mut all = Document::new("select");
    let root = all.root();
    all.append_text(root, "select ");
    all.append_include(root, "columns", vec![Property::new("alias", "u")]);
    all.append_text(root, " from ${table} u order by u.id");
    configuration
        .add_statement_template(StatementTemplate::new(
            "users",
            "all",
            SqlCommandType::Select,
            all,
        ))
        .unwrap();

    let key = StatementTemplate::from_sql("", "", SqlCommandType::Select, "select max(id) + 100 as id from users");
    configuration
        .add_statement_template(
            StatementTemplate::from_sql(
                "users",
                "insert_with_key",
                SqlCommandType::Insert,
                "insert into users(id, name) values (#{id}, #{name})",
            )
            .set_key_generation(KeyGeneration::Select {
                template: Box::new(key),
                execute_before: true,
            })
            .set_key_properties("id"),
        )
        .unwrap();
    configuration.add_mapper::<dyn UserMapper>().unwrap();
    Arc::new(configuration)
}

fn session() -> Arc<DefaultSqlSession> {
    common::init_tracing();
    let configuration = configuration();
    let connection = AnyDbConnection::connect("sqlite::memory:").unwrap();
    let session = Arc::new(DefaultSqlSession::simple(configuration, Box::new(connection)));
    session.update("ddl.create", &mut Value::Null).unwrap();
    session
}

fn user(name: &str, age: i64) -> Value {
    let mut user = Value::map();
    user.set_path("name", Value::from(name)).unwrap();
    user.set_path("age", Value::Int(age)).unwrap();
    user
}

#[test]
fn mapper_round_trip_against_sqlite() {
    let session = session();
    let users = session.get_mapper::<dyn UserMapper>().unwrap();

    let mut ann = user("ann", 31);
    let mut bob = user("bob", 19);
    assert_eq!(users.insert(&mut ann).unwrap(), 1);
    users.insert(&mut bob).unwrap();
    assert_eq!(ann.get_path("id"), Some(&Value::Int(1)));
    assert_eq!(bob.get_path("id"), Some(&Value::Int(2)));

    let found = users.find(2).unwrap().unwrap();
    assert_eq!(found.get_path("name"), Some(&Value::from("bob")));
    assert_eq!(found.get_path("age"), Some(&Value::Int(19)));
    assert!(users.find(3).unwrap().is_none());

    assert_eq!(users.names_from_age(18).unwrap(), vec!["ann", "bob"]);
    assert_eq!(users.delete(1).unwrap(), 1);
    assert_eq!(users.names_from_age(0).unwrap(), vec!["bob"]);
}

#[test]
fn fragments_row_bounds_and_select_key_against_sqlite() {
    let session = session();
    for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
        session.insert("users.insert", &mut user(name, age)).unwrap();
    }

    let window = session
        .select_list_bounded("users.all", &Value::Null, RowBounds::new(2, 2))
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].get_path("name"), Some(&Value::from("c")));

    let mut keyed = Value::map();
    keyed.set_path("name", Value::from("d")).unwrap();
    session.insert("users.insert_with_key", &mut keyed).unwrap();
    assert_eq!(keyed.get_path("id"), Some(&Value::Int(103)));
    assert_eq!(session.select_list("users.all", &Value::Null).unwrap().len(), 4);
}

#[tokio::test]
async fn blocking_session_runs_off_the_async_runtime() {
    let names = tokio::task::spawn_blocking(|| {
        let session = session();
        let users = session.get_mapper::<dyn UserMapper>()?;
        users.insert(&mut user("eve", 50))?;
        users.names_from_age(0)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(names, vec!["eve"]);
}
