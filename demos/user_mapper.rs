use std::sync::Arc;

use sqlx_template_mapper::{
    BatchKeyGeneration, Configuration, DefaultSqlSession, Error, StatementKind,
    StatementTemplate, Value,
    db_adapter::any::AnyDbConnection,
    executor::RowBounds,
    mapper,
    mapping::SqlCommandType,
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

    #[select("select name from users where age >= #{min_age} and name like #{pattern}")]
    fn search(&self, min_age: i64, pattern: &str) -> Result<Vec<String>, Error>;

    fn adults(&self) -> Result<Vec<String>, Error> {
        self.search(18, "%")
    }
}

fn user(name: &str, age: i64) -> Result<Value, Error> {
    let mut user = Value::map();
    user.set_path("name", Value::from(name))?;
    user.set_path("age", Value::Int(age))?;
    Ok(user)
}

fn configuration() -> Result<Configuration, Error> {
    let configuration = Configuration::new()
        .set_variable("table", "users")
        .set_batch_key_generation(BatchKeyGeneration::AfterFlush);

    configuration.add_statement_template(
        StatementTemplate::from_sql(
            "ddl",
            "create_users",
            SqlCommandType::Update,
            "create table ${table}(id integer primary key autoincrement, name text, age integer)",
        )
        .set_kind(StatementKind::Plain),
    )?;

    // <sql id="columns">${alias}.id, ${alias}.name</sql>
    let mut columns = Document::new("sql");
    let root = columns.root();
    columns.append_text(root, "${alias}.id, ${alias}.name");
    configuration.add_fragment("users.columns", Fragment::from_document(columns))?;

    let mut list = Document::new("select");
    let root = list.root();
    list.append_text(root, "select ");
    list.append_include(root, "columns", vec![Property::new("alias", "u")]);
    list.append_text(root, " from ${table} u order by u.id");
    configuration.add_statement_template(StatementTemplate::new(
        "users",
        "list",
        SqlCommandType::Select,
        list,
    ))?;

    configuration.add_mapper::<dyn UserMapper>()?;
    Ok(configuration)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let configuration = Arc::new(configuration()?);
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    let connection = AnyDbConnection::connect(&url)?;
    let session = Arc::new(DefaultSqlSession::simple(
        configuration.clone(),
        Box::new(connection),
    ));
    session.update("ddl.create_users", &mut Value::Null)?;

    let users = session.get_mapper::<dyn UserMapper>()?;
    let mut ann = user("ann", 31)?;
    users.insert(&mut ann)?;
    println!("inserted {:?}", ann.get_path("id"));
    users.insert(&mut user("tim", 12)?)?;
    println!("found {:?}", users.find(1)?);
    println!("adults {:?}", users.adults()?);

    let second = session.select_list_bounded("users.list", &Value::Null, RowBounds::new(1, 1))?;
    println!("second row: {:?}", second);

    // batched inserts share one command and get their keys on flush
    let batch = DefaultSqlSession::batch(configuration, Box::new(AnyDbConnection::connect(&url)?));
    batch.update("ddl.create_users", &mut Value::Null)?;
    for (name, age) in [("bea", 40), ("cal", 22)] {
        batch.insert("users.insert", &mut user(name, age)?)?;
    }
    for result in batch.flush_statements()? {
        println!("{} -> {:?}", result.statement_id, result.parameters);
    }
    Ok(())
}
