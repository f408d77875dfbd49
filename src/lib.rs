#![doc = include_str!("../README.md")]

extern crate self as sqlx_template_mapper;

pub use sqlx_template_mapper_macro::mapper;

pub mod binding;
mod config;
pub mod db_adapter;
mod error;
pub mod executor;
pub mod mapping;
pub mod session;
pub mod template;
mod value;
pub use config::*;
pub use error::*;
pub use value::*;

pub use binding::{MapperInterface, MapperRegistry};
pub use db_adapter::{Connection, DBType};
pub use executor::StatementPipeline;
pub use mapping::{StatementKind, StatementTemplate};
pub use session::{DefaultSqlSession, SqlSession};
