/// Database type enumeration supporting major database systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DBType {
    /// PostgreSQL database
    PostgreSQL,
    /// MySQL database
    MySQL,
    /// SQLite database
    SQLite,
}
impl DBType {
    /// Creates a DBType instance from database name
    ///
    /// # Arguments
    /// * `db_name` - Database identifier ("PostgreSQL"|"MySQL"|"SQLite")
    ///
    /// # Errors
    /// Returns Error::Protocol for unsupported database types
    pub fn new(db_name: &str) -> Result<Self, sqlx::Error> {
        match db_name {
            "PostgreSQL" => Ok(Self::PostgreSQL),
            "MySQL" => Ok(Self::MySQL),
            "SQLite" => Ok(Self::SQLite),
            _ => Err(sqlx::Error::Protocol(format!("unsupport db `{}`", db_name))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Gets placeholder generation function for parameter binding
    ///
    /// Database-specific placeholder formats:
    /// - PostgreSQL: $1, $2...
    /// - MySQL/SQLite: ?
    pub fn get_encode_placeholder_fn(&self) -> fn(usize, &mut String) {
        match self {
            Self::PostgreSQL => |i: usize, s: &mut String| s.push_str(&format!("${}", i)),
            Self::MySQL | Self::SQLite => |_: usize, s: &mut String| s.push('?'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SqlSource;

    #[test]
    fn unknown_backend_is_a_protocol_error() {
        assert_eq!(DBType::new("SQLite").unwrap(), DBType::SQLite);
        assert!(matches!(DBType::new("Oracle"), Err(sqlx::Error::Protocol(_))));
    }

    #[test]
    fn placeholders_follow_the_backend() {
        let source = SqlSource::new("select * from t where a = #{a} and b = #{b}").unwrap();
        assert_eq!(
            source.bound_sql(&DBType::PostgreSQL).sql(),
            "select * from t where a = $1 and b = $2"
        );
        assert_eq!(
            source.bound_sql(&DBType::MySQL).sql(),
            "select * from t where a = ? and b = ?"
        );
    }

    #[test]
    fn backend_name_round_trips() {
        for db_type in [DBType::PostgreSQL, DBType::MySQL, DBType::SQLite] {
            assert_eq!(DBType::new(db_type.backend_name()).unwrap(), db_type);
        }
    }
}
