use std::collections::BTreeMap;

use crate::{
    Error, Value,
    db_adapter::DBType,
    template::Document,
};

const PARAMETER_OPEN: &str = "#{";

/// One `#{property, jdbcType=...}` marker of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub jdbc_type: Option<String>,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            jdbc_type: None,
        }
    }

    fn parse(content: &str) -> Result<Self, Error> {
        let mut parts = content.split(',');
        let property = parts.next().unwrap_or_default().trim();
        if property.is_empty() {
            return Err(Error::Builder(format!(
                "parameter marker '#{{{content}}}' names no property"
            )));
        }
        let mut mapping = ParameterMapping::new(property);
        for option in parts {
            match option.split_once('=') {
                Some((name, value)) if name.trim() == "jdbcType" => {
                    mapping.jdbc_type = Some(value.trim().to_string());
                }
                Some(_) => {}
                None => {
                    return Err(Error::Builder(format!(
                        "malformed parameter option '{}' in '#{{{content}}}'",
                        option.trim()
                    )));
                }
            }
        }
        Ok(mapping)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Parameter(ParameterMapping),
}

/// Static SQL of an expanded template with its parameter markers pre-parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSource {
    segments: Vec<Segment>,
}

impl SqlSource {
    pub fn new(sql: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut rest = sql;
        while let Some(start) = rest.find(PARAMETER_OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + PARAMETER_OPEN.len()..];
            let end = after.find('}').ok_or_else(|| {
                Error::Builder(format!("unterminated parameter marker in '{sql}'"))
            })?;
            segments.push(Segment::Parameter(ParameterMapping::parse(&after[..end])?));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Builds the source from a fully expanded template document.
    pub fn from_document(document: &Document, shrink_whitespaces: bool) -> Result<Self, Error> {
        if document.has_includes() {
            return Err(Error::Builder(
                "template still contains unexpanded includes".to_string(),
            ));
        }
        let text = document.text_content(document.root());
        let text = if shrink_whitespaces {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            text.trim().to_string()
        };
        Self::new(&text)
    }

    pub fn parameter_mappings(&self) -> impl Iterator<Item = &ParameterMapping> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Parameter(mapping) => Some(mapping),
            Segment::Literal(_) => None,
        })
    }

    /// Renders the markers with the dialect's placeholder syntax.
    pub fn bound_sql(&self, db_type: &DBType) -> BoundSql {
        let placeholder = db_type.get_encode_placeholder_fn();
        let mut sql = String::new();
        let mut parameter_mappings = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => sql.push_str(text),
                Segment::Parameter(mapping) => {
                    parameter_mappings.push(mapping.clone());
                    placeholder(parameter_mappings.len(), &mut sql);
                }
            }
        }
        BoundSql {
            sql,
            parameter_mappings,
            additional_parameters: BTreeMap::new(),
        }
    }
}

/// Executable SQL text plus the ordered parameter mappings to bind.
///
/// Additional parameters take precedence over the parameter object when a
/// mapping is resolved; pagination uses them for its limit/offset values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    additional_parameters: BTreeMap<String, Value>,
}

impl BoundSql {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
            additional_parameters: BTreeMap::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn sql_mut(&mut self) -> &mut String {
        &mut self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn additional_parameter(&self, name: &str) -> Option<&Value> {
        self.additional_parameters.get(name)
    }

    pub fn has_additional_parameter(&self, name: &str) -> bool {
        self.additional_parameters.contains_key(name)
    }

    /// Appends a mapping whose value comes from the additional parameters.
    pub fn push_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.parameter_mappings.push(ParameterMapping::new(name.clone()));
        self.additional_parameters.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dialect_placeholders_in_order() {
        let source = SqlSource::new("select * from t where a = #{a} and b = #{b, jdbcType=INTEGER}").unwrap();
        let pg = source.bound_sql(&DBType::PostgreSQL);
        assert_eq!(pg.sql(), "select * from t where a = $1 and b = $2");
        assert_eq!(pg.parameter_mappings()[1].jdbc_type.as_deref(), Some("INTEGER"));

        let sqlite = source.bound_sql(&DBType::SQLite);
        assert_eq!(sqlite.sql(), "select * from t where a = ? and b = ?");
    }

    #[test]
    fn rejects_unterminated_and_empty_markers() {
        assert!(matches!(SqlSource::new("a = #{a"), Err(Error::Builder(_))));
        assert!(matches!(SqlSource::new("a = #{ }"), Err(Error::Builder(_))));
    }

    #[test]
    fn shrinks_whitespace_when_asked() {
        let mut doc = Document::new("select");
        let root = doc.root();
        doc.append_text(root, "\n  select *\n    from t  \n");
        let shrunk = SqlSource::from_document(&doc, true).unwrap();
        assert_eq!(shrunk.bound_sql(&DBType::MySQL).sql(), "select * from t");
        let trimmed = SqlSource::from_document(&doc, false).unwrap();
        assert_eq!(trimmed.bound_sql(&DBType::MySQL).sql(), "select *\n    from t");
    }
}
