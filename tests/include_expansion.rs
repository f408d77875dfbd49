mod common;

use std::collections::BTreeMap;

use sqlx_template_mapper::{
    Configuration, DBType, Error, StatementTemplate,
    mapping::{SqlCommandType, StatementRegistry},
    template::{
        Document, Fragment, IncludeExpander, NodeKind, PlaceholderPolicy, Property,
        PropertyParser, Scope,
    },
};

fn text_fragment(text: &str) -> Fragment {
    let mut document = Document::new("sql");
    let root = document.root();
    document.append_text(root, text);
    Fragment::from_document(document)
}

fn rendered_sql(configuration: &Configuration, id: &str) -> String {
    configuration
        .statements()
        .statement(id)
        .unwrap()
        .sql_source()
        .bound_sql(&DBType::SQLite)
        .sql()
        .to_string()
}

#[test]
fn nested_includes_see_outer_variables() {
    common::init_tracing();
    let configuration = Configuration::new();
    configuration
        .add_fragment("ns.b", text_fragment("${x}+${y}"))
        .unwrap();
    let mut a = Document::new("sql");
    let root = a.root();
    a.append_include(root, "b", vec![Property::new("y", "${x}")]);
    configuration
        .add_fragment("ns.a", Fragment::from_document(a))
        .unwrap();

    let mut select = Document::new("select");
    let root = select.root();
    select.append_include(root, "a", vec![Property::new("x", "1")]);
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "chain",
            SqlCommandType::Select,
            select,
        ))
        .unwrap();

    assert_eq!(rendered_sql(&configuration, "ns.chain"), "1+1");
}

fn include_fragment(refid: &str, properties: Vec<Property>) -> Fragment {
    let mut document = Document::new("sql");
    let root = document.root();
    document.append_include(root, refid, properties);
    Fragment::from_document(document)
}

#[test]
fn declared_values_see_only_the_inherited_scope_down_a_chain() {
    let configuration = Configuration::new();
    configuration
        .add_fragment("ns.a", include_fragment("b", vec![Property::new("x", "1")]))
        .unwrap();
    configuration
        .add_fragment("ns.b", include_fragment("c", vec![Property::new("y", "${x}+1")]))
        .unwrap();
    configuration.add_fragment("ns.c", text_fragment("${y}")).unwrap();

    let mut select = Document::new("select");
    let root = select.root();
    select.append_include(root, "a", Vec::new());
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "abc",
            SqlCommandType::Select,
            select,
        ))
        .unwrap();

    assert_eq!(rendered_sql(&configuration, "ns.abc"), "1+1");
}

#[test]
fn declarations_in_one_block_never_see_each_other() {
    let fragments = BTreeMap::from([("ns.f".to_string(), text_fragment("${y}"))]);
    let expander = IncludeExpander::new(&fragments, "ns", Scope::default(), PropertyParser::default());

    let mut document = Document::new("select");
    let root = document.root();
    document.append_include(
        root,
        "f",
        vec![Property::new("x", "1"), Property::new("y", "${x}")],
    );
    expander.apply_includes(&mut document).unwrap();

    assert_eq!(document.text_content(root), "${x}");
}

#[test]
fn duplicate_variable_fails_before_grafting() {
    let fragments = BTreeMap::from([("ns.f".to_string(), text_fragment("${x}"))]);
    let expander = IncludeExpander::new(&fragments, "ns", Scope::default(), PropertyParser::default());

    let mut document = Document::new("select");
    let root = document.root();
    document.append_text(root, "select ");
    document.append_include(
        root,
        "f",
        vec![Property::new("x", "1"), Property::new("x", "2")],
    );

    let err = expander.apply_includes(&mut document).unwrap_err();
    assert!(matches!(err, Error::Builder(_)));
    assert!(err.to_string().contains("Variable x defined twice"));
    assert!(document.has_includes());
    assert_eq!(document.text_content(root), "select ");
}

#[test]
fn sibling_includes_do_not_share_declarations() {
    let fragments = BTreeMap::from([("ns.col".to_string(), text_fragment("${alias}.id"))]);
    let expander = IncludeExpander::new(&fragments, "ns", Scope::default(), PropertyParser::default());

    let mut document = Document::new("select");
    let root = document.root();
    document.append_include(
        root,
        "col",
        vec![Property::new("alias", "a"), Property::new("other", "b")],
    );
    document.append_text(root, ", ");
    document.append_include(root, "col", vec![Property::new("alias", "${other}")]);
    expander.apply_includes(&mut document).unwrap();

    assert_eq!(document.text_content(root), "a.id, ${other}.id");
    assert!(!document.has_includes());
}

#[test]
fn fragment_from_another_document_is_copied() {
    let fragment = text_fragment("${alias}.name");
    let fragment_document = fragment.document().id();
    let fragments = BTreeMap::from([("shared.name".to_string(), fragment.clone())]);
    let expander = IncludeExpander::new(&fragments, "ns", Scope::default(), PropertyParser::default());

    let mut document = Document::new("select");
    let root = document.root();
    document.append_include(root, "shared.name", vec![Property::new("alias", "u")]);
    document.append_text(root, ", ");
    document.append_include(root, "shared.name", vec![Property::new("alias", "o")]);
    expander.apply_includes(&mut document).unwrap();

    assert_ne!(document.id(), fragment_document);
    assert_eq!(document.text_content(root), "u.name, o.name");
    let children = document.children(root);
    assert_eq!(children.len(), 3);
    assert_ne!(children[0], children[2]);
    for &child in children {
        assert_eq!(document.parent(child), Some(root));
    }
    // the fragment itself is never modified
    assert_eq!(
        fragment.document().text_content(fragment.node()),
        "${alias}.name"
    );
    assert!(matches!(
        fragment.document().kind(fragment.node()),
        NodeKind::Element { .. }
    ));
}

#[test]
fn missing_fragment_parks_the_statement_until_it_exists() {
    let configuration = Configuration::new();
    let mut select = Document::new("select");
    let root = select.root();
    select.append_text(root, "select ");
    select.append_include(root, "later", Vec::new());
    select.append_text(root, " from t");
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "late",
            SqlCommandType::Select,
            select,
        ))
        .unwrap();
    assert_eq!(configuration.incomplete_statement_count(), 1);
    assert!(!configuration.statements().has_statement("ns.late"));

    let err = configuration.build_all_statements().unwrap_err();
    match err {
        Error::MultipleErrors(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].is_incomplete());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(configuration.incomplete_statement_count(), 1);

    configuration
        .add_fragment("ns.later", text_fragment("id"))
        .unwrap();
    configuration.build_all_statements().unwrap();
    assert_eq!(configuration.incomplete_statement_count(), 0);
    assert_eq!(rendered_sql(&configuration, "ns.late"), "select id from t");
}

#[test]
fn circular_includes_are_rejected_instead_of_parked() {
    let configuration = Configuration::new();
    configuration
        .add_fragment("ns.outer", include_fragment("inner", Vec::new()))
        .unwrap();
    configuration
        .add_fragment("ns.inner", include_fragment("outer", Vec::new()))
        .unwrap();
    let mut select = Document::new("select");
    let root = select.root();
    select.append_text(root, "select ");
    select.append_include(root, "outer", Vec::new());

    let err = configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "looping",
            SqlCommandType::Select,
            select,
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Builder(_)));
    assert!(err.to_string().contains("Circular include of 'ns.outer'"));
    assert_eq!(configuration.incomplete_statement_count(), 0);
    assert!(!configuration.statements().has_statement("ns.looping"));
}

#[test]
fn parked_statements_build_once_their_fragment_arrives() {
    let configuration = Configuration::new();
    let mut outer = Document::new("sql");
    let root = outer.root();
    outer.append_include(root, "inner", Vec::new());
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "first",
            SqlCommandType::Select,
            outer,
        ))
        .unwrap();
    let mut second = Document::new("select");
    let root = second.root();
    second.append_text(root, "select ");
    second.append_include(root, "inner", Vec::new());
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "second",
            SqlCommandType::Select,
            second,
        ))
        .unwrap();
    assert_eq!(configuration.incomplete_statement_count(), 2);

    configuration
        .add_fragment("ns.inner", text_fragment("1"))
        .unwrap();
    configuration.build_all_statements().unwrap();
    assert_eq!(rendered_sql(&configuration, "ns.first"), "1");
    assert_eq!(rendered_sql(&configuration, "ns.second"), "select 1");
}

#[test]
fn configuration_variables_reach_every_level() {
    let configuration = Configuration::new().set_variable("table", "users");
    configuration
        .add_fragment("ns.from", text_fragment("from ${table}"))
        .unwrap();

    let mut select = Document::new("select");
    let root = select.root();
    select.append_text(root, "select * ");
    select.append_include(root, "from", Vec::new());
    select.append_text(root, " union select * ");
    select.append_include(root, "from", vec![Property::new("table", "archived_${table}")]);
    configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "all",
            SqlCommandType::Select,
            select,
        ))
        .unwrap();

    assert_eq!(
        rendered_sql(&configuration, "ns.all"),
        "select * from users union select * from archived_users"
    );
}

#[test]
fn error_policy_rejects_unresolved_placeholders() {
    let configuration = Configuration::new().set_placeholder_policy(PlaceholderPolicy::Error);
    configuration
        .add_fragment("ns.f", text_fragment("${missing}"))
        .unwrap();
    let mut select = Document::new("select");
    let root = select.root();
    select.append_include(root, "f", vec![Property::new("x", "1")]);

    let err = configuration
        .add_statement_template(StatementTemplate::new(
            "ns",
            "strict",
            SqlCommandType::Select,
            select,
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Builder(_)));
    assert!(err.to_string().contains("${missing}"));
    assert_eq!(configuration.incomplete_statement_count(), 0);
}

#[test]
fn default_values_and_whitespace_shrinking() {
    let configuration = Configuration::new()
        .set_variable("schema", "main")
        .set_default_value_separator(":")
        .set_shrink_whitespaces_in_sql(true);
    configuration
        .add_statement_template(StatementTemplate::from_sql(
            "ns",
            "defaults",
            SqlCommandType::Select,
            "select *\n   from ${schema}.${table:users}\n  where id = #{id}",
        ))
        .unwrap();

    assert_eq!(
        rendered_sql(&configuration, "ns.defaults"),
        "select * from main.users where id = ?"
    );
}
