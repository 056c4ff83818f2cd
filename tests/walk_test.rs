//! Traversal contract tests: union iteration over unresolved slots,
//! role-resolved iteration, and termination of deep walks over cyclic
//! document graphs.

use std::sync::Arc;

use role_schema::{
    ArrayField, CombinatorField, DictField, Document, DocumentField, Field, FieldSlot, NotField,
    Payload, StringField, Var, DEFAULT_ROLE,
};

fn string() -> Arc<Field> {
    Arc::new(StringField::new().into())
}

fn assert_same_set(actual: Vec<Arc<Field>>, expected: &[&Arc<Field>]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "expected {} fields, got {}",
        expected.len(),
        actual.len()
    );
    for field in expected {
        assert!(
            actual.iter().any(|a| Arc::ptr_eq(a, field)),
            "an expected field is missing from the iteration"
        );
    }
}

mod array_fields {
    use super::*;

    #[test]
    fn var_items_and_var_additional_items() {
        let (a, b, c, d, e) = (string(), string(), string(), string(), string());
        let field: Field = ArrayField::new()
            .items(
                Var::new()
                    .case("role_1", a.clone())
                    .case("role_2", b.clone())
                    .absent_case("role_none"),
            )
            .additional_items(
                Var::new()
                    .case("role_3", c.clone())
                    .case("role_4", d.clone())
                    .case("role_1", e.clone())
                    .absent_case("role_none"),
            )
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c, &d, &e]);
        assert_same_set(field.resolve_and_iter_fields("role_1").collect(), &[&a, &e]);
        assert_same_set(field.resolve_and_iter_fields("role_3").collect(), &[&c]);
        assert_same_set(field.resolve_and_iter_fields("role_none").collect(), &[]);
    }

    #[test]
    fn tuple_payloads_contribute_every_member() {
        let (a, b, c, d) = (string(), string(), string(), string());
        let field: Field = ArrayField::new()
            .items(
                Var::new()
                    .case("role_1", Payload::Tuple(vec![a.clone(), b.clone()]))
                    .case("role_2", c.clone()),
            )
            .additional_items(d.clone())
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c, &d]);
        assert_same_set(field.resolve_and_iter_fields("role_1").collect(), &[&a, &b, &d]);
    }

    #[test]
    fn positional_items_with_var_member() {
        let (a, b, c) = (string(), string(), string());
        let field: Field = ArrayField::new()
            .positional_items([
                FieldSlot::Var(
                    Var::new()
                        .case("role_1", a.clone())
                        .case("role_2", b.clone())
                        .absent_case("role_none"),
                ),
                FieldSlot::from(c.clone()),
            ])
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c]);
        assert_same_set(field.resolve_and_iter_fields("role_1").collect(), &[&a, &c]);
        assert_same_set(field.resolve_and_iter_fields("role_none").collect(), &[&c]);
    }

    #[test]
    fn plain_slots_resolve_for_any_role() {
        let (a, b) = (string(), string());
        let field: Field = ArrayField::new()
            .items(a.clone())
            .additional_items(b.clone())
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b]);
        assert_same_set(field.resolve_and_iter_fields("some_role").collect(), &[&a, &b]);
    }

    #[test]
    fn empty_array_has_no_fields() {
        let field: Field = ArrayField::new().into();
        assert_same_set(field.iter_fields().collect(), &[]);
    }
}

mod dict_fields {
    use super::*;

    #[test]
    fn var_slots_in_every_position() {
        let (a, b, d, e, f, g) = (string(), string(), string(), string(), string(), string());
        let field: Field = DictField::new()
            .property(
                "a",
                Var::new().case("role_a", a.clone()).absent_case("role_none"),
            )
            .property("b", b.clone())
            .pattern_property(
                "x.*",
                Var::new().case("role_b", d.clone()).absent_case("role_none"),
            )
            .pattern_property("y.*", e.clone())
            .additional_properties(
                Var::new()
                    .case("role_5", f.clone())
                    .case("role_6", g.clone())
                    .absent_case("role_none"),
            )
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &d, &e, &f, &g]);
        assert_same_set(
            field.resolve_and_iter_fields("role_a").collect(),
            &[&a, &b, &e],
        );
        assert_same_set(
            field.resolve_and_iter_fields("role_5").collect(),
            &[&b, &e, &f],
        );
    }

    #[test]
    fn plain_slots_in_every_position() {
        let (a, b, c) = (string(), string(), string());
        let field: Field = DictField::new()
            .property("a", a.clone())
            .pattern_property("b", b.clone())
            .additional_properties(c.clone())
            .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c]);
    }

    #[test]
    fn empty_dict_has_no_fields() {
        let field: Field = DictField::new().into();
        assert_same_set(field.iter_fields().collect(), &[]);
    }
}

mod combinator_fields {
    use super::*;

    #[test]
    fn plain_alternatives() {
        let (a, b) = (string(), string());
        let field: Field = CombinatorField::one_of([a.clone(), b.clone()]).into();
        assert_same_set(field.iter_fields().collect(), &[&a, &b]);
    }

    #[test]
    fn var_over_the_whole_alternatives_list() {
        let (a, b, c) = (string(), string(), string());
        let field: Field = CombinatorField::any_of([FieldSlot::Var(
            Var::new()
                .case("role_1", Payload::Tuple(vec![a.clone(), b.clone()]))
                .case("role_2", c.clone())
                .absent_case("role_3"),
        )])
        .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c]);
        assert_same_set(field.resolve_and_iter_fields("role_1").collect(), &[&a, &b]);
        assert_same_set(field.resolve_and_iter_fields("role_2").collect(), &[&c]);
        assert_same_set(field.resolve_and_iter_fields("role_3").collect(), &[]);
    }
}

mod not_fields {
    use super::*;

    #[test]
    fn plain_operand() {
        let a = string();
        let field: Field = NotField::new(a.clone()).into();
        assert_same_set(field.iter_fields().collect(), &[&a]);
        assert_same_set(field.resolve_and_iter_fields("some_role").collect(), &[&a]);
    }

    #[test]
    fn var_operand() {
        let (a, b) = (string(), string());
        let field: Field = NotField::new(
            Var::new()
                .case("role_1", a.clone())
                .case("role_2", b.clone())
                .absent_case("role_3"),
        )
        .into();

        assert_same_set(field.iter_fields().collect(), &[&a, &b]);
        assert_same_set(field.resolve_and_iter_fields("role_1").collect(), &[&a]);
        assert_same_set(field.resolve_and_iter_fields("role_3").collect(), &[]);
    }
}

mod document_fields {
    use super::*;

    #[test]
    fn reference_yields_target_immediate_fields() {
        let (a, b) = (string(), string());
        let doc = Document::builder("A")
            .module("walk_tests")
            .field("a", a.clone())
            .field("b", b.clone())
            .build()
            .unwrap();

        let field: Field = DocumentField::new(&doc).into();
        assert_same_set(field.iter_fields().collect(), &[&a, &b]);
    }

    #[test]
    fn reference_unions_target_var_branches() {
        let (a, b, c) = (string(), string(), string());
        let doc = Document::builder("B")
            .module("walk_tests")
            .field("field", Var::new().case("a", a.clone()).case("b", b.clone()))
            .field("b", c.clone())
            .build()
            .unwrap();

        let field: Field = DocumentField::new(&doc).into();
        assert_same_set(field.iter_fields().collect(), &[&a, &b, &c]);
    }

    #[test]
    fn reference_to_empty_document_yields_nothing() {
        let doc = Document::builder("C").module("walk_tests").build().unwrap();
        let field: Field = DocumentField::new(&doc).into();
        assert_same_set(field.iter_fields().collect(), &[]);
    }
}

mod document_walks {
    use super::*;

    #[test]
    fn union_over_unresolved_iteration() {
        let (a, b) = (string(), string());
        let doc = Document::builder("Union")
            .module("walk_tests")
            .field("payload", Var::new().case("r1", a.clone()).case("r2", b.clone()))
            .build()
            .unwrap();

        assert_same_set(doc.iter_fields().collect(), &[&a, &b]);
        assert_same_set(doc.resolve_and_iter_fields("r1").collect(), &[&a]);
        assert_same_set(doc.resolve_and_iter_fields("r2").collect(), &[&b]);
    }

    #[test]
    fn composite_flattening_per_role() {
        let (a, b, c) = (string(), string(), string());
        let doc = Document::builder("Flat")
            .module("walk_tests")
            .field("p1", Var::new().case("r1", a.clone()).case("r2", b.clone()))
            .field("p2", c.clone())
            .build()
            .unwrap();

        assert_same_set(doc.resolve_and_iter_fields("r1").collect(), &[&a, &c]);
        assert_same_set(doc.resolve_and_iter_fields("r2").collect(), &[&b, &c]);
    }

    #[test]
    fn walk_does_not_cross_documents_by_default() {
        let inner_leaf = string();
        let inner = Document::builder("Inner")
            .module("walk_tests")
            .field("leaf", inner_leaf.clone())
            .build()
            .unwrap();
        let outer = Document::builder("Outer")
            .module("walk_tests")
            .field("inner", DocumentField::new(&inner))
            .build()
            .unwrap();

        let shallow: Vec<_> = outer.walk(false).collect();
        assert_eq!(shallow.len(), 1);
        assert!(matches!(&*shallow[0], Field::DocumentRef(_)));

        let deep: Vec<_> = outer.walk(true).collect();
        assert_eq!(deep.len(), 2);
        assert!(deep.iter().any(|f| Arc::ptr_eq(f, &inner_leaf)));
    }

    #[test]
    fn deep_walk_terminates_on_self_reference() {
        let value = string();
        let node = Document::builder("SelfWalk")
            .module("walk_tests")
            .field("value", value.clone())
            .field("next", DocumentField::self_reference())
            .build()
            .unwrap();

        // One descent through the self reference, then the visited set
        // stops the expansion: value, next, value, next.
        let fields: Vec<_> = node.walk(true).collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(
            fields.iter().filter(|f| Arc::ptr_eq(f, &value)).count(),
            2
        );
    }

    #[test]
    fn deep_walk_terminates_on_mutual_references() {
        let ping = Document::builder("Ping")
            .module("walk_mutual")
            .field("pong", DocumentField::named("walk_mutual.Pong"))
            .build()
            .unwrap();
        let pong = Document::builder("Pong")
            .module("walk_mutual")
            .field("ping", DocumentField::new(&ping))
            .build()
            .unwrap();

        assert!(ping.walk(true).count() <= 4);
        assert!(pong.walk(true).count() <= 4);
        assert!(ping.is_recursive(DEFAULT_ROLE));
        assert!(pong.is_recursive(DEFAULT_ROLE));
    }

    #[test]
    fn role_gated_recursion() {
        let node = Document::builder("Gated")
            .module("walk_tests")
            .field(
                "next",
                Var::new().case("linked", DocumentField::self_reference()),
            )
            .build()
            .unwrap();

        assert!(node.is_recursive("linked"));
        assert!(!node.is_recursive("flat"));
    }

    #[test]
    fn walks_are_restartable() {
        let doc = Document::builder("Restart")
            .module("walk_tests")
            .field("value", string())
            .field("next", DocumentField::self_reference())
            .build()
            .unwrap();

        let first: Vec<_> = doc.walk(true).collect();
        let second: Vec<_> = doc.walk(true).collect();
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(x, y));
        }
    }
}
