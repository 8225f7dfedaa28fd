//! End to end: scores from the classifier feed a risk specification.

use dbacl_bayesol::{RiskSolver, RiskSpec};
use dbacl_category::{
    CategoryHeader, CategoryItem, CategoryModel, CharParser, Classifier, DigramMatrix,
    FeatureTable, ModelOptions, ScorerConfig,
};
use dbacl_core::{build_token, token_id, HashConfig, TokenHash};

fn unigram_model(name: &str, words: &[(&str, f32)]) -> CategoryModel {
    let mut header = CategoryHeader {
        hash_bits: 6,
        ..CategoryHeader::default()
    };
    header.resolve_defaults();

    let mut table: TokenHash<CategoryItem> = TokenHash::new(HashConfig::fixed(6)).unwrap();
    let mut buf = Vec::new();
    for (word, lam) in words {
        build_token(&[word], 1, &mut buf);
        table.insert(CategoryItem::new(token_id(&buf), *lam)).unwrap();
    }
    CategoryModel::new(name, header, DigramMatrix::filled(0), FeatureTable::Owned(table))
}

const ZERO_ONE: &str = r#"
categories { A, B }
prior { 1, 1 }
loss_matrix {
"" A [ 0, 1 ]
"" B [ 1, 0 ]
}
"#;

fn decide(a: &[(&str, f32)], b: &[(&str, f32)], text: &str) -> String {
    let mut classifier =
        Classifier::new(ModelOptions::new(), CharParser::Default, ScorerConfig::default()).unwrap();
    classifier.add_category(unigram_model("A", a)).unwrap();
    classifier.add_category(unigram_model("B", b)).unwrap();
    classifier.feed(text);

    let mut spec = RiskSpec::parse(ZERO_ONE).unwrap();
    spec.observe_line(&classifier.scores_line()).unwrap();
    let decision = RiskSolver::new(spec.loss_matrix().unwrap()).decide().unwrap();
    spec.name(decision.best).unwrap().to_string()
}

#[test]
fn test_foo_bar_foo_picks_heavier_category() {
    let a = [("foo", 2.0), ("bar", 1.0), ("baz", 0.5)];
    let b = [("foo", 0.5), ("bar", 0.25), ("qux", 3.0)];
    assert_eq!(decide(&a, &b, "foo bar foo"), "A");
    assert_eq!(decide(&b, &a, "foo bar foo"), "B");
}

#[test]
fn test_dominant_category_wins_under_any_prior() {
    // deciding B never costs more than deciding A or C
    for prior in ["1, 2, 3", "3, 1, 2", "2, 3, 1"] {
        let text = format!(
            r#"categories {{ A, B, C }}
            prior {{ {prior} }}
            loss_matrix {{
            "" A [ 5, 1, 6 ]
            "" B [ 4, 0, 4 ]
            "" C [ 7, 2, 3 ]
            }}"#
        );
        let mut spec = RiskSpec::parse(&text).unwrap();
        spec.observe_line("# scores A 3.1 * 12 B 2.9 * 12 C 3.4 * 12").unwrap();
        let solver = RiskSolver::new(spec.loss_matrix().unwrap());
        assert_eq!(solver.decide().unwrap().best, 1, "prior {}", prior);
    }
}

#[test]
fn test_submatch_loss_changes_decision() {
    let text = r#"
    categories { keep, drop }
    prior { 1, 1 }
    loss_matrix {
    "" keep [ 0, 1 ]
    "^Priority: ([0-9]+)" keep [ 0, $1 ]
    "" drop [ 1, 0 ]
    }
    "#;
    let mut spec = RiskSpec::parse(text).unwrap();
    spec.observe_line("# scores keep 2.2 * 10 drop 2.0 * 10").unwrap();
    let plain = RiskSolver::new(spec.loss_matrix().unwrap()).decide().unwrap();
    assert_eq!(spec.name(plain.best), Some("drop"));

    spec.observe_line("Priority: 100000").unwrap();
    let urgent = RiskSolver::new(spec.loss_matrix().unwrap()).decide().unwrap();
    assert_eq!(spec.name(urgent.best), Some("keep"));
}

#[test]
fn test_risk_spec_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("risk.spec");
    std::fs::write(&path, ZERO_ONE).unwrap();
    let spec = RiskSpec::from_file(&path).unwrap();
    assert_eq!(spec.names().collect::<Vec<_>>(), vec!["A", "B"]);
    assert!(RiskSpec::from_file(&dir.path().join("missing")).is_err());
}
