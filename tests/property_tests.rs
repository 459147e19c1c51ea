//! Property-based tests for trueno-sweep
//!
//! - Enumeration count, order and uniqueness
//! - Command template arity
//! - Extraction idempotence
//! - Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;
use std::collections::HashSet;
use trueno_sweep::command::{CommandBuilder, CommandTemplate};
use trueno_sweep::extract::{Extractor, LineFieldExtractor, MetricKind};
use trueno_sweep::space::{ConfigSpace, Configuration, Parameter, Value};

// ============================================================================
// Strategies
// ============================================================================

/// 1..=4 parameters, each with 1..=4 distinct integer candidates
fn arb_space() -> impl Strategy<Value = ConfigSpace> {
    proptest::collection::vec(proptest::collection::btree_set(-50i64..50, 1..=4), 1..=4).prop_map(
        |lists| {
            let params = lists
                .into_iter()
                .enumerate()
                .map(|(i, values)| Parameter::new(format!("p{i}"), values))
                .collect();
            ConfigSpace::new(params).unwrap()
        },
    )
}

/// Output text whose second-to-last line is `label value`
fn arb_output() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec("[a-z ]{0,20}", 0..5),
        "[A-Za-z]{1,10}",
        -1.0e6f64..1.0e6,
    )
        .prop_map(|(noise, label, value)| {
            let mut text = noise.join("\n");
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("{label} {value}\ndone\n"));
            text
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: count equals the product of candidate-list lengths
    #[test]
    fn prop_count_is_product(space in arb_space()) {
        let product: usize = space.params().iter().map(|p| p.values().len()).product();
        prop_assert_eq!(space.len(), product);
        prop_assert_eq!(space.iter().count(), product);
        prop_assert_eq!(space.iter().len(), product);
    }

    /// Property: enumeration is deterministic and lexicographic in
    /// declaration order (last parameter fastest)
    #[test]
    fn prop_order_is_deterministic(space in arb_space()) {
        let first: Vec<Configuration> = space.iter().collect();
        let second: Vec<Configuration> = space.iter().collect();
        prop_assert_eq!(&first, &second);

        let positions = |c: &Configuration| -> Vec<usize> {
            space
                .params()
                .iter()
                .zip(c.values())
                .map(|(p, v)| p.values().iter().position(|x| x == v).unwrap())
                .collect()
        };
        for pair in first.windows(2) {
            prop_assert!(positions(&pair[0]) < positions(&pair[1]));
        }
    }

    /// Property: no two enumerated configurations are identical
    #[test]
    fn prop_configurations_unique(space in arb_space()) {
        let seen: HashSet<Configuration> = space.iter().collect();
        prop_assert_eq!(seen.len(), space.len());
        for config in &seen {
            prop_assert!(space.contains(config));
        }
    }

    /// Property: every configuration builds a non-empty program with one
    /// argument per template entry
    #[test]
    fn prop_template_arity(space in arb_space(), literal in "[a-z-]{1,8}") {
        let mut template = CommandTemplate::new("./simulator").literal(literal);
        for name in space.names() {
            template = template.format(format!("--{name}={{{name}}}"));
        }
        template = template.path("traces", format!("{{{}}}.trace", space.names()[0]));
        prop_assert!(template.validate(&space).is_ok());

        for config in space.iter() {
            let invocation = template.build(&config);
            prop_assert!(!invocation.program().as_os_str().is_empty());
            prop_assert_eq!(invocation.arg_list().len(), template.arity());

            let rendered = invocation.arg_list()[1].to_string_lossy().into_owned();
            prop_assert_eq!(rendered, format!("--p0={}", config.values()[0]));
        }
    }

    /// Property: re-running the extractor on identical text yields identical metrics
    #[test]
    fn prop_extraction_idempotent(output in arb_output()) {
        let extractor = LineFieldExtractor::new(2).field("value", -1, MetricKind::Float);
        let first = extractor.extract(&output);
        let second = extractor.extract(&output);
        prop_assert!(first.is_ok());
        prop_assert_eq!(first, second);
    }

    /// Property: a float field parses back to the printed value
    #[test]
    fn prop_extraction_reads_printed_value(output in arb_output()) {
        let extractor = LineFieldExtractor::new(2).field("value", 1, MetricKind::Float);
        let metrics = extractor.extract(&output).unwrap();
        let line = output.lines().rev().nth(1).unwrap();
        let printed: f64 = line.split_whitespace().nth(1).unwrap().parse().unwrap();
        prop_assert_eq!(metrics.get_f64("value"), Some(printed));
    }

    /// Property: values keep their declared kind
    #[test]
    fn prop_value_from_int(v in any::<i64>()) {
        prop_assert_eq!(Value::from(v), Value::Int(v));
        prop_assert_eq!(Value::from(v).to_string(), v.to_string());
    }
}
