//! Property tests for the universal invariants: bypass mirrors
//! confidence, selector chains stay sorted, decay never raises
//! confidence.

use proptest::prelude::*;

use acquisition::learning::{KnowledgeStore, LearnSource, LearningEngine};
use acquisition::types::{ApiPattern, Confidence, FailureCategory, LearningConfig, Provenance};

fn confidence_strategy() -> impl Strategy<Value = Confidence> {
    prop_oneof![
        Just(Confidence::High),
        Just(Confidence::Medium),
        Just(Confidence::Low),
    ]
}

proptest! {
    #[test]
    fn can_bypass_always_mirrors_confidence(grades in prop::collection::vec(confidence_strategy(), 1..20)) {
        let mut pattern = ApiPattern::new("/api/x", "GET", Provenance::new("prop"));
        for grade in grades {
            pattern.set_confidence(grade);
            prop_assert_eq!(pattern.can_bypass, pattern.confidence == Confidence::High);
        }
    }

    #[test]
    fn selector_chains_stay_priority_sorted(
        ops in prop::collection::vec((0usize..4, prop::bool::ANY), 1..60)
    ) {
        let engine = LearningEngine::new(KnowledgeStore::in_memory());
        let selectors = ["div.a", "div.b", "main", "article.post"];

        for (index, success) in ops {
            let selector = selectors[index];
            if success {
                engine.learn_selector("prop.example", selector, "article", None);
            } else {
                engine.record_selector_failure("prop.example", selector, "article");
            }

            let chain = engine.get_selector_chain("prop.example", "article");
            prop_assert!(chain.windows(2).all(|w| w[0].priority >= w[1].priority));
            for pattern in &chain {
                prop_assert!(pattern.priority <= 100);
            }
        }
    }

    #[test]
    fn decay_is_monotonic_in_elapsed_time(days_a in 0i64..400, extra in 0i64..400) {
        use acquisition::learning::decay::apply_decay;

        let config = LearningConfig::default();
        let now = chrono::Utc::now();

        let mut first = ApiPattern::new("/api/x", "GET", Provenance::new("prop"));
        first.last_verified = now - chrono::Duration::days(days_a);
        apply_decay(&mut first, now, &config);

        let mut second = ApiPattern::new("/api/x", "GET", Provenance::new("prop"));
        second.last_verified = now - chrono::Duration::days(days_a + extra);
        apply_decay(&mut second, now, &config);

        // Longer neglect never yields higher confidence
        prop_assert!(second.confidence <= first.confidence);
    }

    #[test]
    fn repeated_failures_never_raise_confidence(
        failures in 1u32..12,
        category in prop_oneof![
            Just(FailureCategory::AuthRequired),
            Just(FailureCategory::Timeout),
            Just(FailureCategory::ServerError),
        ]
    ) {
        let engine = LearningEngine::new(KnowledgeStore::in_memory());
        engine.learn_api_pattern("prop.example", "/api/y", "GET", LearnSource::new("prop"));

        let mut last = Confidence::High;
        for _ in 0..failures {
            engine.record_api_pattern_failure("prop.example", "/api/y", "GET", category, None);
            let entry = engine.store().entry("prop.example").unwrap();
            let current = entry.api_patterns[0].confidence;
            prop_assert!(current <= last);
            last = current;
        }
    }

    #[test]
    fn numeric_round_trip_is_stable(value in 0.0f64..=1.0) {
        let grade = Confidence::from_numeric(value);
        // Quantizing a grade's own numeric value is the identity
        prop_assert_eq!(Confidence::from_numeric(grade.numeric()), grade);
    }
}
