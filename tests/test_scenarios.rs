mod common;

use common::*;
use floodrisk::core::boosting::BoostingParams;
use floodrisk::core::inference::{InferenceEngine, RiskMaps, StaticCovariates};
use floodrisk::core::sampling::{SampleExtractor, SamplingParams};
use floodrisk::core::scenario::{compare_scenarios, run_scenarios, ScenarioConfig, ScenarioDefinition};
use floodrisk::core::trainer::{ModelTrainer, TrainingParams};
use floodrisk::core::validation::evaluate;
use floodrisk::core::FloodModel;
use floodrisk::{FloodError, RasterSource, CLASS_NODATA, PROBABILITY_NODATA};

fn trained_model() -> FloodModel {
    let (samples, _) = SampleExtractor::new(SamplingParams::default())
        .unwrap()
        .extract(&label_stack(""), &static_stack(""), &rain_stack(""))
        .unwrap();
    let params = TrainingParams {
        boosting: BoostingParams {
            n_estimators: 40,
            max_depth: 3,
            learning_rate: 0.2,
            ..BoostingParams::default()
        },
        ..TrainingParams::default()
    };
    ModelTrainer::from_params(&params).unwrap().train(&samples).unwrap()
}

fn two_scenarios() -> ScenarioConfig {
    ScenarioConfig {
        event_index: 1,
        baseline: "base".to_string(),
        scenarios: vec![
            ScenarioDefinition {
                name: "base".to_string(),
                rain_multiplier: 1.0,
            },
            ScenarioDefinition {
                name: "wet".to_string(),
                rain_multiplier: 1.3,
            },
        ],
    }
}

#[test]
fn test_wetter_scenario_never_lowers_risk() {
    init_logging();
    let model = trained_model();
    let statics = StaticCovariates::load(&static_stack(""), -100.0, 3000.0).unwrap();
    assert_eq!(statics.valid_count(), SIZE * SIZE - 1);

    let engine = InferenceEngine::new(&model, TrainingParams::default().feature_set().unwrap(), statics).unwrap();
    let rain = rain_stack("");

    let mut maps: Vec<RiskMaps> = Vec::new();
    let summaries = run_scenarios(&engine, &rain, &two_scenarios(), |_, m| {
        maps.push(m.clone());
        Ok(())
    })
    .unwrap();

    let (base, wet) = (&maps[0], &maps[1]);
    assert_eq!(base.probability[[SIZE - 1, SIZE - 1]], PROBABILITY_NODATA);
    assert_eq!(base.classes[[SIZE - 1, SIZE - 1]], CLASS_NODATA);
    for (b, w) in base.probability.iter().zip(wet.probability.iter()) {
        if *b == PROBABILITY_NODATA {
            assert_eq!(*w, PROBABILITY_NODATA);
        } else {
            assert!((0.0..=1.0).contains(b));
            assert!(w >= b, "scaling rain up lowered a probability: {} -> {}", b, w);
        }
    }

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].change_vs_baseline_percent, 0.0);
    assert!(summaries[1].high_risk_pixels >= summaries[0].high_risk_pixels);
    assert!(summaries[1].change_vs_baseline_percent >= 0.0);
    assert_eq!(summaries[0].valid_pixels, SIZE * SIZE - 1);

    let change = compare_scenarios(base, wet).unwrap();
    assert_eq!(change.compared_pixels, SIZE * SIZE - 1);
    assert!(change.mean_delta >= 0.0);
}

#[test]
fn test_baseline_listed_last_is_still_the_reference() {
    init_logging();
    let model = trained_model();
    let statics = StaticCovariates::load(&static_stack(""), -100.0, 3000.0).unwrap();
    let engine = InferenceEngine::new(&model, TrainingParams::default().feature_set().unwrap(), statics).unwrap();

    let mut config = two_scenarios();
    config.scenarios.reverse();
    assert_eq!(config.scenarios[1].name, "base");

    let mut seen = Vec::new();
    let summaries = run_scenarios(&engine, &rain_stack(""), &config, |scenario, _| {
        seen.push(scenario.name.clone());
        Ok(())
    })
    .unwrap();

    assert_eq!(seen, vec!["base", "wet"]);
    assert_eq!(summaries[0].scenario, "base");
    assert_eq!(summaries[0].change_vs_baseline_percent, 0.0);
    assert!(summaries[1].change_vs_baseline_percent >= 0.0);
}

#[test]
fn test_baseline_validates_against_its_event() {
    init_logging();
    let model = trained_model();
    let statics = StaticCovariates::load(&static_stack(""), -100.0, 3000.0).unwrap();
    let engine = InferenceEngine::new(&model, TrainingParams::default().feature_set().unwrap(), statics).unwrap();

    let maps = engine.predict_event(&rain_stack(""), 1, 1.0).unwrap();
    let truth = label_stack("").read_band(2).unwrap();
    let report = evaluate(&maps.probability, &truth).unwrap();

    // the invalid corner and the unlabelled pixel are excluded
    assert_eq!(report.valid_pixels, SIZE * SIZE - 2);
    assert_eq!(report.flood_pixels, SIZE * 7);
    assert!(report.auc > 0.8, "auc {}", report.auc);
    assert!(report.best_f1.f1 >= report.f1);
    assert_eq!(report.flood_percentiles.len(), 5);
}

#[test]
fn test_engine_rejects_reordered_features() {
    let model = trained_model();
    let statics = StaticCovariates::load(&static_stack(""), -100.0, 3000.0).unwrap();
    let mut names = model.feature_names.clone();
    names.swap(0, 1);
    let reordered = floodrisk::FeatureSet::from_names(names.as_slice()).unwrap();

    assert!(matches!(
        InferenceEngine::new(&model, reordered, statics),
        Err(FloodError::FeatureOrder { .. })
    ));
}

#[test]
fn test_rain_grid_in_another_crs_is_fatal() {
    let model = trained_model();
    let statics = StaticCovariates::load(&static_stack("EPSG:32648"), -100.0, 3000.0).unwrap();
    let engine = InferenceEngine::new(&model, TrainingParams::default().feature_set().unwrap(), statics).unwrap();

    let result = engine.predict_event(&rain_stack("EPSG:4326"), 0, 1.0);
    assert!(matches!(result, Err(FloodError::GridMismatch(_))));
}
