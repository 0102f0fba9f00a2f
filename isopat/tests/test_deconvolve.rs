use isopat::{
    batch_deconvolve, deconvolve, deconvolve_with_params, labeled_ratio, DeconvolutionEngine,
    DeconvolutionError, DeconvolutionParams, FitConfig, FitStatus, ForwardModel, LabelSpec,
    IsotopicPattern, ParameterError, PatternError, PatternRole,
};

const HD_UNLABELED: [f64; 3] = [100.0, 8.88, 0.37];
const HD_ANALYTE: [f64; 7] = [10.0, 20.0, 40.0, 25.0, 5.0, 0.9, 0.04];

const O18_UNLABELED: [f64; 3] = [100.0, 5.5, 0.3];
const O18_ANALYTE: [f64; 5] = [80.0, 4.4, 20.0, 1.1, 0.06];

fn assert_simplex(fractions: &[f64]) {
    assert!(
        fractions.iter().all(|f| *f >= 0.0),
        "negative fraction in {fractions:?}"
    );
    let total: f64 = fractions.iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "fractions sum to {total}");
}

#[test_log::test]
fn test_hydrogen_deuterium_exchange() {
    let result = deconvolve(&HD_UNLABELED, &HD_ANALYTE, 4, 1).unwrap();
    assert_eq!(result.fractions.len(), 5);
    assert_simplex(&result.fractions);
    assert!(result.is_converged());
    assert!(result.labeled_ratio > 0.5, "{result}");
    assert!(result.r_squared > 0.95, "{result}");
    assert_eq!(result.rows_used, 7);
    assert_eq!(result.rows_dropped, 0);
    assert_eq!(result.rows_padded, 0);
    assert_eq!(result.residuals.len(), 7);
}

#[test_log::test]
fn test_heavy_oxygen_labeling() {
    let result = deconvolve(&O18_UNLABELED, &O18_ANALYTE, 1, 2).unwrap();
    assert_eq!(result.fractions.len(), 2);
    assert_simplex(&result.fractions);
    assert!((result.fractions[1] - 0.2).abs() < 0.01, "{result}");
    assert!(result.r_squared > 0.999, "{result}");
}

#[test_log::test]
fn test_round_trip_recovery() {
    let unlabeled = IsotopicPattern::validate(&HD_UNLABELED).unwrap();
    let model = ForwardModel::build(&unlabeled, LabelSpec::new(4, 1).unwrap());
    let truth = [0.05, 0.15, 0.4, 0.3, 0.1];
    let analyte: Vec<f64> = model.predict(&truth).into_iter().map(|v| v * 37.5).collect();

    let result = deconvolve(&HD_UNLABELED, &analyte, 4, 1).unwrap();
    for (f, t) in result.fractions.iter().zip(truth) {
        assert!((f - t).abs() < 1e-6, "{f} != {t}");
    }
    assert!((result.r_squared - 1.0).abs() < 1e-9);
    assert!(result.residuals.iter().all(|r| r.abs() < 1e-4));
}

#[test_log::test]
fn test_labeled_ratio_identity() {
    let result = deconvolve(&HD_UNLABELED, &HD_ANALYTE, 4, 1).unwrap();
    assert_eq!(result.labeled_ratio, 1.0 - result.fractions[0]);
    assert_eq!(result.labeled_ratio, labeled_ratio(&result.fractions));
}

#[test_log::test]
fn test_zero_labels() {
    let result = deconvolve(&HD_UNLABELED, &[50.0, 4.0, 0.2], 0, 1).unwrap();
    assert_eq!(result.fractions, vec![1.0]);
    assert_eq!(result.labeled_ratio, 0.0);
}

#[test_log::test]
fn test_time_course_batch() {
    let analytes = vec![
        vec![95.0, 10.0, 1.0, 0.1, 0.01, 0.9, 0.04],
        vec![50.0, 30.0, 20.0, 5.0, 1.0, 0.9, 0.04],
        vec![20.0, 30.0, 35.0, 15.0, 5.0, 0.9, 0.04],
    ];
    let results = batch_deconvolve(&HD_UNLABELED, &analytes, 4, 1).unwrap();
    assert_eq!(results.len(), 3);

    for (analyte, result) in analytes.iter().zip(results.iter()) {
        assert_simplex(&result.fractions);
        assert!(result.r_squared > 0.99, "{result}");
        let single = deconvolve(&HD_UNLABELED, analyte, 4, 1).unwrap();
        assert_eq!(&single, result);
    }

    // Labeling increases over the time course
    assert!(results[0].labeled_ratio < results[1].labeled_ratio);
    assert!(results[1].labeled_ratio < results[2].labeled_ratio);
    assert!(results[0].fractions[0] > 0.95);
}

#[test_log::test]
fn test_batch_preserves_order() {
    let unlabeled = IsotopicPattern::validate(&O18_UNLABELED).unwrap();
    let model = ForwardModel::build(&unlabeled, LabelSpec::new(1, 2).unwrap());
    let analytes: Vec<Vec<f64>> = (0..=20)
        .map(|i| {
            let heavy = i as f64 / 20.0;
            model.predict(&[1.0 - heavy, heavy])
        })
        .collect();

    let results = batch_deconvolve(&O18_UNLABELED, &analytes, 1, 2).unwrap();
    for (i, result) in results.iter().enumerate() {
        let heavy = i as f64 / 20.0;
        assert!((result.fractions[1] - heavy).abs() < 1e-6, "{i}: {result}");
    }
}

#[test_log::test]
fn test_batch_error_reports_first_failure() {
    let analytes = vec![
        vec![80.0, 4.4, 20.0],
        vec![80.0, -1.0, 20.0],
        vec![0.0, 0.0],
        vec![80.0, 4.4, 20.0],
    ];
    let err = batch_deconvolve(&O18_UNLABELED, &analytes, 1, 2).unwrap_err();
    assert_eq!(err.batch_index(), Some(1));
    match err {
        DeconvolutionError::BatchItem { index, source } => {
            assert_eq!(index, 1);
            assert_eq!(
                *source,
                DeconvolutionError::InvalidPattern {
                    role: PatternRole::Analyte,
                    source: PatternError::NegativeIntensity {
                        index: 1,
                        value: -1.0
                    }
                }
            );
        }
        other => panic!("Expected a batch item error, got {other}"),
    }

    let engine =
        DeconvolutionEngine::new(&O18_UNLABELED, DeconvolutionParams::new(1, 2)).unwrap();
    let each = engine.deconvolve_each(&analytes);
    assert_eq!(each.iter().filter(|r| r.is_ok()).count(), 2);
}

#[test_log::test]
fn test_invalid_inputs_are_attributed() {
    let err = deconvolve(&[100.0, f64::NAN], &HD_ANALYTE, 1, 1).unwrap_err();
    assert!(matches!(
        err,
        DeconvolutionError::InvalidPattern {
            role: PatternRole::Unlabeled,
            source: PatternError::NonFiniteIntensity { index: 1, .. }
        }
    ));
    assert!(err.to_string().contains("unlabeled"));

    let err = deconvolve(&HD_UNLABELED, &[], 1, 1).unwrap_err();
    assert_eq!(
        err,
        DeconvolutionError::InvalidPattern {
            role: PatternRole::Analyte,
            source: PatternError::Empty
        }
    );

    let err = batch_deconvolve(&HD_UNLABELED, &[HD_ANALYTE], -1, 1).unwrap_err();
    assert_eq!(
        err,
        DeconvolutionError::InvalidParameter(ParameterError::NegativeLabelCount(-1))
    );
}

#[test_log::test]
fn test_truncation_is_reported() {
    let mut analyte = O18_ANALYTE.to_vec();
    analyte.extend([0.01, 0.002]);
    let long = deconvolve(&O18_UNLABELED, &analyte, 1, 2).unwrap();
    assert_eq!(long.rows_used, 5);
    assert_eq!(long.rows_dropped, 2);
    assert_eq!(long.rows_padded, 0);
    assert_eq!(long.rows_fitted(), 5);
    assert_eq!(long.residuals.len(), 5);

    let short = deconvolve(&O18_UNLABELED, &O18_ANALYTE[..3], 1, 2).unwrap();
    assert_eq!(short.rows_used, 3);
    assert_eq!(short.rows_dropped, 0);
    assert_eq!(short.rows_padded, 2);
    assert_eq!(short.rows_fitted(), 5);
    assert_eq!(short.residuals.len(), short.rows_fitted());
    assert_simplex(&short.fractions);
}

#[test_log::test]
fn test_non_convergence_is_flagged() {
    let params = DeconvolutionParams::new(4, 1).with_fit_config(FitConfig {
        max_iterations: 1,
        ..Default::default()
    });
    let result = deconvolve_with_params(&HD_UNLABELED, &HD_ANALYTE, params).unwrap();
    assert_eq!(result.status, FitStatus::IterationLimit);
    assert!(!result.is_converged());
    assert_simplex(&result.fractions);
    assert!(result.to_string().contains("iteration limit reached"));
}
