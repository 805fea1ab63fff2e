//! Integration tests for the rsdm library
//!
//! End-to-end runs from bags to cross-validated scores and predictions on
//! synthetic Gaussian data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsdm::api::{crossvalidate, crossvalidate_divs, get_divs, transduct, Sdm};
use rsdm::{Bag, CvParams, DivFunc, FlannOptions, Options, ScoreDirection, SdmError};

/// Standard normal variate by the Box-Muller transform
fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Bag of `n` points from N(center, I) in `dim` dimensions
fn gaussian_bag(rng: &mut StdRng, center: f64, n: usize, dim: usize) -> Bag<f64> {
    let data = (0..n * dim).map(|_| center + normal(rng)).collect();
    Bag::new(data, dim).expect("valid bag")
}

/// Alternating bags from N([0,0], I) (label 0) and N([5,5], I) (label 1)
fn two_gaussians(n_bags: usize, points: usize, seed: u64) -> (Vec<Bag<f64>>, Vec<i32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<i32> = (0..n_bags).map(|i| (i % 2) as i32).collect();
    let bags = labels
        .iter()
        .map(|&l| gaussian_bag(&mut rng, 5.0 * l as f64, points, 2))
        .collect();
    (bags, labels)
}

#[test]
fn test_two_gaussians_classified_accurately() {
    let (bags, labels) = two_gaussians(20, 40, 1);
    let div_func: DivFunc = "renyi:.9".parse().unwrap();
    let cv = CvParams::default().with_folds(5).with_seed(0);

    let report = crossvalidate(&bags, &labels, &cv, div_func, &Options::default())
        .expect("cross-validation should succeed");

    assert!(report.score >= 0.9, "accuracy {}", report.score);
    assert_eq!(report.fold_scores.len(), 5);
    assert_eq!(report.direction, ScoreDirection::HigherIsBetter);
}

#[test]
fn test_divs_shape_and_diagonal() {
    let (bags, _) = two_gaussians(6, 30, 2);
    let funcs = [
        DivFunc::Renyi { alpha: 0.9 },
        DivFunc::Hellinger,
        DivFunc::Bhattacharyya,
        DivFunc::L2,
    ];
    let divs = get_divs(&bags, None, &funcs, &Options::default()).unwrap();
    assert_eq!(divs.shape(), (4, 6, 6));

    for f in 0..funcs.len() {
        for i in 0..6 {
            assert_eq!(divs.get(f, i, i), 0.0);
            for j in 0..6 {
                let v = divs.get(f, i, j);
                assert!(v.is_nan() || v >= 0.0, "{} at ({i},{j}) = {v}", funcs[f]);
            }
        }
    }

    // Bags from different components are further apart than bags from one
    let hellinger = divs.functional(1);
    assert!(hellinger.get(0, 1) > hellinger.get(0, 2));

    let cross = get_divs(&bags[..2], Some(&bags[2..]), &funcs[..1], &Options::default()).unwrap();
    assert_eq!(cross.shape(), (1, 2, 4));
}

#[test]
fn test_bag_and_matrix_entry_points_agree() {
    let (bags, labels) = two_gaussians(12, 30, 3);
    let div_func = DivFunc::Hellinger;
    let options = Options::default();
    let cv = CvParams::default()
        .with_folds(3)
        .with_seed(5)
        .with_project_all(true)
        .with_c_vals(vec![0.25, 4.0, 64.0]);

    let from_bags = crossvalidate(&bags, &labels, &cv, div_func, &options).unwrap();
    let divs = get_divs(&bags, None, &[div_func], &options)
        .unwrap()
        .functional(0);
    let from_divs = crossvalidate_divs(&divs, &labels, &cv, &options).unwrap();

    assert_eq!(from_bags.score, from_divs.score);
    assert_eq!(from_bags.fold_scores, from_divs.fold_scores);
}

#[test]
fn test_seeded_cross_validation_is_deterministic() {
    let (bags, labels) = two_gaussians(12, 25, 4);
    let options = Options::default().with_num_threads(3);
    let divs = get_divs(&bags, None, &[DivFunc::L2], &options)
        .unwrap()
        .functional(0);

    let cv = CvParams::default()
        .with_folds(4)
        .with_seed(9)
        .with_stratified(true)
        .with_c_vals(vec![1.0, 16.0]);
    let single = crossvalidate_divs(&divs, &labels, &cv, &options).unwrap();
    let threaded =
        crossvalidate_divs(&divs, &labels, &cv.clone().with_cv_threads(4), &options).unwrap();
    assert_eq!(single, threaded);
}

#[test]
fn test_regression_on_bag_means() {
    let mut rng = StdRng::seed_from_u64(6);
    let targets: Vec<f64> = (0..16).map(|i| i as f64 * 0.5).collect();
    let bags: Vec<Bag<f64>> = targets
        .iter()
        .map(|&t| gaussian_bag(&mut rng, t, 40, 1))
        .collect();

    let cv = CvParams::default()
        .with_folds(4)
        .with_seed(1)
        .with_c_vals(vec![1.0, 8.0, 64.0]);
    let report = crossvalidate(
        &bags,
        &targets,
        &cv,
        DivFunc::Renyi { alpha: 0.9 },
        &Options::default(),
    )
    .unwrap();

    assert_eq!(report.direction, ScoreDirection::LowerIsBetter);
    // Predicting the mean target everywhere gives about 2.3
    assert!(report.score < 1.5, "rmse {}", report.score);
}

#[test]
fn test_multiclass_train_and_predict() {
    let mut rng = StdRng::seed_from_u64(7);
    let centers = [0.0, 4.0, 8.0];
    let mut bags = Vec::new();
    let mut labels = Vec::new();
    for i in 0..18 {
        let class = i % 3;
        bags.push(gaussian_bag(&mut rng, centers[class], 30, 2));
        labels.push(class as i64);
    }
    let test: Vec<Bag<f64>> = centers
        .iter()
        .map(|&c| gaussian_bag(&mut rng, c, 30, 2))
        .collect();

    let cv = CvParams::default().with_seed(2).with_stratified(true);
    let model = Sdm::train(
        bags.clone(),
        &labels,
        DivFunc::Hellinger,
        &cv,
        &Options::default(),
    )
    .unwrap();
    let predicted: Vec<i64> = test.iter().map(|b| model.predict(b).unwrap()).collect();
    assert_eq!(predicted, vec![0, 1, 2]);

    let values = model.predict_with_values(&test[0]).unwrap();
    assert_eq!(values.decision_values.len(), 3);

    let transduced = transduct(
        &bags,
        &labels,
        &test,
        DivFunc::Hellinger,
        &cv,
        &Options::default(),
    )
    .unwrap();
    assert_eq!(transduced, vec![0, 1, 2]);
}

#[test]
fn test_probability_estimates_through_options() {
    let (bags, labels) = two_gaussians(12, 30, 8);
    let options = Options {
        probability: Some(true),
        ..Default::default()
    };
    let cv = CvParams::default().with_seed(3);
    let model = Sdm::train(bags, &labels, DivFunc::Hellinger, &cv, &options).unwrap();

    let mut rng = StdRng::seed_from_u64(80);
    let prediction = model
        .predict_with_values(&gaussian_bag(&mut rng, 5.0, 30, 2))
        .unwrap();
    let probs = prediction.probabilities.expect("probabilities requested");
    assert_eq!(probs.len(), 2);
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    assert_eq!(prediction.label, 1.0);
}

#[test]
fn test_small_bag_rejected_before_any_work() {
    let (mut bags, labels) = two_gaussians(6, 20, 10);
    bags[3] = Bag::new(vec![1.0, 2.0], 2).unwrap();
    let options = Options::default().with_k(5);

    for algorithm in ["linear", "kdtree"] {
        let flann = FlannOptions {
            algorithm: Some(algorithm.to_string()),
            ..Default::default()
        };
        let err = crossvalidate(
            &bags,
            &labels,
            &CvParams::default().with_folds(3),
            DivFunc::Hellinger,
            &options.clone().with_flann(flann),
        )
        .unwrap_err();
        assert!(
            matches!(
                err,
                SdmError::InsufficientPoints {
                    bag: 3,
                    points: 1,
                    required: 6
                }
            ),
            "{err}"
        );
    }
}

#[test]
fn test_f32_bags_match_f64() {
    let (bags, _) = two_gaussians(4, 25, 11);
    let narrow: Vec<Bag<f32>> = bags
        .iter()
        .map(|b| Bag::new(b.as_slice().iter().map(|&v| v as f32).collect(), 2).unwrap())
        .collect();
    let options = Options::default();
    let wide = get_divs(&bags, None, &[DivFunc::Hellinger], &options).unwrap();
    let single = get_divs(&narrow, None, &[DivFunc::Hellinger], &options).unwrap();
    for i in 0..4 {
        for j in 0..4 {
            assert!((wide.get(0, i, j) - single.get(0, i, j)).abs() < 1e-3);
        }
    }
}
