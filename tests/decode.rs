//! End-to-end decoding tests on synthetic meshes with known rotations.

use approx::assert_relative_eq;
use deltarot::algo::decode::{
    build_constraint_system, closest_orthogonal, solve_normal_equations,
};
use deltarot::io;
use deltarot::prelude::*;
use nalgebra::{Matrix3, Vector3};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").with_test_writer().try_init();
}

fn random_vector(rng: &mut StdRng, scale: f64) -> Vector3<f64> {
    Vector3::new(
        scale * (2.0 * rng.random::<f64>() - 1.0),
        scale * (2.0 * rng.random::<f64>() - 1.0),
        scale * (2.0 * rng.random::<f64>() - 1.0),
    )
}

fn random_rotations(n: usize, scale: f64, rng: &mut StdRng) -> Vec<Matrix3<f64>> {
    (0..n)
        .map(|_| vector_to_rotation(&random_vector(rng, scale)))
        .collect()
}

/// Adjacency of a triangulated `n × n` grid (two triangles per quad).
fn grid_adjacency(n: usize) -> Vec<[i64; 3]> {
    let face = |i: usize, j: usize, k: usize| (2 * (j * n + i) + k) as i64;
    let mut rows = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            rows.push([
                face(i, j, 1),
                if j > 0 { face(i, j - 1, 1) } else { -1 },
                if i + 1 < n { face(i + 1, j, 1) } else { -1 },
            ]);
            rows.push([
                face(i, j, 0),
                if j + 1 < n { face(i, j + 1, 0) } else { -1 },
                if i > 0 { face(i - 1, j, 0) } else { -1 },
            ]);
        }
    }
    rows
}

/// Random tree on `n` faces where every face has at most three neighbours.
fn random_tree(n: usize, rng: &mut StdRng) -> Vec<[i64; 3]> {
    let mut rows = vec![[-1i64; 3]; n];
    let mut open: Vec<usize> = vec![0];
    for face in 1..n {
        let pick = rng.random_range(0..open.len());
        let parent = open[pick];

        let slot = rows[parent].iter().position(|&x| x < 0).unwrap();
        rows[parent][slot] = face as i64;
        if rows[parent].iter().all(|&x| x >= 0) {
            open.swap_remove(pick);
        }

        // Leave the back-reference in a random slot
        let back = rng.random_range(0..3);
        rows[face][back] = parent as i64;
        open.push(face);
    }
    rows
}

/// Encode ground-truth absolute rotations as relative rotations plus shape
/// scalars `face + k / 10`.
fn encode(rows: &[[i64; 3]], absolute: &[Matrix3<f64>]) -> Vec<f64> {
    let mut features = vec![0.0; rows.len() * RELATIVE_STRIDE];
    for (f, row) in rows.iter().enumerate() {
        for (slot, &n) in row.iter().enumerate() {
            if n >= 0 {
                let delta = absolute[f].transpose() * absolute[n as usize];
                let base = f * RELATIVE_STRIDE + 3 * slot;
                features[base..base + 3].copy_from_slice(rotation_to_vector(&delta).as_slice());
            }
        }
        for k in 0..6 {
            features[f * RELATIVE_STRIDE + 9 + k] = f as f64 + k as f64 / 10.0;
        }
    }
    features
}

fn assert_recovers(decoded: &AbsoluteEncoding, truth: &[Matrix3<f64>], eps: f64) {
    assert_eq!(decoded.num_faces(), truth.len());
    for (face, expected) in truth.iter().enumerate() {
        let r = vector_to_rotation(&decoded.rotation(face));
        assert_relative_eq!(r, *expected, epsilon = eps);
    }
}

#[test]
fn test_random_tree_exact_recovery() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    let rows = random_tree(300, &mut rng);
    let truth = random_rotations(rows.len(), 1.2, &mut rng);
    let features = encode(&rows, &truth);
    let adjacency = Adjacency::from_signed(&rows);

    // Anchor at the true rotation of face 0 so the whole mesh is recovered
    let options = DecodeOptions::default().with_direction(rotation_to_vector(&truth[0]));
    let decoded = decode_relative_rotation(&features, &adjacency, &options).unwrap();

    assert_recovers(&decoded, &truth, 1e-8);
    assert_eq!(decoded.report().used_edges, rows.len() - 1);
    assert_eq!(decoded.report().reflections_corrected, 0);
    assert!(decoded.report().residual < 1e-8);
}

#[test]
fn test_grid_reencodes_to_input() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(11);
    let rows = grid_adjacency(8);
    let truth = random_rotations(rows.len(), 0.8, &mut rng);
    let features = encode(&rows, &truth);
    let adjacency = Adjacency::from_signed(&rows);

    let decoded =
        decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

    // Consistent input: re-encoding the output reproduces every slot
    let absolute: Vec<Matrix3<f64>> = (0..rows.len())
        .map(|f| vector_to_rotation(&decoded.rotation(f)))
        .collect();
    let reencoded = encode(&rows, &absolute);
    for (a, b) in reencoded.iter().zip(&features) {
        assert!((a - b).abs() < 1e-8, "{a} != {b}");
    }
    for face in 0..rows.len() {
        let base = face * RELATIVE_STRIDE + 9;
        assert_eq!(decoded.shape(face), &features[base..base + 6]);
    }
}

#[test]
fn test_global_rotation_follows_direction() {
    let mut rng = StdRng::seed_from_u64(3);
    let rows = grid_adjacency(4);
    let truth = random_rotations(rows.len(), 0.5, &mut rng);
    let features = encode(&rows, &truth);
    let adjacency = Adjacency::from_signed(&rows);

    let base = decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

    let dir = Vector3::new(0.4, -0.7, 0.2);
    let options = DecodeOptions::default().with_direction(dir);
    let turned = decode_relative_rotation(&features, &adjacency, &options).unwrap();

    let q = vector_to_rotation(&dir);
    for face in 0..rows.len() {
        let expected = q * vector_to_rotation(&base.rotation(face));
        assert_relative_eq!(
            vector_to_rotation(&turned.rotation(face)),
            expected,
            epsilon = 1e-8
        );
    }
}

#[test]
fn test_solvers_and_policies_agree_on_consistent_input() {
    let mut rng = StdRng::seed_from_u64(19);
    let rows = grid_adjacency(6);
    let truth = random_rotations(rows.len(), 0.6, &mut rng);
    let features = encode(&rows, &truth);
    let adjacency = Adjacency::from_signed(&rows);
    let direction = rotation_to_vector(&truth[0]);

    let variants = [
        DecodeOptions::default(),
        DecodeOptions::default().sequential(),
        DecodeOptions::default().with_solver(SolverKind::ConjugateGradient),
        DecodeOptions::default().with_orthogonalization(Orthogonalization::Nearest),
    ];

    for options in variants {
        let decoded =
            decode_relative_rotation(&features, &adjacency, &options.with_direction(direction))
                .unwrap();
        assert_recovers(&decoded, &truth, 1e-6);
        assert_eq!(decoded.report().reflections_kept, 0);
        assert!(decoded.reflected_faces().is_empty());
    }
}

/// Two faces joined by three conflicting near-half-turn edges about x, y and
/// z. Their least-squares average is close to `-I/11`, so the solved block of
/// face 1 has a negative determinant.
fn conflicting_edges() -> (Vec<f64>, Adjacency) {
    let deltas = [
        Vector3::new(3.0, 0.0, 0.0),
        Vector3::new(0.0, 2.9, 0.0),
        Vector3::new(0.0, 0.0, 2.8),
    ];
    let mut features = vec![0.0; 2 * RELATIVE_STRIDE];
    for (slot, d) in deltas.iter().enumerate() {
        features[3 * slot..3 * slot + 3].copy_from_slice(d.as_slice());
        let back = RELATIVE_STRIDE + 3 * slot;
        features[back..back + 3].copy_from_slice((-d).as_slice());
    }
    for k in 0..6 {
        features[9 + k] = k as f64;
        features[RELATIVE_STRIDE + 9 + k] = -(k as f64);
    }
    (features, Adjacency::from_signed(&[[1, 1, 1], [0, 0, 0]]))
}

/// Solved block of `face`, in rotation (not transposed) orientation.
fn solved_block(features: &[f64], adjacency: &Adjacency, face: usize) -> Matrix3<f64> {
    let encoding = RelativeEncoding::new(features).unwrap();
    let system = build_constraint_system(&encoding, adjacency, &Vector3::zeros(), false).unwrap();
    let solution = solve_normal_equations(&system, &DecodeOptions::default()).unwrap();
    solution.blocks.fixed_view::<3, 3>(3 * face, 0).transpose()
}

#[test]
fn test_reflected_solution_is_corrected() {
    init_tracing();
    let (features, adjacency) = conflicting_edges();
    let block = solved_block(&features, &adjacency, 1);
    assert!(block.determinant() < 0.0);

    let decoded =
        decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

    let report = decoded.report();
    assert_eq!(report.used_edges, 3);
    assert_eq!(report.reflections_corrected, 1);
    assert_eq!(report.reflections_kept, 0);
    assert!(decoded.reflected_faces().is_empty());

    let (expected, reflected) = closest_orthogonal(&block, Orthogonalization::Proper).unwrap();
    assert!(reflected);
    let r1 = vector_to_rotation(&decoded.rotation(1));
    assert_relative_eq!(r1, expected, epsilon = 1e-9);
    assert_relative_eq!(r1.determinant(), 1.0, epsilon = 1e-12);
    assert!(decoded.rotation(0).norm() < 1e-9);
    assert_eq!(decoded.shape(1), &features[RELATIVE_STRIDE + 9..2 * RELATIVE_STRIDE]);
}

#[test]
fn test_kept_reflection_is_recoverable() {
    let (features, adjacency) = conflicting_edges();
    let block = solved_block(&features, &adjacency, 1);

    let options = DecodeOptions::default().with_orthogonalization(Orthogonalization::Nearest);
    let decoded = decode_relative_rotation(&features, &adjacency, &options).unwrap();

    assert_eq!(decoded.report().reflections_kept, 1);
    assert_eq!(decoded.report().reflections_corrected, 0);
    assert_eq!(decoded.reflected_faces(), &[1]);

    // The record holds -U·Vᵗ; negating it gives back the kept reflection
    let (kept, reflected) = closest_orthogonal(&block, Orthogonalization::Nearest).unwrap();
    assert!(reflected);
    assert_relative_eq!(kept.determinant(), -1.0, epsilon = 1e-9);
    let recovered = -vector_to_rotation(&decoded.rotation(1));
    assert_relative_eq!(recovered, kept, epsilon = 1e-9);
}

#[test]
fn test_noisy_input_stays_orthogonal() {
    let mut rng = StdRng::seed_from_u64(23);
    let rows = grid_adjacency(6);
    let truth = random_rotations(rows.len(), 0.6, &mut rng);
    let mut features = encode(&rows, &truth);
    for f in 0..rows.len() {
        for k in 0..9 {
            features[f * RELATIVE_STRIDE + k] += 0.05 * (2.0 * rng.random::<f64>() - 1.0);
        }
    }
    let adjacency = Adjacency::from_signed(&rows);

    let decoded =
        decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

    assert!(decoded.report().residual > 0.0);
    for face in 0..rows.len() {
        let v = decoded.rotation(face);
        assert!(v.iter().all(|x| x.is_finite()));
        let r = vector_to_rotation(&v);
        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-9);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_errors_surface_before_output() {
    let features = vec![0.0; 3 * RELATIVE_STRIDE];

    let out_of_range = Adjacency::from_signed(&[[1, -1, -1], [0, 5, -1], [-1, -1, -1]]);
    assert!(matches!(
        decode_relative_rotation(&features, &out_of_range, &DecodeOptions::default()),
        Err(DecodeError::InvalidNeighbour {
            face: 1,
            neighbour: 5,
            ..
        })
    ));

    let disconnected = Adjacency::from_signed(&[[1, -1, -1], [0, -1, -1], [-1, -1, -1]]);
    for solver in [SolverKind::Ldlt, SolverKind::ConjugateGradient] {
        let options = DecodeOptions::default().with_solver(solver);
        assert!(matches!(
            decode_relative_rotation(&features, &disconnected, &options),
            Err(DecodeError::SingularSystem { face: 2, .. })
        ));
    }

    let mut nan = features.clone();
    nan[RELATIVE_STRIDE + 4] = f64::NAN;
    let chain = Adjacency::from_signed(&[[1, -1, -1], [0, 2, -1], [1, -1, -1]]);
    assert!(matches!(
        decode_relative_rotation(&nan, &chain, &DecodeOptions::default()),
        Err(DecodeError::NonFiniteInput { index }) if index == RELATIVE_STRIDE + 4
    ));

    assert!(matches!(
        decode_relative_rotation(&[], &Adjacency::new(Vec::new()), &DecodeOptions::default()),
        Err(DecodeError::EmptyInput)
    ));
}

#[test]
fn test_files_round_trip_through_decode() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let rows = random_tree(40, &mut rng);
    let truth = random_rotations(rows.len(), 1.0, &mut rng);
    let features = encode(&rows, &truth);

    let features_path = dir.path().join("model_rr.txt");
    io::save_features(&features, &features_path).unwrap();
    let adjacency_path = dir.path().join("neigh.txt");
    let text: String = rows
        .iter()
        .map(|r| format!("{} {} {}\n", r[0], r[1], r[2]))
        .collect();
    std::fs::write(&adjacency_path, text).unwrap();

    let loaded = io::load_features(&features_path).unwrap();
    let adjacency = io::load_adjacency(&adjacency_path).unwrap();
    assert_eq!(loaded, features);
    assert_eq!(adjacency, Adjacency::from_signed(&rows));

    let options = DecodeOptions::default().with_layout(OutputLayout::Padded);
    let decoded = decode_relative_rotation(&loaded, &adjacency, &options).unwrap();

    let output_path = dir.path().join("model_ar.json");
    io::save_features(decoded.as_slice(), &output_path).unwrap();
    let reloaded = io::load_features(&output_path).unwrap();
    assert_eq!(reloaded.as_slice(), decoded.as_slice());
    assert_eq!(reloaded.len(), rows.len() * 10);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_tree_decode_is_exact(seed in any::<u64>(), n in 1usize..60, scale in 0.05f64..1.2) {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = random_tree(n, &mut rng);
        let truth = random_rotations(n, scale, &mut rng);
        let features = encode(&rows, &truth);
        let adjacency = Adjacency::from_signed(&rows);

        let options = DecodeOptions::default().with_direction(rotation_to_vector(&truth[0]));
        let decoded = decode_relative_rotation(&features, &adjacency, &options).unwrap();

        for face in 0..n {
            let r = vector_to_rotation(&decoded.rotation(face));
            prop_assert!((r - truth[face]).norm() < 1e-7, "face {} off by {}", face, (r - truth[face]).norm());
            let base = face * RELATIVE_STRIDE + 9;
            prop_assert_eq!(decoded.shape(face), &features[base..base + 6]);
        }
        prop_assert_eq!(decoded.report().used_edges, n - 1);
    }

    #[test]
    fn prop_zero_rotations_decode_to_identity(seed in any::<u64>(), n in 1usize..40) {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = random_tree(n, &mut rng);
        let mut features = vec![0.0; n * RELATIVE_STRIDE];
        for face in 0..n {
            for k in 0..6 {
                features[face * RELATIVE_STRIDE + 9 + k] = 10.0 * (rng.random::<f64>() - 0.5);
            }
        }
        let adjacency = Adjacency::from_signed(&rows);

        let decoded =
            decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

        for face in 0..n {
            prop_assert!(decoded.rotation(face).norm() < 1e-10);
            let base = face * RELATIVE_STRIDE + 9;
            prop_assert_eq!(decoded.shape(face), &features[base..base + 6]);
        }
    }

    #[test]
    fn prop_noisy_grid_is_orthogonal(seed in any::<u64>(), side in 1usize..6, noise in 0.0f64..1.0) {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = grid_adjacency(side);
        let mut features = vec![0.0; rows.len() * RELATIVE_STRIDE];
        for (f, row) in rows.iter().enumerate() {
            for (slot, &n) in row.iter().enumerate() {
                if n >= 0 {
                    let v = random_vector(&mut rng, noise);
                    let base = f * RELATIVE_STRIDE + 3 * slot;
                    features[base..base + 3].copy_from_slice(v.as_slice());
                }
            }
        }
        let adjacency = Adjacency::from_signed(&rows);

        let decoded =
            decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();

        prop_assert!(decoded.reflected_faces().is_empty());
        for face in 0..rows.len() {
            let v = decoded.rotation(face);
            prop_assert!(v.iter().all(|x| x.is_finite()));
            prop_assert!(v.norm() <= std::f64::consts::PI + 1e-9);
        }
    }
}
