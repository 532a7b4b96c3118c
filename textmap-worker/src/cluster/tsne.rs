//! t-SNE dimensionality reduction
//!
//! Projects high-dimensional embeddings down to the 2-D plane the map is
//! drawn on. Standard gradient-descent t-SNE: per-point bandwidths found by
//! binary search against the target perplexity, symmetrized affinities with
//! early exaggeration, and a Student-t low-dimensional kernel. Seeded so the
//! same inputs always produce the same layout.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use textmap_common::config::TsneConfig;
use textmap_common::{Error, Result};

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const PERPLEXITY_SEARCH_ITERS: usize = 50;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const P_FLOOR: f64 = 1e-12;

/// Reduce `vectors` to one 2-D coordinate each, in input order.
pub fn reduce(vectors: &[Vec<f64>], cfg: &TsneConfig) -> Result<Vec<[f64; 2]>> {
    let n = vectors.len();
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![[0.0, 0.0]]),
        _ => {}
    }
    let dim = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dim) {
        return Err(Error::InvalidParameters(
            "embedding vectors have mixed dimensions".to_string(),
        ));
    }

    let p = joint_probabilities(vectors, cfg.perplexity);

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let init = Normal::new(0.0, 1e-2).map_err(|e| Error::Internal(e.to_string()))?;
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [init.sample(&mut rng), init.sample(&mut rng)])
        .collect();
    let mut velocity = vec![[0.0_f64; 2]; n];
    let exaggeration_iters = EXAGGERATION_ITERS.min(cfg.iterations / 2);

    for iter in 0..cfg.iterations {
        let exaggeration = if iter < exaggeration_iters {
            EARLY_EXAGGERATION
        } else {
            1.0
        };
        let momentum = if iter < exaggeration_iters {
            INITIAL_MOMENTUM
        } else {
            FINAL_MOMENTUM
        };

        // Student-t kernel over the current layout
        let mut q_num = vec![0.0_f64; n * n];
        let mut q_sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let num = 1.0 / (1.0 + dx * dx + dy * dy);
                q_num[i * n + j] = num;
                q_num[j * n + i] = num;
                q_sum += 2.0 * num;
            }
        }
        let q_sum = q_sum.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut grad = [0.0_f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let num = q_num[i * n + j];
                let q_ij = (num / q_sum).max(P_FLOOR);
                let mult = (exaggeration * p[i * n + j] - q_ij) * num;
                grad[0] += 4.0 * mult * (y[i][0] - y[j][0]);
                grad[1] += 4.0 * mult * (y[i][1] - y[j][1]);
            }
            velocity[i][0] = momentum * velocity[i][0] - cfg.learning_rate * grad[0];
            velocity[i][1] = momentum * velocity[i][1] - cfg.learning_rate * grad[1];
        }
        for i in 0..n {
            y[i][0] += velocity[i][0];
            y[i][1] += velocity[i][1];
        }

        // Keep the layout centered so coordinates stay comparable across runs
        let mean = y.iter().fold([0.0_f64; 2], |m, p| [m[0] + p[0], m[1] + p[1]]);
        let mean = [mean[0] / n as f64, mean[1] / n as f64];
        for point in &mut y {
            point[0] -= mean[0];
            point[1] -= mean[1];
        }
    }

    Ok(y)
}

/// Symmetrized joint probability matrix, row-major `n * n`
fn joint_probabilities(vectors: &[Vec<f64>], perplexity: f64) -> Vec<f64> {
    let n = vectors.len();
    // Perplexity cannot exceed the number of neighbors
    let perplexity = perplexity.min(((n - 1) as f64) / 3.0).max(1.0);
    let target_entropy = perplexity.ln();

    let mut d2 = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_distance(&vectors[i], &vectors[j]);
            d2[i * n + j] = d;
            d2[j * n + i] = d;
        }
    }

    let mut p = vec![0.0_f64; n * n];
    let mut row = vec![0.0_f64; n];
    for i in 0..n {
        // Binary search the Gaussian precision matching the target entropy
        let mut beta = 1.0_f64;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;
        for _ in 0..PERPLEXITY_SEARCH_ITERS {
            let mut sum = 0.0;
            for j in 0..n {
                row[j] = if i == j {
                    0.0
                } else {
                    (-beta * d2[i * n + j]).exp()
                };
                sum += row[j];
            }
            let sum = sum.max(f64::MIN_POSITIVE);
            let mut entropy = 0.0;
            for j in 0..n {
                row[j] /= sum;
                if row[j] > P_FLOOR {
                    entropy -= row[j] * row[j].ln();
                }
            }

            let diff = entropy - target_entropy;
            if diff.abs() < PERPLEXITY_TOLERANCE {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_finite() {
                    (beta + beta_max) / 2.0
                } else {
                    beta * 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_finite() {
                    (beta + beta_min) / 2.0
                } else {
                    beta / 2.0
                };
            }
        }
        for j in 0..n {
            p[i * n + j] = row[j];
        }
    }

    // Symmetrize and normalize to a joint distribution
    let mut joint = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in 0..n {
            joint[i * n + j] = ((p[i * n + j] + p[j * n + i]) / (2.0 * n as f64)).max(P_FLOOR);
        }
    }
    joint
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
