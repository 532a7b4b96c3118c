//! Affinity propagation clustering
//!
//! Exemplar-based clustering by message passing: responsibilities and
//! availabilities are exchanged between points until a stable exemplar set
//! emerges. The number of clusters is not chosen up front; it falls out of
//! the preference (set to the median pairwise similarity) and the data.
//! Heavy damping keeps the iteration from oscillating on small inputs.

/// Damping applied to both message matrices each iteration
pub const DAMPING: f64 = 0.95;

const MAX_ITERATIONS: usize = 200;
const CONVERGENCE_ITERATIONS: usize = 15;

/// Result of one clustering run over `n` points.
///
/// `labels[i]` is the cluster of point `i`; `exemplars[l]` is the index of
/// the point chosen as the exemplar of cluster `l`. Labels are compact and
/// ordered by exemplar index.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub exemplars: Vec<usize>,
}

impl Clustering {
    pub fn cluster_count(&self) -> usize {
        self.exemplars.len()
    }
}

/// Cluster `points` by negative squared Euclidean similarity.
pub fn affinity_propagation(points: &[Vec<f64>]) -> Clustering {
    let n = points.len();
    match n {
        0 => {
            return Clustering {
                labels: Vec::new(),
                exemplars: Vec::new(),
            }
        }
        1 => {
            return Clustering {
                labels: vec![0],
                exemplars: vec![0],
            }
        }
        _ => {}
    }

    let mut s = vec![0.0_f64; n * n];
    let mut off_diagonal = Vec::with_capacity(n * (n - 1));
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let sim = -squared_distance(&points[i], &points[j]);
            s[i * n + j] = sim;
            off_diagonal.push(sim);
        }
    }
    let preference = median(&mut off_diagonal);
    for k in 0..n {
        s[k * n + k] = preference;
    }

    let mut r = vec![0.0_f64; n * n];
    let mut a = vec![0.0_f64; n * n];
    let mut stable_for = 0;
    let mut previous_exemplars: Vec<usize> = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        // Responsibilities: how well suited k is as an exemplar for i,
        // relative to i's next best candidate
        for i in 0..n {
            let mut best = f64::NEG_INFINITY;
            let mut second = f64::NEG_INFINITY;
            let mut best_k = 0;
            for k in 0..n {
                let v = a[i * n + k] + s[i * n + k];
                if v > best {
                    second = best;
                    best = v;
                    best_k = k;
                } else if v > second {
                    second = v;
                }
            }
            for k in 0..n {
                let competitor = if k == best_k { second } else { best };
                let new_r = s[i * n + k] - competitor;
                r[i * n + k] = DAMPING * r[i * n + k] + (1.0 - DAMPING) * new_r;
            }
        }

        // Availabilities: accumulated evidence that k should be an exemplar
        for k in 0..n {
            let mut positive_sum = 0.0;
            for i in 0..n {
                if i != k {
                    positive_sum += r[i * n + k].max(0.0);
                }
            }
            for i in 0..n {
                let new_a = if i == k {
                    positive_sum
                } else {
                    (r[k * n + k] + positive_sum - r[i * n + k].max(0.0)).min(0.0)
                };
                a[i * n + k] = DAMPING * a[i * n + k] + (1.0 - DAMPING) * new_a;
            }
        }

        let exemplars: Vec<usize> = (0..n)
            .filter(|&k| r[k * n + k] + a[k * n + k] > 0.0)
            .collect();
        if !exemplars.is_empty() && exemplars == previous_exemplars {
            stable_for += 1;
            if stable_for >= CONVERGENCE_ITERATIONS {
                break;
            }
        } else {
            stable_for = 0;
            previous_exemplars = exemplars;
        }
    }

    let mut exemplars: Vec<usize> = (0..n)
        .filter(|&k| r[k * n + k] + a[k * n + k] > 0.0)
        .collect();
    if exemplars.is_empty() {
        // Degenerate convergence: fall back to a single cluster around the
        // point most similar to all others
        let best = (0..n)
            .max_by(|&x, &y| {
                let sx: f64 = (0..n).map(|i| s[i * n + x]).sum();
                let sy: f64 = (0..n).map(|i| s[i * n + y]).sum();
                sx.total_cmp(&sy)
            })
            .unwrap_or(0);
        exemplars = vec![best];
    }

    let mut labels = vec![0_usize; n];
    for i in 0..n {
        let mut best_label = 0;
        let mut best_sim = f64::NEG_INFINITY;
        for (label, &k) in exemplars.iter().enumerate() {
            if i == k {
                best_label = label;
                break;
            }
            if s[i * n + k] > best_sim {
                best_sim = s[i * n + k];
                best_label = label;
            }
        }
        labels[i] = best_label;
    }

    Clustering { labels, exemplars }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
