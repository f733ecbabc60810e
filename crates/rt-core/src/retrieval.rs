//! Retrieval math shared by reranking, semantic search, clustering and
//! recommendation (spec §4.10). Pure functions over `Vec<f32>` embeddings;
//! grounded on `EmbeddingClusterer`/`RecommendationEngine` in
//! `original_source/Python/core/embedding_clustering.py`, reimplemented by
//! hand since this crate carries no BLAS/ndarray dependency.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f32,
}

/// `semantic_search` / the shared top-k-by-cosine primitive used by
/// reranking's embed+cosine fallback.
pub fn top_k_similar(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<ScoredIndex> {
    let mut scored: Vec<ScoredIndex> = candidates
        .iter()
        .enumerate()
        .map(|(index, emb)| ScoredIndex { index, score: cosine_similarity(query, emb) })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
    Ward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResult {
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    pub centroids: Option<Vec<Vec<f32>>>,
    pub silhouette_score: f32,
}

/// K-Means with a caller-supplied seed for reproducibility (spec §4.10).
pub fn kmeans(embeddings: &[Vec<f32>], n_clusters: usize, max_iterations: usize, seed: u64) -> ClusterResult {
    assert!(n_clusters >= 1 && n_clusters <= embeddings.len());
    let dim = embeddings[0].len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut indices: Vec<usize> = (0..embeddings.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> =
        indices[..n_clusters].iter().map(|&i| embeddings[i].clone()).collect();

    let mut labels = vec![0i32; embeddings.len()];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, emb) in embeddings.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let dist = euclidean_distance(emb, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if labels[i] != best as i32 {
                labels[i] = best as i32;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0f32; dim]; n_clusters];
        let mut counts = vec![0usize; n_clusters];
        for (emb, &label) in embeddings.iter().zip(&labels) {
            let c = label as usize;
            counts[c] += 1;
            for d in 0..dim {
                sums[c][d] += emb[d];
            }
        }
        for c in 0..n_clusters {
            if counts[c] > 0 {
                for d in 0..dim {
                    centroids[c][d] = sums[c][d] / counts[c] as f32;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let silhouette = silhouette_score(embeddings, &labels);
    ClusterResult { labels, n_clusters, centroids: Some(centroids), silhouette_score: silhouette }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// Agglomerative clustering with the four linkage methods the spec names.
/// Distances are cosine (consistent with the rest of the retrieval surface).
pub fn hierarchical(embeddings: &[Vec<f32>], n_clusters: usize, linkage: LinkageMethod) -> ClusterResult {
    let n = embeddings.len();
    assert!(n_clusters >= 1 && n_clusters <= n);

    // Each cluster starts as its own singleton, holding the member indices.
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > n_clusters {
        let mut best = (0usize, 1usize, f32::INFINITY);
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let d = linkage_distance(&clusters[i], &clusters[j], embeddings, linkage);
                if d < best.2 {
                    best = (i, j, d);
                }
            }
        }
        let (i, j, _) = best;
        let merged = {
            let mut m = clusters[i].clone();
            m.extend(clusters[j].iter().copied());
            m
        };
        // Remove the higher index first to keep the lower index valid.
        clusters.remove(j);
        clusters.remove(i);
        clusters.push(merged);
    }

    let mut labels = vec![0i32; n];
    for (label, cluster) in clusters.iter().enumerate() {
        for &idx in cluster {
            labels[idx] = label as i32;
        }
    }

    let silhouette = silhouette_score(embeddings, &labels);
    ClusterResult { labels, n_clusters: clusters.len(), centroids: None, silhouette_score: silhouette }
}

fn linkage_distance(a: &[usize], b: &[usize], embeddings: &[Vec<f32>], linkage: LinkageMethod) -> f32 {
    match linkage {
        LinkageMethod::Single => a
            .iter()
            .flat_map(|&i| b.iter().map(move |&j| (i, j)))
            .map(|(i, j)| cosine_distance(&embeddings[i], &embeddings[j]))
            .fold(f32::INFINITY, f32::min),
        LinkageMethod::Complete => a
            .iter()
            .flat_map(|&i| b.iter().map(move |&j| (i, j)))
            .map(|(i, j)| cosine_distance(&embeddings[i], &embeddings[j]))
            .fold(f32::NEG_INFINITY, f32::max),
        LinkageMethod::Average | LinkageMethod::Ward => {
            let sum: f32 = a
                .iter()
                .flat_map(|&i| b.iter().map(move |&j| (i, j)))
                .map(|(i, j)| cosine_distance(&embeddings[i], &embeddings[j]))
                .sum();
            sum / (a.len() * b.len()) as f32
        }
    }
}

/// DBSCAN on cosine distance; noise points are labeled `-1` (spec §4.10).
pub fn dbscan(embeddings: &[Vec<f32>], eps: f32, min_samples: usize) -> ClusterResult {
    let n = embeddings.len();
    let mut labels = vec![-2i32; n]; // -2 = unvisited
    let mut next_label = 0i32;

    let neighbors = |i: usize| -> Vec<usize> {
        (0..n).filter(|&j| j != i && cosine_distance(&embeddings[i], &embeddings[j]) <= eps).collect()
    };

    for i in 0..n {
        if labels[i] != -2 {
            continue;
        }
        let nbrs = neighbors(i);
        if nbrs.len() < min_samples {
            labels[i] = -1;
            continue;
        }

        labels[i] = next_label;
        let mut seed_set = nbrs;
        let mut idx = 0;
        while idx < seed_set.len() {
            let q = seed_set[idx];
            if labels[q] == -1 {
                labels[q] = next_label;
            }
            if labels[q] == -2 {
                labels[q] = next_label;
                let q_nbrs = neighbors(q);
                if q_nbrs.len() >= min_samples {
                    for nb in q_nbrs {
                        if !seed_set.contains(&nb) {
                            seed_set.push(nb);
                        }
                    }
                }
            }
            idx += 1;
        }
        next_label += 1;
    }

    let n_clusters = next_label as usize;
    let silhouette = if n_clusters >= 2 { silhouette_score(embeddings, &labels) } else { 0.0 };
    ClusterResult { labels, n_clusters, centroids: None, silhouette_score: silhouette }
}

/// Mean silhouette coefficient over cosine distance. Returns 0 when fewer
/// than two clusters exist, per spec §4.10. Noise points (`-1`) are
/// excluded from the mean, matching scikit-learn's convention of only
/// scoring non-noise samples when callers pre-filter them.
fn silhouette_score(embeddings: &[Vec<f32>], labels: &[i32]) -> f32 {
    let distinct: std::collections::HashSet<i32> =
        labels.iter().copied().filter(|&l| l != -1).collect();
    if distinct.len() < 2 {
        return 0.0;
    }

    let n = embeddings.len();
    let mut total = 0.0f32;
    let mut counted = 0usize;

    for i in 0..n {
        if labels[i] == -1 {
            continue;
        }
        let same_cluster: Vec<usize> =
            (0..n).filter(|&j| j != i && labels[j] == labels[i]).collect();
        if same_cluster.is_empty() {
            continue;
        }
        let a = same_cluster.iter().map(|&j| cosine_distance(&embeddings[i], &embeddings[j])).sum::<f32>()
            / same_cluster.len() as f32;

        let b = distinct
            .iter()
            .filter(|&&c| c != labels[i])
            .map(|&c| {
                let members: Vec<usize> = (0..n).filter(|&j| labels[j] == c).collect();
                members.iter().map(|&j| cosine_distance(&embeddings[i], &embeddings[j])).sum::<f32>()
                    / members.len() as f32
            })
            .fold(f32::INFINITY, f32::min);

        let s = if a < b { 1.0 - a / b } else if a > b { b / a - 1.0 } else { 0.0 };
        total += s;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f32
    }
}

/// MMR-style diverse selection (spec §4.10): start with the most relevant
/// candidate from the top `3k` by relevance, then at each step pick the
/// candidate maximizing `(1-λ)·relevance + λ·(1 - max_sim_to_selected)`.
pub fn diverse_recommend(
    query: &[f32],
    items: &[Vec<f32>],
    k: usize,
    diversity_weight: f32,
) -> Vec<ScoredIndex> {
    let candidates = top_k_similar(query, items, k.saturating_mul(3));
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut selected = vec![candidates[0].clone()];
    let mut remaining: Vec<ScoredIndex> = candidates[1..].to_vec();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0usize;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, candidate) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| cosine_similarity(&items[s.index], &items[candidate.index]))
                .fold(f32::NEG_INFINITY, f32::max);
            let diversity = 1.0 - max_sim;
            let score = (1.0 - diversity_weight) * candidate.score + diversity_weight * diversity;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(i: usize, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn top_k_similar_orders_by_score_descending() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]];
        let top = top_k_similar(&query, &candidates, 2);
        assert_eq!(top[0].index, 1);
    }

    #[test]
    fn kmeans_separates_well_separated_clusters() {
        let embeddings = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 9.9],
        ];
        let result = kmeans(&embeddings, 2, 50, 42);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[2], result.labels[3]);
        assert_ne!(result.labels[0], result.labels[2]);
    }

    #[test]
    fn kmeans_same_seed_is_deterministic() {
        let embeddings = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![9.0, 9.0], vec![10.0, 10.0]];
        let a = kmeans(&embeddings, 2, 50, 7);
        let b = kmeans(&embeddings, 2, 50, 7);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn dbscan_labels_isolated_point_as_noise() {
        let embeddings = vec![axis(0, 4), axis(0, 4), axis(1, 4)];
        let result = dbscan(&embeddings, 0.01, 2);
        assert!(result.labels.contains(&-1));
    }

    #[test]
    fn silhouette_is_zero_below_two_clusters() {
        let embeddings = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let labels = vec![0, 0];
        assert_eq!(silhouette_score(&embeddings, &labels), 0.0);
    }

    #[test]
    fn hierarchical_single_linkage_merges_chain() {
        let embeddings = vec![axis(0, 3), axis(0, 3), axis(1, 3), axis(2, 3)];
        let result = hierarchical(&embeddings, 2, LinkageMethod::Single);
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels[0], result.labels[1]);
    }

    #[test]
    fn diverse_recommend_avoids_near_duplicates() {
        let query = vec![1.0, 0.0, 0.0];
        let items = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let picked = diverse_recommend(&query, &items, 2, 0.8);
        let indices: Vec<usize> = picked.iter().map(|s| s.index).collect();
        assert_eq!(indices[0], 0);
        assert!(indices[1] != 1, "should prefer a diverse item over the near-duplicate");
    }
}
