//! Cross-chunk speaker clustering
//!
//! Groups speaker embeddings from every chunk into global speaker clusters
//! using agglomerative clustering with average linkage over precomputed
//! cosine distance. Merging is fully deterministic: among minimum-distance
//! pairs the lexicographically smallest cluster-index pair wins, so two runs
//! over the same embeddings always produce the same labelling.

use crate::error::PipelineError;
use ndarray::Array2;

/// Pairwise cosine similarity of the row vectors in `x`.
///
/// Zero-norm rows have similarity 0 to everything (and to themselves).
pub fn cosine_similarity_matrix(x: &Array2<f32>) -> Array2<f32> {
    let n = x.nrows();
    let norms: Vec<f32> = (0..n)
        .map(|i| x.row(i).dot(&x.row(i)).sqrt())
        .collect();

    let mut sim = Array2::<f32>::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let value = if norms[i] == 0.0 || norms[j] == 0.0 {
                0.0
            } else {
                x.row(i).dot(&x.row(j)) / (norms[i] * norms[j])
            };
            sim[(i, j)] = value;
            sim[(j, i)] = value;
        }
    }
    sim
}

/// Cluster embedding rows, merging while the average-linkage cosine distance
/// between the closest pair stays below `1 − similarity_threshold`.
///
/// Returns one label per input row. Labels are numbered by first appearance
/// in input order: the cluster containing row 0 is label 0, the next cluster
/// encountered when scanning rows in order is label 1, and so on.
pub fn cluster_embeddings(
    x: &Array2<f32>,
    similarity_threshold: f32,
) -> Result<Vec<usize>, PipelineError> {
    let n = x.nrows();
    if n == 0 {
        return Ok(vec![]);
    }
    if n == 1 {
        return Ok(vec![0]);
    }

    let distance_threshold = 1.0 - similarity_threshold;
    let sim = cosine_similarity_matrix(x);

    // Working distances between active clusters, updated in place as
    // clusters merge (weighted average keeps this exact for average linkage).
    let mut dist = Array2::<f32>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            dist[(i, j)] = (1.0 - sim[(i, j)]).max(0.0);
        }
    }

    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();

    loop {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..n {
            if members[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if members[j].is_none() {
                    continue;
                }
                let d = dist[(i, j)];
                let closer = match best {
                    None => true,
                    Some((_, _, best_d)) => d < best_d,
                };
                if closer {
                    best = Some((i, j, d));
                }
            }
        }

        let (a, b, d) = match best {
            Some(found) => found,
            None => break,
        };
        if d >= distance_threshold {
            break;
        }

        let merged = members[b].take().expect("cluster b is active");
        let size_b = merged.len() as f32;
        let size_a = members[a].as_ref().expect("cluster a is active").len() as f32;
        members[a].as_mut().unwrap().extend(merged);

        for k in 0..n {
            if k == a || members[k].is_none() {
                continue;
            }
            let updated = (size_a * dist[(a, k)] + size_b * dist[(b, k)]) / (size_a + size_b);
            dist[(a, k)] = updated;
            dist[(k, a)] = updated;
        }
    }

    // Number clusters by their first member in input order.
    let mut cluster_of_row = vec![usize::MAX; n];
    for cluster in members.iter().flatten() {
        let first = *cluster.iter().min().expect("clusters are non-empty");
        for &row in cluster {
            cluster_of_row[row] = first;
        }
    }

    let mut labels = vec![usize::MAX; n];
    let mut next_label = 0usize;
    let mut label_of_first = std::collections::HashMap::new();
    for row in 0..n {
        let first = cluster_of_row[row];
        let label = *label_of_first.entry(first).or_insert_with(|| {
            let assigned = next_label;
            next_label += 1;
            assigned
        });
        labels[row] = label;
    }

    if labels.iter().any(|&l| l == usize::MAX) {
        return Err(PipelineError::ClusteringInvariant {
            message: "a row was left unlabelled".to_string(),
        });
    }
    Ok(labels)
}

/// Global label for a cluster rank: `SPEAKER_A` … `SPEAKER_Z`, then
/// `SPEAKER_AA`, `SPEAKER_AB`, … (bijective base 26).
pub fn speaker_label(rank: usize) -> String {
    let mut n = rank + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    format!("SPEAKER_{}", String::from_utf8(letters).expect("ascii"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn unit(v: [f32; 4]) -> [f32; 4] {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        [v[0] / norm, v[1] / norm, v[2] / norm, v[3] / norm]
    }

    #[test]
    fn near_identical_embeddings_share_one_cluster() {
        let x = arr2(&[
            unit([1.0, 0.0, 0.0, 0.0]),
            unit([0.99, 0.01, 0.0, 0.0]),
        ]);
        let labels = cluster_embeddings(&x, 0.75).unwrap();
        assert_eq!(labels, vec![0, 0]);
    }

    #[test]
    fn orthogonal_embeddings_stay_apart() {
        let x = arr2(&[
            unit([1.0, 0.0, 0.0, 0.0]),
            unit([0.0, 1.0, 0.0, 0.0]),
            unit([0.0, 0.0, 1.0, 0.0]),
        ]);
        let labels = cluster_embeddings(&x, 0.75).unwrap();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn swapped_identities_resolve_across_chunks() {
        // Rows: chunk0/local_00 = A, chunk0/local_01 = B,
        //       chunk1/local_00 = B, chunk1/local_01 = A.
        let a = unit([1.0, 0.1, 0.0, 0.0]);
        let b = unit([0.0, 0.1, 1.0, 0.0]);
        let x = arr2(&[a, b, b, a]);

        let labels = cluster_embeddings(&x, 0.75).unwrap();
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[1], labels[2]);
        assert_ne!(labels[0], labels[1]);
        // First appearance order pins the numbering.
        assert_eq!(labels[0], 0);
        assert_eq!(labels[1], 1);
    }

    #[test]
    fn identical_embeddings_are_degenerate_but_deterministic() {
        let row = unit([0.3, 0.3, 0.3, 0.3]);
        let x = arr2(&[row, row, row, row, row]);

        let first = cluster_embeddings(&x, 0.75).unwrap();
        assert_eq!(first, vec![0, 0, 0, 0, 0]);
        for _ in 0..10 {
            assert_eq!(cluster_embeddings(&x, 0.75).unwrap(), first);
        }
    }

    #[test]
    fn threshold_controls_merging() {
        let x = arr2(&[
            unit([1.0, 0.0, 0.0, 0.0]),
            unit([0.9, 0.4359, 0.0, 0.0]), // cosine ≈ 0.9
        ]);
        assert_eq!(cluster_embeddings(&x, 0.75).unwrap(), vec![0, 0]);
        assert_eq!(cluster_embeddings(&x, 0.95).unwrap(), vec![0, 1]);
    }

    #[test]
    fn zero_norm_rows_never_merge() {
        let x = arr2(&[[0.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]]);
        let labels = cluster_embeddings(&x, 0.75).unwrap();
        assert_eq!(labels, vec![0, 1]);
    }

    #[test]
    fn labels_wrap_past_twenty_six() {
        assert_eq!(speaker_label(0), "SPEAKER_A");
        assert_eq!(speaker_label(1), "SPEAKER_B");
        assert_eq!(speaker_label(25), "SPEAKER_Z");
        assert_eq!(speaker_label(26), "SPEAKER_AA");
        assert_eq!(speaker_label(27), "SPEAKER_AB");
        assert_eq!(speaker_label(51), "SPEAKER_AZ");
        assert_eq!(speaker_label(52), "SPEAKER_BA");
    }
}
