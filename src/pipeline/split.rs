// src/pipeline/split.rs

//! Deterministic round-robin partition of work into shards.

/// Partition `items` into exactly `shards` shards: item `i` goes to shard
/// `i % shards`, keeping relative order. A shard count of 0 is treated as 1.
pub fn split<T>(items: Vec<T>, shards: usize) -> Vec<Vec<T>> {
    let shards = shards.max(1);
    let per_shard = items.len().div_ceil(shards);
    let mut out: Vec<Vec<T>> = (0..shards).map(|_| Vec::with_capacity(per_shard)).collect();

    for (i, item) in items.into_iter().enumerate() {
        out[i % shards].push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_exact_partition() {
        let items: Vec<u32> = (0..100).collect();
        let shards = split(items.clone(), 32);

        assert_eq!(shards.len(), 32);
        assert!(shards.iter().all(|s| s.len() == 3 || s.len() == 4));

        let mut all: Vec<u32> = shards.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, items);
    }

    #[test]
    fn test_split_round_robin_reconstructs_input() {
        let items: Vec<u32> = (0..10).collect();
        let shards = split(items.clone(), 3);
        assert_eq!(shards[0], vec![0, 3, 6, 9]);
        assert_eq!(shards[1], vec![1, 4, 7]);
        assert_eq!(shards[2], vec![2, 5, 8]);

        let mut rebuilt = Vec::new();
        for round in 0..4 {
            for shard in &shards {
                if let Some(item) = shard.get(round) {
                    rebuilt.push(*item);
                }
            }
        }
        assert_eq!(rebuilt, items);
    }

    #[test]
    fn test_split_fewer_items_than_shards() {
        let shards = split(vec!["a", "b"], 4);
        assert_eq!(shards.len(), 4);
        assert_eq!(shards[0], vec!["a"]);
        assert_eq!(shards[1], vec!["b"]);
        assert!(shards[2].is_empty());
        assert!(shards[3].is_empty());
    }

    #[test]
    fn test_split_zero_shards() {
        let shards = split(vec![1, 2, 3], 0);
        assert_eq!(shards, vec![vec![1, 2, 3]]);
    }
}
