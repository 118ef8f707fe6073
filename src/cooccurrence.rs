
// imports
use crate::corpus::TokenSequence;
use crate::error::Result;
use crate::tokenizer::TokenId;

use ndarray::{Array1, Array2, ArrayViewMut1, Zip};
use rayon::{prelude::*, ThreadPoolBuilder};
use tracing::info;


pub const DEFAULT_SEED: u64 = 0xd5cf8af46cd8fc52;

// per-scheme multipliers and constants mixed into the run seed
const NEAR_MULTIPLIER: u64 = 0x649f10d0;
const NEAR_CONSTANT: u64 = 0x4b4e98ae7ee7c3bd;
const ORDERED_MULTIPLIER: u64 = 0xe77fa8d0;
const PAST_MULTIPLIER: u64 = 0x8bfc03b0;
const PAST_CONSTANT: u64 = 0xd86e703f668a6275;
const FUTURE_MULTIPLIER: u64 = 0xdcac3570;
const FUTURE_CONSTANT: u64 = 0x8f48b32bcb6ed716;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountingParams {
    pub latent_dim: usize,
    pub near_radius: usize,
    pub ordered_radius: usize,
    pub past_radius: usize,
    pub future_radius: usize,
    pub hashes_per_word: u64,
    pub pre_hash_rounds: u64,
    pub seed: u64,
}

impl Default for CountingParams {
    fn default() -> Self {
        Self {
            latent_dim: 2048,
            near_radius: 3,
            ordered_radius: 7,
            past_radius: 5,
            future_radius: 5,
            hashes_per_word: 4,
            pre_hash_rounds: 3,
            seed: DEFAULT_SEED,
        }
    }
}


pub fn xorshift64(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^ (x << 17)
}

/// One signed update of the accumulator row: `(bucket, sign)`.
pub type BucketUpdate = (usize, i32);

/// Expands a seed into `hashes_per_word` signed bucket updates, alternating
/// sign starting positive.
pub fn merge_hash(mut hash: u64, params: &CountingParams) -> Vec<BucketUpdate> {

    for i in 0..params.pre_hash_rounds {
        hash = xorshift64(hash ^ i);
    }

    let mut sign = 1;
    (0..params.hashes_per_word).map(|i| {
        hash = xorshift64(hash ^ i);
        let masked = (hash & 0x7fff_ffff) as usize;
        let update = ((masked / 4) % params.latent_dim, sign);
        sign = -sign;
        update
    }).collect()
}


/// Salts derived once per run from the configured seed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashSalts {
    pub seed: u64,
    /// One salt per relative offset of the ordered window, indexed by `offset + radius`.
    pub ordered: Vec<u64>,
}

impl HashSalts {

    pub fn new(initial: u64, ordered_radius: usize) -> Self {
        let mut seed = initial;
        let ordered = (0..2 * ordered_radius + 1).map(|_| {
            seed = xorshift64(seed);
            seed
        }).collect();
        Self { seed, ordered }
    }

    pub fn near_seed(&self) -> u64 {
        self.seed.wrapping_mul(NEAR_MULTIPLIER).wrapping_add(NEAR_CONSTANT)
    }

    pub fn ordered_seed(&self, index: usize) -> u64 {
        self.seed.wrapping_mul(ORDERED_MULTIPLIER).wrapping_add(self.ordered[index])
    }

    pub fn past_seed(&self) -> u64 {
        self.seed.wrapping_mul(PAST_MULTIPLIER).wrapping_add(PAST_CONSTANT)
    }

    pub fn future_seed(&self) -> u64 {
        self.seed.wrapping_mul(FUTURE_MULTIPLIER).wrapping_add(FUTURE_CONSTANT)
    }
}


/// Accumulated signed hash contributions and raw occurrence counts, indexed
/// by token id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollocationCounts {
    pub accumulator: Array2<i32>,
    pub occurrences: Array1<u32>,
}

impl CollocationCounts {

    pub fn zeros(token_classes: usize, latent_dim: usize) -> Self {
        Self {
            accumulator: Array2::zeros((token_classes, latent_dim)),
            occurrences: Array1::zeros(token_classes),
        }
    }

    pub fn token_classes(&self) -> usize {
        self.occurrences.len()
    }

    /// Element-wise sum, the order of merges does not matter. Cells wrap on
    /// overflow like the sequential pass does.
    pub fn merge(mut self, other: &CollocationCounts) -> Self {
        Zip::from(&mut self.accumulator).and(&other.accumulator).for_each(|a, b| *a = a.wrapping_add(*b));
        Zip::from(&mut self.occurrences).and(&other.occurrences).for_each(|a, b| *a = a.wrapping_add(*b));
        self
    }
}


pub struct CollocationCounter {
    params: CountingParams,
    near: Vec<BucketUpdate>,
    ordered: Vec<Vec<BucketUpdate>>,
    past: Vec<BucketUpdate>,
    future: Vec<BucketUpdate>,
    progress_interval: usize,
}

impl CollocationCounter {

    pub fn new(params: CountingParams) -> Self {

        // none of the scheme seeds depend on the neighbour itself, so every
        // contribution is fixed per scheme (and per offset for the ordered
        // window) and can be expanded once up front.
        let salts = HashSalts::new(params.seed, params.ordered_radius);
        let ordered = (0..salts.ordered.len()).map(|k| merge_hash(salts.ordered_seed(k), &params)).collect();

        Self {
            near: merge_hash(salts.near_seed(), &params),
            ordered,
            past: merge_hash(salts.past_seed(), &params),
            future: merge_hash(salts.future_seed(), &params),
            params,
            progress_interval: 4096,
        }
    }

    pub fn with_progress_interval(mut self, progress_interval: usize) -> Self {
        self.progress_interval = progress_interval.max(1);
        self
    }

    pub fn params(&self) -> &CountingParams {
        &self.params
    }

    // cells of very frequent tokens may pass i32::MAX, they wrap around
    fn apply(row: &mut ArrayViewMut1<i32>, updates: &[BucketUpdate], times: usize) {
        let times = times as i32;
        for (bucket, sign) in updates {
            row[*bucket] = row[*bucket].wrapping_add(sign.wrapping_mul(times));
        }
    }

    /// Adds the contributions of one sequence to `counts`.
    pub fn count_sequence(&self, sequence: &[TokenId], counts: &mut CollocationCounts) {

        let p = &self.params;
        let n = sequence.len();

        for (z, token) in sequence.iter().enumerate() {

            let t = *token as usize;
            counts.occurrences[t] = counts.occurrences[t].wrapping_add(1);
            let mut row = counts.accumulator.row_mut(t);

            // unordered near window, self excluded
            let lo = z.saturating_sub(p.near_radius);
            let hi = (z + p.near_radius).min(n - 1);
            CollocationCounter::apply(&mut row, &self.near, hi - lo);

            // ordered window, one salt per relative offset
            let lo = z.saturating_sub(p.ordered_radius);
            let hi = (z + p.ordered_radius).min(n - 1);
            for neighbour in (lo..=hi).filter(|j| *j != z) {
                let index = neighbour + p.ordered_radius - z;
                CollocationCounter::apply(&mut row, &self.ordered[index], 1);
            }

            // past and future only windows
            let past = z - z.saturating_sub(p.past_radius);
            CollocationCounter::apply(&mut row, &self.past, past);
            let future = (z + p.future_radius).min(n - 1) - z;
            CollocationCounter::apply(&mut row, &self.future, future);
        }
    }

    /// Single sequential pass over all sequences.
    pub fn count(&self, sequences: &[TokenSequence], token_classes: usize) -> CollocationCounts {

        let mut counts = CollocationCounts::zeros(token_classes, self.params.latent_dim);
        let interval = self.progress_interval;
        for (i, sequence) in sequences.iter().enumerate() {
            self.count_sequence(sequence, &mut counts);
            if i % interval == interval - 1 {
                info!("counted {} out of {} dataset samples", i + 1, sequences.len());
            }
        }
        counts
    }

    /// Counts contiguous chunks into private accumulators on a pool of
    /// `num_threads` threads and merges them. Equal to `count` on the whole input.
    pub fn count_parallel(&self, sequences: &[TokenSequence], token_classes: usize, num_threads: usize) -> Result<CollocationCounts> {

        if num_threads <= 1 || sequences.len() < 2 {
            return Ok(self.count(sequences, token_classes));
        }

        let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("collocation counter #{}", i))
        .build()?;

        // one chunk per thread, so one private accumulator per thread
        let chunk_len = (sequences.len() + num_threads - 1) / num_threads;
        let counts = pool.install(|| {
            sequences
            .par_chunks(chunk_len)
            .map(|chunk| self.count(chunk, token_classes))
            .reduce_with(|a, b| a.merge(&b))
        });

        Ok(counts.unwrap_or_else(|| CollocationCounts::zeros(token_classes, self.params.latent_dim)))
    }
}


#[cfg(test)]
mod tests {

    use ndarray::{Array1, Array2};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use super::{merge_hash, xorshift64, CollocationCounter, CollocationCounts, CountingParams, HashSalts, DEFAULT_SEED};
    use crate::corpus::TokenSequence;

    fn random_corpus(seed: u64, classes: u16, n: usize) -> Vec<TokenSequence> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| {
            let len = rng.gen_range(1..40);
            (0..len).map(|_| rng.gen_range(0..classes)).collect::<Vec<u16>>().into_boxed_slice()
        }).collect()
    }

    // reference: one merge_hash call per neighbour, exactly as the windows are described
    fn count_naive(sequences: &[TokenSequence], classes: usize, p: &CountingParams) -> CollocationCounts {

        let salts = HashSalts::new(p.seed, p.ordered_radius);
        let mut counts = CollocationCounts::zeros(classes, p.latent_dim);
        let mut add = |t: usize, seed: u64| {
            for (bucket, sign) in merge_hash(seed, p) {
                counts.accumulator[[t, bucket]] += sign;
            }
        };

        let mut occurrences = vec![0u32; classes];
        for seq in sequences {
            let n = seq.len() as i64;
            for z in 0..n {
                let t = seq[z as usize] as usize;
                occurrences[t] += 1;
                let r = p.near_radius as i64;
                for j in (z - r).max(0)..=(z + r).min(n - 1) {
                    if j != z { add(t, salts.near_seed()) }
                }
                let r = p.ordered_radius as i64;
                for j in (z - r).max(0)..=(z + r).min(n - 1) {
                    if j != z { add(t, salts.ordered_seed((j - z + r) as usize)) }
                }
                for _j in (z - p.past_radius as i64).max(0)..z {
                    add(t, salts.past_seed());
                }
                for _j in z + 1..=(z + p.future_radius as i64).min(n - 1) {
                    add(t, salts.future_seed());
                }
            }
        }
        for (t, c) in occurrences.into_iter().enumerate() {
            counts.occurrences[t] = c;
        }
        counts
    }

    #[test]
    fn xorshift_golden() {
        assert_eq!(xorshift64(1), 0x40822041);
        assert_eq!(xorshift64(0), 0);
    }

    #[test]
    fn merge_hash_shape() {

        let p = CountingParams::default();
        let updates = merge_hash(DEFAULT_SEED, &p);
        assert_eq!(updates.len(), 4);
        assert_eq!(updates.iter().map(|u| u.1).collect::<Vec<i32>>(), vec![1, -1, 1, -1]);
        assert!(updates.iter().all(|u| u.0 < p.latent_dim));

        // seeds one apart land on unrelated buckets
        assert_ne!(merge_hash(1, &p), merge_hash(2, &p));
    }

    #[test]
    fn salts_follow_xorshift_chain() {

        let salts = HashSalts::new(DEFAULT_SEED, 7);
        assert_eq!(salts.ordered.len(), 15);
        assert_eq!(salts.ordered[0], xorshift64(DEFAULT_SEED));
        assert_eq!(salts.ordered[1], xorshift64(salts.ordered[0]));
        assert_eq!(salts.seed, salts.ordered[14]);
    }

    #[test]
    fn single_token_only_counts_occurrence() {

        let counter = CollocationCounter::new(CountingParams::default());
        let seqs: Vec<TokenSequence> = vec![vec![3u16].into_boxed_slice(), vec![3u16].into_boxed_slice()];
        let counts = counter.count(&seqs, 5);
        assert_eq!(counts.occurrences.to_vec(), vec![0, 0, 0, 2, 0]);
        assert!(counts.accumulator.iter().all(|v| *v == 0));
    }

    #[test]
    fn pair_contributions() {

        // two tokens: each sees one neighbour in the near and ordered windows,
        // token 0 one future neighbour, token 1 one past neighbour
        let p = CountingParams::default();
        let salts = HashSalts::new(p.seed, p.ordered_radius);
        let counter = CollocationCounter::new(p);
        let counts = counter.count(&[vec![0u16, 1].into_boxed_slice()], 2);

        let mut expected: Array2<i32> = Array2::zeros((2, p.latent_dim));
        for (t, seeds) in [
            (0, [salts.near_seed(), salts.ordered_seed(8), salts.future_seed()]),
            (1, [salts.near_seed(), salts.ordered_seed(6), salts.past_seed()])
        ] {
            for seed in seeds {
                for (bucket, sign) in merge_hash(seed, &p) {
                    expected[[t, bucket]] += sign;
                }
            }
        }
        assert_eq!(counts.accumulator, expected);
        assert_eq!(counts.occurrences.to_vec(), vec![1, 1]);
    }

    #[test]
    fn matches_per_neighbour_hashing() {

        let p = CountingParams::default();
        let corpus = random_corpus(3, 12, 60);
        let counter = CollocationCounter::new(p);
        assert_eq!(counter.count(&corpus, 12), count_naive(&corpus, 12, &p));

        let small = CountingParams { latent_dim: 16, near_radius: 1, ordered_radius: 2, past_radius: 3, future_radius: 1, ..p };
        let counter = CollocationCounter::new(small);
        assert_eq!(counter.count(&corpus, 12), count_naive(&corpus, 12, &small));
    }

    #[test]
    fn counting_is_deterministic() {

        let corpus = random_corpus(5, 20, 100);
        let a = CollocationCounter::new(CountingParams::default()).count(&corpus, 20);
        let b = CollocationCounter::new(CountingParams::default()).count(&corpus, 20);
        assert_eq!(a, b);

        let other_seed = CountingParams { seed: 42, ..CountingParams::default() };
        let c = CollocationCounter::new(other_seed).count(&corpus, 20);
        assert_ne!(a.accumulator, c.accumulator);
        assert_eq!(a.occurrences, c.occurrences);
    }

    #[test]
    fn partitions_merge_to_whole() {

        let corpus = random_corpus(11, 30, 200);
        let counter = CollocationCounter::new(CountingParams::default()).with_progress_interval(16);
        let whole = counter.count(&corpus, 30);

        let (left, right) = corpus.split_at(77);
        let merged = counter.count(right, 30).merge(&counter.count(left, 30));
        assert_eq!(merged, whole);

        assert_eq!(counter.count_parallel(&corpus, 30, 4).unwrap(), whole);
        assert_eq!(counter.count_parallel(&corpus, 30, 3).unwrap(), whole);
        assert_eq!(counter.count_parallel(&corpus, 30, 1).unwrap(), whole);
        assert_eq!(counter.count_parallel(&[], 30, 4).unwrap(), CollocationCounts::zeros(30, 2048));
    }

    #[test]
    fn saturated_cells_wrap_around() {

        let mut row: Array1<i32> = Array1::from(vec![i32::MAX, i32::MIN, 0]);
        CollocationCounter::apply(&mut row.view_mut(), &[(0, 1), (1, -1), (2, 1)], 2);
        assert_eq!(row.to_vec(), vec![i32::MIN + 1, i32::MAX - 1, 2]);

        let mut a = CollocationCounts::zeros(2, 2);
        a.accumulator[[0, 1]] = i32::MAX;
        a.occurrences[1] = u32::MAX;
        let mut b = CollocationCounts::zeros(2, 2);
        b.accumulator[[0, 1]] = 1;
        b.occurrences[1] = 1;

        let merged = a.merge(&b);
        assert_eq!(merged.accumulator[[0, 1]], i32::MIN);
        assert_eq!(merged.occurrences[1], 0);
    }

}
