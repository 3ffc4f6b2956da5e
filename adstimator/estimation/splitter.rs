use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    dataset::Dataset,
    error::{EstimationError, Result},
};

/// Relative guard for `ceil(ratio * n)` against products like `0.1 * 30 = 3.0000000000000004`.
const SIZE_EPSILON: f64 = 1e-9;

/// Splits a dataset into two disjoint sets by moving randomly chosen records out of the original.
///
/// The split set holds `ceil(ratio * n)` records and the remaining set the rest. The partition is
/// computed lazily on first access and reused afterwards.
#[derive(Debug)]
pub struct DataSplitter<'a, R = SmallRng> {
    original: &'a Dataset,
    ratio: f64,
    rng: R,
    partition: Option<(Dataset, Dataset)>,
}

impl<'a> DataSplitter<'a, SmallRng> {
    /// Splitter drawing from an entropy-seeded source.
    pub fn new(original: &'a Dataset, ratio: f64) -> Result<Self> {
        Self::with_rng(original, ratio, SmallRng::from_entropy())
    }

    /// Splitter with a reproducible source.
    pub fn seeded(original: &'a Dataset, ratio: f64, seed: u64) -> Result<Self> {
        Self::with_rng(original, ratio, SmallRng::seed_from_u64(seed))
    }
}

impl<'a, R: Rng> DataSplitter<'a, R> {
    /// Splitter drawing from `rng`. `ratio` must lie within `[0, 1]`.
    pub fn with_rng(original: &'a Dataset, ratio: f64, rng: R) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(EstimationError::InvalidArgument(format!(
                "ratio must be a value between 0 and 1, got {ratio}"
            )));
        }
        Ok(Self {
            original,
            ratio,
            rng,
            partition: None,
        })
    }

    /// Number of records the split set receives.
    #[must_use]
    pub fn split_size(&self) -> usize {
        split_size(self.original.len(), self.ratio)
    }

    /// Randomly selected records.
    pub fn split(&mut self) -> &Dataset {
        &self.partition().0
    }

    /// Records not selected into the split set.
    pub fn remaining(&mut self) -> &Dataset {
        &self.partition().1
    }

    /// Consumes the splitter, returning `(split, remaining)`.
    pub fn into_parts(mut self) -> (Dataset, Dataset) {
        match self.partition.take() {
            Some(parts) => parts,
            None => draw(self.original, self.ratio, &mut self.rng),
        }
    }

    fn partition(&mut self) -> &(Dataset, Dataset) {
        let (original, ratio, rng) = (self.original, self.ratio, &mut self.rng);
        self.partition
            .get_or_insert_with(|| draw(original, ratio, rng))
    }
}

/// Sampling without replacement by index: each draw removes one record from the remaining range.
fn draw<R: Rng>(original: &Dataset, ratio: f64, rng: &mut R) -> (Dataset, Dataset) {
    let size = split_size(original.len(), ratio);
    let mut remaining = original.records().to_vec();
    let mut split = Vec::with_capacity(size);
    for _ in 0..size {
        let index = rng.gen_range(0..remaining.len());
        split.push(remaining.remove(index));
    }
    (original.with_records(split), original.with_records(remaining))
}

/// `ceil(ratio * total)`, clamped to `total`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn split_size(total: usize, ratio: f64) -> usize {
    let product = ratio * total as f64;
    let size = (product * (1.0 - SIZE_EPSILON)).ceil().max(0.0) as usize;
    size.min(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::campaign_schema;
    use crate::schema::BODY;

    fn numbered(count: usize) -> Dataset {
        let mut dataset = Dataset::new("numbered", campaign_schema(&["a"], &["x"]), Vec::new())
            .unwrap();
        for clicks in 0..count {
            let clicks = clicks.to_string();
            dataset
                .push_text_row(&["F", "18", "23", "a", "x", &clicks, "1000"])
                .unwrap();
        }
        dataset
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn clicks_of(dataset: &Dataset) -> Vec<u64> {
        dataset
            .rows()
            .map(|row| row.numeric("Clicks Count").unwrap() as u64)
            .collect()
    }

    #[test]
    fn rejects_ratio_outside_unit_interval() {
        let data = numbered(3);
        assert!(matches!(
            DataSplitter::new(&data, 1.5).unwrap_err(),
            EstimationError::InvalidArgument(_)
        ));
        assert!(DataSplitter::new(&data, -0.1).is_err());
    }

    #[test]
    fn split_sizes_follow_ceiling() {
        assert_eq!(split_size(30, 0.1), 3);
        assert_eq!(split_size(31, 0.1), 4);
        assert_eq!(split_size(10, 0.0), 0);
        assert_eq!(split_size(10, 1.0), 10);
        assert_eq!(split_size(0, 0.5), 0);
        assert_eq!(split_size(7, 0.5), 4);
        assert_eq!(split_size(5, 1e-10), 1);
        assert_eq!(split_size(1_000_000, 1e-12), 1);
    }

    #[test]
    fn tiny_positive_ratio_still_holds_out_one_record() {
        let data = numbered(5);
        let mut splitter = DataSplitter::seeded(&data, 1e-10, 1).unwrap();
        assert_eq!(splitter.split().len(), 1);
        assert_eq!(splitter.remaining().len(), 4);
    }

    #[test]
    fn partitions_are_disjoint_and_complete() {
        let data = numbered(25);
        for (seed, ratio) in [(1_u64, 0.0), (2, 0.1), (3, 0.33), (4, 0.5), (5, 1.0)] {
            let mut splitter = DataSplitter::seeded(&data, ratio, seed).unwrap();
            let expected = split_size(25, ratio);
            let split = clicks_of(splitter.split());
            let remaining = clicks_of(splitter.remaining());
            assert_eq!(split.len(), expected);
            assert_eq!(remaining.len(), 25 - expected);
            let mut union: Vec<u64> = split.iter().chain(&remaining).copied().collect();
            union.sort_unstable();
            assert_eq!(union, (0..25).collect::<Vec<_>>());
        }
    }

    #[test]
    fn partition_is_memoized() {
        let data = numbered(20);
        let mut splitter = DataSplitter::new(&data, 0.25).unwrap();
        let first = splitter.split().clone();
        let again = splitter.split().clone();
        assert_eq!(first, again);
        assert_eq!(splitter.remaining().len(), 15);
    }

    #[test]
    fn same_seed_same_partition() {
        let data = numbered(40);
        let (a, _) = DataSplitter::seeded(&data, 0.2, 99).unwrap().into_parts();
        let (b, _) = DataSplitter::seeded(&data, 0.2, 99).unwrap().into_parts();
        assert_eq!(a, b);
        assert_eq!(a.schema().get(BODY), data.schema().get(BODY));
    }

    #[test]
    fn every_record_gets_selected_over_many_runs() {
        let data = numbered(10);
        let mut hits = [0_u32; 10];
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..2000 {
            let seed = rng.gen();
            let mut splitter = DataSplitter::seeded(&data, 0.1, seed).unwrap();
            for clicks in clicks_of(splitter.split()) {
                hits[usize::try_from(clicks).unwrap()] += 1;
            }
        }
        assert!(hits.iter().all(|count| (100..=300).contains(count)), "{hits:?}");
    }
}
