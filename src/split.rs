use crate::error::{AppError, Result};
use crate::features::ProcessedDataset;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded generator; the first `ceil(n * test_fraction)`
/// indices become the test partition.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AppError::InvalidData(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let test_size = (n as f64 * test_fraction).ceil() as usize;
    if n > 0 && test_size >= n {
        return Err(AppError::InvalidData(format!(
            "{} rows are too few for a {:.0}% test partition",
            n,
            test_fraction * 100.0
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_size);
    Ok(SplitIndices {
        train,
        test: indices,
    })
}

/// Feature matrix and target of one partition.
#[derive(Debug, Clone)]
pub struct Partition {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Partition {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }
}

#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub feature_names: Vec<String>,
    pub indices: SplitIndices,
    pub train: Partition,
    pub test: Partition,
}

pub struct DatasetSplitter;

impl DatasetSplitter {
    /// Timestamp and target are not part of `features`, so the matrix only
    /// carries model inputs.
    pub fn split(dataset: &ProcessedDataset, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
        let indices = split_indices(dataset.len(), test_fraction, seed)?;

        Ok(TrainTestSplit {
            feature_names: dataset.feature_columns().to_vec(),
            train: partition(dataset, &indices.train),
            test: partition(dataset, &indices.test),
            indices,
        })
    }
}

fn partition(dataset: &ProcessedDataset, rows: &[usize]) -> Partition {
    let n_features = dataset.feature_columns().len();
    Partition {
        x: Array2::from_shape_fn((rows.len(), n_features), |(i, j)| {
            dataset.records[rows[i]].features[j]
        }),
        y: rows
            .iter()
            .map(|&r| dataset.records[r].vehicle_count)
            .collect(),
    }
}
