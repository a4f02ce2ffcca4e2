//! CART regression tree with variance-reduction splits.

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Unlimited when `None`
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; all when `None`
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    config: TreeConfig,
    root: Option<Node>,
    feature_importances: Vec<f64>,
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            feature_importances: Vec::new(),
        }
    }

    /// Fit on the rows listed in `sample` (repeats allowed, as in a bootstrap).
    pub fn fit(&mut self, x: &Array2<f64>, y: &[f64], sample: &[usize], rng: &mut ChaCha8Rng) {
        self.feature_importances = vec![0.0; x.ncols()];
        self.root = Some(self.build(x, y, sample.to_vec(), 0, rng));

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }
    }

    fn build(
        &mut self,
        x: &Array2<f64>,
        y: &[f64],
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let n = indices.len();
        let (sum, sum_sq) = indices
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));
        let mean = if n > 0 { sum / n as f64 } else { 0.0 };
        let sse = sum_sq - sum * mean;

        let depth_reached = self.config.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || n < self.config.min_samples_split || sse <= 1e-12 {
            return Node::Leaf { value: mean };
        }

        let Some(best) = self.find_best_split(x, y, &indices, sse, rng) else {
            return Node::Leaf { value: mean };
        };

        self.feature_importances[best.feature] += best.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature]] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(x, y, left, depth + 1, rng)),
            right: Box::new(self.build(x, y, right, depth + 1, rng)),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &[f64],
        indices: &[usize],
        parent_sse: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(max) = self.config.max_features.filter(|&m| m < n_features) {
            features.shuffle(rng);
            features.truncate(max);
            features.sort_unstable();
        }

        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();

        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for &feature in &features {
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let yi = y[order[k]];
                left_sum += yi;
                left_sq += yi * yi;

                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = x[[order[k], feature]];
                let next = x[[order[k + 1], feature]];
                if here == next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let child_sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                let gain = parent_sse - child_sse;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    pub fn predict_one(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = match &self.root {
            Some(node) => node,
            None => return 0.0,
        };

        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    /// Impurity decrease per feature, normalized to sum to one.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map(depth).unwrap_or(0)
    }
}
