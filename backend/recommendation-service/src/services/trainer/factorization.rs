/// Latent-factor decomposition over implicit-feedback confidence weights.
///
/// Minimizes
///   Σ conf(u,i) · (1 − xᵤ·yᵢ)² + reg · (Σ‖xᵤ‖² + Σ‖yᵢ‖²)
/// over observed cells by stochastic gradient descent. Observed cells carry a
/// preference of 1; the interaction score only shapes the confidence weight,
/// it is never treated as a rating.
///
/// Factor init is seeded, and cells are visited in a fixed order, so a given
/// input always produces the same factors.
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactorizationError {
    #[error("training diverged at epoch {epoch} (loss {loss})")]
    Diverged { epoch: usize, loss: f64 },

    #[error("no observed cells to train on")]
    EmptyMatrix,
}

#[derive(Debug, Clone)]
pub struct FactorizationConfig {
    pub factor_dim: usize,
    pub regularization: f64,
    pub learning_rate: f64,
    pub max_epochs: usize,
    /// Early stop once the relative loss improvement drops below this.
    pub loss_epsilon: f64,
    pub seed: u64,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        Self {
            factor_dim: 16,
            regularization: 0.05,
            learning_rate: 0.01,
            max_epochs: 60,
            loss_epsilon: 1e-4,
            seed: 42,
        }
    }
}

pub struct Factorization {
    pub user_factors: Vec<Array1<f64>>,
    pub item_factors: Vec<Array1<f64>>,
    pub epochs_run: usize,
    pub final_loss: f64,
}

/// `cells` holds (user_index, item_index, confidence) triplets with indices
/// dense in [0, n_users) × [0, n_items).
pub fn factorize(
    cells: &[(usize, usize, f64)],
    n_users: usize,
    n_items: usize,
    config: &FactorizationConfig,
) -> Result<Factorization, FactorizationError> {
    if cells.is_empty() || n_users == 0 || n_items == 0 {
        return Err(FactorizationError::EmptyMatrix);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut init = |n: usize| -> Vec<Array1<f64>> {
        (0..n)
            .map(|_| Array1::from_shape_fn(config.factor_dim, |_| rng.gen_range(-0.1..0.1)))
            .collect()
    };
    let mut user_factors = init(n_users);
    let mut item_factors = init(n_items);

    let lr = config.learning_rate;
    let reg = config.regularization;
    let mut prev_loss = f64::INFINITY;
    let mut epochs_run = 0;
    let mut final_loss = loss(cells, &user_factors, &item_factors, reg);

    for epoch in 0..config.max_epochs {
        for &(u, i, conf) in cells {
            let err = 1.0 - user_factors[u].dot(&item_factors[i]);
            let xu = user_factors[u].clone();
            let yi = item_factors[i].clone();
            user_factors[u].scaled_add(lr * conf * err, &yi);
            user_factors[u].scaled_add(-(lr * reg), &xu);
            item_factors[i].scaled_add(lr * conf * err, &xu);
            item_factors[i].scaled_add(-(lr * reg), &yi);
        }

        epochs_run = epoch + 1;
        final_loss = loss(cells, &user_factors, &item_factors, reg);

        if !final_loss.is_finite() {
            return Err(FactorizationError::Diverged {
                epoch: epochs_run,
                loss: final_loss,
            });
        }

        let improvement = (prev_loss - final_loss) / prev_loss.max(1.0);
        if improvement >= 0.0 && improvement < config.loss_epsilon {
            break;
        }
        prev_loss = final_loss;
    }

    Ok(Factorization {
        user_factors,
        item_factors,
        epochs_run,
        final_loss,
    })
}

fn loss(
    cells: &[(usize, usize, f64)],
    user_factors: &[Array1<f64>],
    item_factors: &[Array1<f64>],
    reg: f64,
) -> f64 {
    let reconstruction: f64 = cells
        .iter()
        .map(|&(u, i, conf)| {
            let err = 1.0 - user_factors[u].dot(&item_factors[i]);
            conf * err * err
        })
        .sum();
    let penalty: f64 = user_factors
        .iter()
        .chain(item_factors.iter())
        .map(|f| f.dot(f))
        .sum();
    reconstruction + reg * penalty
}
