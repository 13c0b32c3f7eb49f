use crate::algorithms::optimizer::{Adam, Optimizer};
use crate::algorithms::{mse_loss, MovieRecommender};
use crate::config::TrainingConfig;
use crate::error::RecResult;
use crate::services::dataset::RatingDataset;
use crate::services::storage::CheckpointStore;
use crate::utils::mean;
use crate::utils::metrics::MetricsSink;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Loss strictly below the best so far; a checkpoint should be written.
    Improved,
    NotImproved,
    /// Patience exhausted.
    Stop,
}

/// Patience-based early stopping on the epoch loss.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_epoch: None,
            counter: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, loss: f64) -> EpochOutcome {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = Some(epoch);
            self.counter = 0;
            return EpochOutcome::Improved;
        }
        self.counter += 1;
        if self.counter >= self.patience {
            EpochOutcome::Stop
        } else {
            EpochOutcome::NotImproved
        }
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn counter(&self) -> usize {
        self.counter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub epoch_losses: Vec<f64>,
    pub best_loss: f64,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

/// One training run as seen by the epoch loop.
pub trait EpochDriver {
    /// Trains one full epoch and returns its mean batch loss.
    fn run_epoch(&mut self, epoch: usize) -> RecResult<f64>;
    /// Called after an epoch whose loss strictly improved on the best so far.
    fn on_improvement(&mut self, epoch: usize, loss: f64) -> RecResult<()>;
}

/// Epoch state machine: train, evaluate, checkpoint on improvement, stop on patience.
///
/// Errors raised by an epoch are logged and propagated; the run is aborted.
pub fn run_epochs<D: EpochDriver + ?Sized>(
    driver: &mut D,
    max_epochs: usize,
    policy: &mut EarlyStopping,
) -> RecResult<TrainingSummary> {
    let mut epoch_losses = Vec::with_capacity(max_epochs);
    let mut stopped_early = false;

    for epoch in 0..max_epochs {
        let loss = match driver.run_epoch(epoch) {
            Ok(loss) => loss,
            Err(e) => {
                error!("Error during training epoch {}: {}", epoch + 1, e);
                return Err(e);
            }
        };
        epoch_losses.push(loss);

        match policy.observe(epoch, loss) {
            EpochOutcome::Improved => {
                info!("Epoch {}: loss {:.6} (best)", epoch + 1, loss);
                if let Err(e) = driver.on_improvement(epoch, loss) {
                    error!("Error saving checkpoint after epoch {}: {}", epoch + 1, e);
                    return Err(e);
                }
            }
            EpochOutcome::NotImproved => {
                info!(
                    "Epoch {}: loss {:.6} (no improvement {}/{})",
                    epoch + 1,
                    loss,
                    policy.counter(),
                    policy.patience
                );
            }
            EpochOutcome::Stop => {
                info!("Epoch {}: loss {:.6}", epoch + 1, loss);
                info!("Early stopping triggered");
                stopped_early = true;
                break;
            }
        }
    }

    Ok(TrainingSummary {
        epochs_run: epoch_losses.len(),
        epoch_losses,
        best_loss: policy.best_loss(),
        best_epoch: policy.best_epoch(),
        stopped_early,
    })
}

/// Mini-batch trainer for [`MovieRecommender`].
pub struct Trainer {
    config: TrainingConfig,
    optimizer: Box<dyn Optimizer>,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        let optimizer = Box::new(Adam::with_learning_rate(config.learning_rate));
        Self::with_optimizer(config, optimizer)
    }

    pub fn with_optimizer(config: TrainingConfig, optimizer: Box<dyn Optimizer>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            optimizer,
            rng,
        }
    }

    /// Runs the full training loop. The best model is checkpointed on every
    /// improvement, and the final state is saved unconditionally at the end,
    /// so the last file written may not hold the best parameters.
    pub fn fit<S, M>(
        &mut self,
        model: &mut MovieRecommender,
        dataset: &RatingDataset,
        store: &mut S,
        metrics: &mut M,
    ) -> RecResult<TrainingSummary>
    where
        S: CheckpointStore + ?Sized,
        M: MetricsSink + ?Sized,
    {
        info!(
            "Training on {} samples in {} batches of {} for up to {} epochs",
            dataset.len(),
            dataset.num_batches(self.config.batch_size),
            self.config.batch_size,
            self.config.epochs
        );

        let mut policy = EarlyStopping::new(self.config.patience);
        let max_epochs = self.config.epochs;
        let mut session = TrainingSession {
            trainer: self,
            model,
            dataset,
            store,
            metrics,
        };
        let summary = run_epochs(&mut session, max_epochs, &mut policy)?;

        if let Err(e) = session.store.save(session.model) {
            error!("Error saving final checkpoint: {}", e);
            return Err(e);
        }
        info!(
            "Training finished after {} epochs, best loss {:.6}",
            summary.epochs_run, summary.best_loss
        );
        Ok(summary)
    }

    fn train_epoch(&mut self, model: &mut MovieRecommender, dataset: &RatingDataset, epoch: usize) -> RecResult<f64> {
        model.train();
        let started = Instant::now();
        let batches = dataset.batches(self.config.batch_size, self.config.shuffle, &mut self.rng);
        let mut batch_losses = Vec::with_capacity(batches.len());

        for (i, batch) in batches.iter().enumerate() {
            let cache = model.forward(&batch.users, &batch.movies)?;
            let targets = Array1::from(batch.ratings.clone());
            let (loss, grad) = mse_loss(cache.output(), &targets);
            let grads = model.backward(&cache, &grad);
            self.optimizer.step(model, &grads);
            batch_losses.push(f64::from(loss));

            debug!(epoch = epoch + 1, batch = i + 1, loss, "batch step");
        }

        let avg = mean(&batch_losses);
        debug!("Epoch {} took {:?}", epoch + 1, started.elapsed());
        Ok(avg)
    }
}

struct TrainingSession<'a, S: ?Sized, M: ?Sized> {
    trainer: &'a mut Trainer,
    model: &'a mut MovieRecommender,
    dataset: &'a RatingDataset,
    store: &'a mut S,
    metrics: &'a mut M,
}

impl<S, M> EpochDriver for TrainingSession<'_, S, M>
where
    S: CheckpointStore + ?Sized,
    M: MetricsSink + ?Sized,
{
    fn run_epoch(&mut self, epoch: usize) -> RecResult<f64> {
        let loss = self.trainer.train_epoch(self.model, self.dataset, epoch)?;
        self.metrics.log_metric("loss", loss, epoch);
        Ok(loss)
    }

    fn on_improvement(&mut self, _epoch: usize, _loss: f64) -> RecResult<()> {
        self.store.save(self.model)
    }
}
