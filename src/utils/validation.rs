use crate::config::Config;
use crate::models::*;
use anyhow::{anyhow, Result};

pub fn validate_config(config: &Config) -> Result<()> {
    if config.model.embedding_dim == 0 {
        return Err(anyhow!("Embedding dimension must be greater than 0"));
    }

    if config.model.embedding_dim > 2048 {
        return Err(anyhow!("Embedding dimension too large (max 2048)"));
    }

    if config.training.batch_size == 0 {
        return Err(anyhow!("Batch size must be greater than 0"));
    }

    if !(config.training.learning_rate > 0.0 && config.training.learning_rate.is_finite()) {
        return Err(anyhow!("Learning rate must be a positive finite number"));
    }

    if config.training.epochs == 0 {
        return Err(anyhow!("Epoch budget must be greater than 0"));
    }

    if config.training.patience == 0 {
        return Err(anyhow!("Early-stopping patience must be greater than 0"));
    }

    if config.data.max_samples == 0 {
        return Err(anyhow!("Max training samples must be greater than 0"));
    }

    if config.recommendation.top_k == 0 || config.recommendation.top_k > 20 {
        return Err(anyhow!("Recommendation K must be between 1 and 20"));
    }

    if config.recommendation.user_limit > 1000 {
        return Err(anyhow!("Too many users to pre-compute (max 1000)"));
    }

    Ok(())
}

pub fn validate_rating(rating: &RawRating) -> Result<()> {
    if !rating.rating.is_finite() {
        return Err(anyhow!(
            "Rating for user {} / movie {} is not a finite number",
            rating.user_id,
            rating.movie_id
        ));
    }

    Ok(())
}
