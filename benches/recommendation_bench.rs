use criterion::{black_box, criterion_group, criterion_main, Criterion};
use movierec::algorithms::optimizer::{Adam, Optimizer, Sgd};
use movierec::algorithms::{mse_loss, AffinityScorer, MovieRecommender};
use movierec::services::recommendation::BatchRecommender;
use movierec::*;
use ndarray::Array1;

const USERS: usize = 1000;
const MOVIES: usize = 2000;
const DIM: usize = 100;

fn batch(size: usize) -> (Vec<usize>, Vec<usize>, Array1<f32>) {
    let users = (0..size).map(|i| (i * 7) % USERS).collect();
    let movies = (0..size).map(|i| (i * 13) % MOVIES).collect();
    let ratings = Array1::from_iter((0..size).map(|i| (i % 10) as f32 / 10.0));
    (users, movies, ratings)
}

fn benchmark_scoring(c: &mut Criterion) {
    let model = MovieRecommender::with_seed(USERS, MOVIES, DIM, 1).unwrap();
    let movies: Vec<usize> = (0..MOVIES).collect();
    let users = vec![0usize; MOVIES];

    c.bench_function("score_all_movies_for_user", |b| {
        b.iter(|| {
            black_box(model.score_batch(&users, &movies).unwrap());
        });
    });

    c.bench_function("score_single_pair", |b| {
        b.iter(|| {
            black_box(model.score(black_box(17), black_box(42)).unwrap());
        });
    });
}

fn benchmark_training_step(c: &mut Criterion) {
    let (users, movies, ratings) = batch(2048);

    c.bench_function("adam_train_step_2048", |b| {
        let mut model = MovieRecommender::with_seed(USERS, MOVIES, DIM, 2).unwrap();
        let mut optimizer = Adam::with_learning_rate(0.01);
        model.train();
        b.iter(|| {
            let cache = model.forward(&users, &movies).unwrap();
            let (loss, grad) = mse_loss(cache.output(), &ratings);
            let grads = model.backward(&cache, &grad);
            optimizer.step(&mut model, &grads);
            black_box(loss);
        });
    });

    c.bench_function("sgd_train_step_2048", |b| {
        let mut model = MovieRecommender::with_seed(USERS, MOVIES, DIM, 3).unwrap();
        let mut optimizer = Sgd::new(0.01);
        model.train();
        b.iter(|| {
            let cache = model.forward(&users, &movies).unwrap();
            let (loss, grad) = mse_loss(cache.output(), &ratings);
            let grads = model.backward(&cache, &grad);
            optimizer.step(&mut model, &grads);
            black_box(loss);
        });
    });
}

fn benchmark_ranking(c: &mut Criterion) {
    use movierec::algorithms::ranker::*;

    let scores: Vec<f32> = (0..MOVIES).map(|i| ((i * 7919) % 1000) as f32 / 1000.0 - 0.1).collect();

    c.bench_function("top_k_20_of_2000", |b| {
        b.iter(|| {
            black_box(top_k(&scores, 20));
        });
    });

    c.bench_function("positive_top_k_20_of_2000", |b| {
        b.iter(|| {
            black_box(positive_top_k(&scores, 20));
        });
    });
}

fn benchmark_batch_recommender(c: &mut Criterion) {
    let model = MovieRecommender::with_seed(200, 500, 32, 4).unwrap();
    let mappings = IdMappings {
        users: IdIndex::build((0..200).map(|u| u as RawId + 1)),
        movies: IdIndex::build((0..500).map(|m| m as RawId * 10)),
    };
    let movies: Vec<Movie> = (0..500)
        .map(|m| Movie::new(m as RawId * 10, format!("Movie {}", m)))
        .collect();
    let recommender = BatchRecommender::new(20, 1000);

    c.bench_function("generate_table_200_users", |b| {
        b.iter(|| {
            black_box(recommender.generate(&model, &mappings, &movies).unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_scoring,
    benchmark_training_step,
    benchmark_ranking,
    benchmark_batch_recommender
);
criterion_main!(benches);
