use criterion::{criterion_group, criterion_main, Criterion};
use fastrand::Rng;
use shakespeare::genome::Target;
use shakespeare::optimizer::{GeneticOperators, ParentSelector};
use std::hint::black_box;

const TARGET: &str = "To be or not to be, that is the question;\n\
Whether 'tis nobler in the mind to suffer\n\
The slings and arrows of outrageous fortune,";

fn operators_benchmark(c: &mut Criterion) {
    let target = Target::new(TARGET);
    let ops = GeneticOperators::default();
    let mut rng = Rng::with_seed(42);
    let population = ops.random_population(&target, 500, &mut rng);
    let selector = ParentSelector::new(&population);

    c.bench_function("select_parent", |b| {
        b.iter(|| black_box(selector.select(&mut rng)))
    });

    let mother = &population[0];
    let father = &population[1];
    c.bench_function("crossover", |b| {
        b.iter(|| black_box(ops.crossover(black_box(mother), black_box(father), &mut rng)))
    });

    c.bench_function("breed_pair", |b| {
        b.iter(|| black_box(ops.breed(&selector, &mut rng)))
    });
}

criterion_group!(benches, operators_benchmark);
criterion_main!(benches);
